//! Reconstruction of a point-indexed mesh from parsed geometry, DOF blocks
//! and solution samples.
//!
//! Points are node coordinates in ascending tag order; that order defines
//! the point index used by connectivity and by every attached field array.
//! Node tags are translated through an explicit tag → index table, so meshes
//! with sparse or non-contiguous tags keep correct connectivity.
//!
//! DOF entities are a separate numbering space: an entity `e` addresses
//! point `e - 1`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use num_complex::Complex64;

use crate::error::{IoError, Result};
use crate::msh::Geometry;
use crate::pre::{DofDataBlock, DofType};

pub const SOLUTION_REAL: &str = "solution_real";
pub const SOLUTION_IMAG: &str = "solution_imag";
pub const SOLUTION_MAGNITUDE: &str = "solution_magnitude";
pub const DOF_TYPE: &str = "dof_type";
pub const DOF_VALUE: &str = "dof_value";
pub const EQUATION_NUMBER: &str = "equation_number";

/// Linear cell shapes that can be exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Vertex,
    Line,
    Triangle,
    Quad,
    Tetra,
    Hexahedron,
    Wedge,
    Pyramid,
}

impl CellKind {
    /// Gmsh element type → cell kind; `None` for types that are not exported.
    pub fn from_gmsh(element_type: i32) -> Option<Self> {
        match element_type {
            1 => Some(CellKind::Line),
            2 => Some(CellKind::Triangle),
            3 => Some(CellKind::Quad),
            4 => Some(CellKind::Tetra),
            5 => Some(CellKind::Hexahedron),
            6 => Some(CellKind::Wedge),
            7 => Some(CellKind::Pyramid),
            15 => Some(CellKind::Vertex),
            _ => None,
        }
    }

    pub fn vtk_code(self) -> u8 {
        match self {
            CellKind::Vertex => 1,
            CellKind::Line => 3,
            CellKind::Triangle => 5,
            CellKind::Quad => 9,
            CellKind::Tetra => 10,
            CellKind::Hexahedron => 12,
            CellKind::Wedge => 13,
            CellKind::Pyramid => 14,
        }
    }

    pub fn node_count(self) -> usize {
        match self {
            CellKind::Vertex => 1,
            CellKind::Line => 2,
            CellKind::Triangle => 3,
            CellKind::Quad | CellKind::Tetra => 4,
            CellKind::Pyramid => 5,
            CellKind::Wedge => 6,
            CellKind::Hexahedron => 8,
        }
    }
}

/// Data that reconstruction left out instead of failing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshDiagnostics {
    /// Elements whose type has no cell kind
    pub dropped_elements: usize,
    /// Elements whose node count differs from their cell kind's
    pub arity_mismatches: usize,
    /// DOF records whose entity does not address a point
    pub out_of_range_dofs: usize,
    /// `(samples, points)` when the solution was not attached
    pub solution_length_mismatch: Option<(usize, usize)>,
}

/// Mesh ready for export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructedMesh {
    /// Point coordinates in ascending node tag order
    pub points: Vec<[f64; 3]>,
    /// Node tag of each point
    pub point_tags: Vec<u64>,
    /// Point indices of all cells, concatenated
    pub connectivity: Vec<usize>,
    /// End offset of each cell in `connectivity`
    pub offsets: Vec<usize>,
    pub cell_types: Vec<CellKind>,
    /// Per-point arrays, each `points.len()` long
    pub point_data: BTreeMap<String, Vec<f64>>,
    pub diagnostics: MeshDiagnostics,
}

impl ReconstructedMesh {
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_types.len()
    }

    /// Point indices of cell `index`.
    pub fn cell(&self, index: usize) -> &[usize] {
        let start = if index == 0 { 0 } else { self.offsets[index - 1] };
        &self.connectivity[start..self.offsets[index]]
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellKind, &[usize])> + '_ {
        self.cell_types
            .iter()
            .enumerate()
            .map(|(index, &kind)| (kind, self.cell(index)))
    }

    pub fn point_array(&self, name: &str) -> Option<&[f64]> {
        self.point_data.get(name).map(Vec::as_slice)
    }
}

/// Builds the export mesh. Geometry is required; DOF blocks and solution
/// samples are optional enrichments.
pub fn reconstruct(
    geometry: &Geometry,
    blocks: &[DofDataBlock],
    solution: Option<&[Complex64]>,
) -> Result<ReconstructedMesh> {
    if geometry.is_empty() {
        return Err(IoError::Precondition(
            "no point data: parse a mesh geometry before reconstructing".to_string(),
        ));
    }

    let mut mesh = ReconstructedMesh {
        points: geometry.nodes.values().copied().collect(),
        point_tags: geometry.nodes.keys().copied().collect(),
        ..ReconstructedMesh::default()
    };
    let index_of: HashMap<u64, usize> = mesh
        .point_tags
        .iter()
        .enumerate()
        .map(|(index, &tag)| (tag, index))
        .collect();

    add_cells(&mut mesh, geometry, &index_of)?;

    if let Some(samples) = solution {
        add_solution(&mut mesh, samples);
    }

    let suffixed = blocks.len() > 1;
    for block in blocks {
        add_dof_block(&mut mesh, block, suffixed);
    }

    debug!(
        "reconstructed mesh: {} points, {} cells, {} point arrays",
        mesh.num_points(),
        mesh.num_cells(),
        mesh.point_data.len()
    );
    Ok(mesh)
}

fn add_cells(
    mesh: &mut ReconstructedMesh,
    geometry: &Geometry,
    index_of: &HashMap<u64, usize>,
) -> Result<()> {
    let mut dropped_types = BTreeSet::new();

    for (&tag, element) in &geometry.elements {
        let Some(kind) = CellKind::from_gmsh(element.element_type) else {
            dropped_types.insert(element.element_type);
            mesh.diagnostics.dropped_elements += 1;
            continue;
        };
        if element.nodes.len() != kind.node_count() {
            warn!(
                "element {tag}: {:?} needs {} nodes but lists {}; dropped",
                kind,
                kind.node_count(),
                element.nodes.len()
            );
            mesh.diagnostics.arity_mismatches += 1;
            continue;
        }
        for &node in &element.nodes {
            let index = index_of
                .get(&node)
                .ok_or(IoError::DanglingNode { element: tag, node })?;
            mesh.connectivity.push(*index);
        }
        mesh.offsets.push(mesh.connectivity.len());
        mesh.cell_types.push(kind);
    }

    if mesh.diagnostics.dropped_elements > 0 {
        warn!(
            "dropped {} elements of unsupported types {:?}",
            mesh.diagnostics.dropped_elements, dropped_types
        );
    }
    Ok(())
}

fn add_solution(mesh: &mut ReconstructedMesh, samples: &[Complex64]) {
    let points = mesh.num_points();
    if samples.len() != points {
        warn!(
            "solution has {} samples for {points} points; not attached",
            samples.len()
        );
        mesh.diagnostics.solution_length_mismatch = Some((samples.len(), points));
        return;
    }

    mesh.point_data.insert(
        SOLUTION_REAL.to_string(),
        samples.iter().map(|s| s.re).collect(),
    );
    mesh.point_data.insert(
        SOLUTION_IMAG.to_string(),
        samples.iter().map(|s| s.im).collect(),
    );
    mesh.point_data.insert(
        SOLUTION_MAGNITUDE.to_string(),
        samples.iter().map(|s| s.norm()).collect(),
    );
}

fn add_dof_block(mesh: &mut ReconstructedMesh, block: &DofDataBlock, suffixed: bool) {
    let points = mesh.num_points();
    let mut types = vec![0.0; points];
    let mut values = vec![0.0; points];
    let mut equations = vec![0.0; points];
    let mut out_of_range = 0usize;

    for dof in &block.dofs {
        let Some(index) = usize::try_from(dof.entity.saturating_sub(1))
            .ok()
            .filter(|&index| index < points)
        else {
            out_of_range += 1;
            continue;
        };

        types[index] = f64::from(dof.dof_type.code());
        let value = dof.payload.value().unwrap_or(0.0);
        let equation = dof.payload.equation_number().unwrap_or(0) as f64;
        match dof.dof_type {
            DofType::FixedValue => values[index] = value,
            DofType::Unknown => equations[index] = equation,
            DofType::InitialValue => {
                values[index] = value;
                equations[index] = equation;
            }
            DofType::AssociatedDof | DofType::Other(_) => {}
        }
    }

    if out_of_range > 0 {
        warn!(
            "DofData block {}: ignored {out_of_range} DOFs whose entity is outside 1..={points}",
            block.number
        );
        mesh.diagnostics.out_of_range_dofs += out_of_range;
    }

    let suffix = if suffixed {
        format!("_block{}", block.number)
    } else {
        String::new()
    };
    for (name, array) in [
        (DOF_TYPE, types),
        (DOF_VALUE, values),
        (EQUATION_NUMBER, equations),
    ] {
        let key = format!("{name}{suffix}");
        if mesh.point_data.insert(key.clone(), array).is_some() {
            warn!("point array {key} attached twice; keeping the later block");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msh::Element;
    use crate::pre::{Dof, DofPayload, parse_dof_payload};
    use approx::assert_relative_eq;

    fn geometry(nodes: &[(u64, [f64; 3])], elements: &[(u64, i32, &[u64])]) -> Geometry {
        Geometry {
            nodes: nodes.iter().copied().collect(),
            elements: elements
                .iter()
                .map(|&(tag, element_type, nodes)| {
                    (
                        tag,
                        Element {
                            element_type,
                            entity_tag: 0,
                            nodes: nodes.to_vec(),
                        },
                    )
                })
                .collect(),
            ..Geometry::default()
        }
    }

    fn triangle() -> Geometry {
        geometry(
            &[
                (1, [0.0, 0.0, 0.0]),
                (2, [1.0, 0.0, 0.0]),
                (3, [0.0, 1.0, 0.0]),
            ],
            &[(1, 2, &[1, 2, 3])],
        )
    }

    fn dof(entity: i64, dof_type: DofType, payload: &[&str]) -> Dof {
        Dof {
            basis_function: 1,
            entity,
            harmonic: 0,
            dof_type,
            payload: parse_dof_payload(dof_type, payload),
        }
    }

    fn block(number: i64, dofs: Vec<Dof>) -> DofDataBlock {
        DofDataBlock {
            number,
            resolution_number: 0,
            system_number: 0,
            function_spaces: vec![0],
            time_functions: vec![],
            partitions: vec![],
            num_any_dof: dofs.len() as i64,
            num_dof: dofs.len() as i64,
            dofs,
            skipped_records: 0,
        }
    }

    #[test]
    fn triangle_round_trip() {
        let mesh = reconstruct(&triangle(), &[], None).expect("reconstruct");
        assert_eq!(mesh.num_points(), 3);
        assert_eq!(
            mesh.points,
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        );
        assert_eq!(mesh.num_cells(), 1);
        assert_eq!(mesh.cell(0), &[0, 1, 2]);
        assert_eq!(mesh.cell_types[0].vtk_code(), 5);
        assert!(mesh.point_data.is_empty());
    }

    #[test]
    fn sparse_tags_map_through_the_index_table() {
        let geometry = geometry(
            &[
                (10, [0.0, 0.0, 0.0]),
                (20, [1.0, 0.0, 0.0]),
                (40, [0.0, 1.0, 0.0]),
            ],
            &[(7, 1, &[40, 10]), (3, 15, &[20])],
        );
        let mesh = reconstruct(&geometry, &[], None).expect("reconstruct");
        assert_eq!(mesh.point_tags, vec![10, 20, 40]);
        // Cells follow ascending element tag
        let cells: Vec<_> = mesh.cells().collect();
        assert_eq!(cells[0], (CellKind::Vertex, &[1][..]));
        assert_eq!(cells[1], (CellKind::Line, &[2, 0][..]));
    }

    #[test]
    fn unsupported_element_types_are_dropped_and_counted() {
        let geometry = geometry(
            &[(1, [0.0; 3]), (2, [1.0, 0.0, 0.0])],
            &[(1, 1, &[1, 2]), (2, 8, &[1, 2]), (3, 99, &[1])],
        );
        let mesh = reconstruct(&geometry, &[], None).expect("reconstruct");
        assert_eq!(mesh.num_cells(), 1);
        assert_eq!(mesh.diagnostics.dropped_elements, 2);
    }

    #[test]
    fn elements_with_wrong_node_count_are_dropped_and_counted() {
        // A triangle listing two nodes and a line listing three
        let geometry = geometry(
            &[(1, [0.0; 3]), (2, [1.0, 0.0, 0.0]), (3, [0.0, 1.0, 0.0])],
            &[(1, 2, &[1, 2]), (2, 1, &[1, 2, 3]), (3, 2, &[1, 2, 3])],
        );
        let mesh = reconstruct(&geometry, &[], None).expect("reconstruct");
        assert_eq!(mesh.num_cells(), 1);
        assert_eq!(mesh.cell(0), &[0, 1, 2]);
        assert_eq!(mesh.cell_types, vec![CellKind::Triangle]);
        assert_eq!(mesh.diagnostics.arity_mismatches, 2);
        assert_eq!(mesh.diagnostics.dropped_elements, 0);
    }

    #[test]
    fn dangling_node_is_fatal() {
        let geometry = geometry(&[(1, [0.0; 3])], &[(5, 1, &[1, 2])]);
        let err = reconstruct(&geometry, &[], None).expect_err("should fail");
        assert!(matches!(err, IoError::DanglingNode { element: 5, node: 2 }));
    }

    #[test]
    fn missing_geometry_is_a_precondition_error() {
        let err = reconstruct(&Geometry::default(), &[], None).expect_err("should fail");
        assert!(matches!(err, IoError::Precondition(_)));
    }

    #[test]
    fn solution_arrays_are_attached_per_point() {
        let samples = [
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(3.0, -4.0),
        ];
        let mesh = reconstruct(&triangle(), &[], Some(&samples)).expect("reconstruct");
        assert_eq!(mesh.point_array(SOLUTION_REAL), Some(&[1.0, 0.0, 3.0][..]));
        assert_eq!(mesh.point_array(SOLUTION_IMAG), Some(&[0.0, 1.0, -4.0][..]));
        let magnitude = mesh.point_array(SOLUTION_MAGNITUDE).expect("magnitude");
        assert_relative_eq!(magnitude[0], 1.0);
        assert_relative_eq!(magnitude[1], 1.0);
        assert_relative_eq!(magnitude[2], 5.0);
    }

    #[test]
    fn solution_length_mismatch_is_reported_not_attached() {
        let samples = [Complex64::new(1.0, 0.0)];
        let mesh = reconstruct(&triangle(), &[], Some(&samples)).expect("reconstruct");
        assert!(mesh.point_array(SOLUTION_REAL).is_none());
        assert_eq!(mesh.diagnostics.solution_length_mismatch, Some((1, 3)));
    }

    #[test]
    fn dof_fields_follow_type_rules() {
        let dofs = vec![
            dof(1, DofType::Unknown, &["7", "3"]),
            dof(2, DofType::FixedValue, &["3.5", "7"]),
            dof(3, DofType::InitialValue, &["9", "0.25"]),
        ];
        let mesh = reconstruct(&triangle(), &[block(0, dofs)], None).expect("reconstruct");
        assert_eq!(mesh.point_array(DOF_TYPE), Some(&[1.0, 2.0, 5.0][..]));
        assert_eq!(mesh.point_array(DOF_VALUE), Some(&[0.0, 3.5, 0.25][..]));
        assert_eq!(mesh.point_array(EQUATION_NUMBER), Some(&[7.0, 0.0, 9.0][..]));
    }

    #[test]
    fn associated_dofs_only_record_their_type() {
        let dofs = vec![dof(1, DofType::AssociatedDof, &["4", "2.5", "1"])];
        let mesh = reconstruct(&triangle(), &[block(0, dofs)], None).expect("reconstruct");
        assert_eq!(mesh.point_array(DOF_TYPE), Some(&[3.0, 0.0, 0.0][..]));
        assert_eq!(mesh.point_array(DOF_VALUE), Some(&[0.0, 0.0, 0.0][..]));
    }

    #[test]
    fn out_of_range_entities_are_skipped_without_corruption() {
        let dofs = vec![
            dof(2, DofType::FixedValue, &["1.5"]),
            dof(4, DofType::FixedValue, &["99.0"]),
            dof(0, DofType::FixedValue, &["98.0"]),
            dof(-3, DofType::Unknown, &["1"]),
        ];
        let mesh = reconstruct(&triangle(), &[block(0, dofs)], None).expect("reconstruct");
        assert_eq!(mesh.point_array(DOF_VALUE), Some(&[0.0, 1.5, 0.0][..]));
        assert_eq!(mesh.point_array(DOF_TYPE), Some(&[0.0, 2.0, 0.0][..]));
        assert_eq!(mesh.diagnostics.out_of_range_dofs, 3);
    }

    #[test]
    fn multiple_blocks_get_distinct_suffixes() {
        let blocks = [
            block(1, vec![dof(1, DofType::FixedValue, &["1.0"])]),
            block(2, vec![dof(1, DofType::FixedValue, &["2.0"])]),
        ];
        let mesh = reconstruct(&triangle(), &blocks, None).expect("reconstruct");
        assert!(mesh.point_array(DOF_TYPE).is_none());
        assert_eq!(mesh.point_array("dof_value_block1"), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(mesh.point_array("dof_value_block2"), Some(&[2.0, 0.0, 0.0][..]));
        assert!(mesh.point_array("dof_type_block1").is_some());
        assert!(mesh.point_array("dof_type_block2").is_some());
        assert!(mesh.point_array("equation_number_block2").is_some());
    }

    #[test]
    fn unparsed_payloads_contribute_zero_values() {
        let record = dof(1, DofType::FixedValue, &["x"]);
        assert!(matches!(record.payload, DofPayload::Unparsed(_)));
        let mesh = reconstruct(&triangle(), &[block(0, vec![record])], None).expect("reconstruct");
        assert_eq!(mesh.point_array(DOF_TYPE), Some(&[2.0, 0.0, 0.0][..]));
        assert_eq!(mesh.point_array(DOF_VALUE), Some(&[0.0, 0.0, 0.0][..]));
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let first = reconstruct(&triangle(), &[], None).expect("reconstruct");
        let second = reconstruct(&triangle(), &[], None).expect("reconstruct");
        assert_eq!(first, second);
    }
}
