//! Cached reader session over the parse/reconstruct pipeline.
//!
//! [`GetDpReader`] keeps the last geometry, preprocessing and solution it
//! read, and builds the [`ReconstructedMesh`] lazily. Reading any input
//! again drops the cached mesh so the next [`GetDpReader::mesh`] call sees
//! the new data.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::error::{IoError, Result};
use crate::mesh::{ReconstructedMesh, reconstruct};
use crate::msh::Geometry;
use crate::options::ReaderOptions;
use crate::pre::Preprocessing;
use crate::res::SolutionFile;
use crate::vtk_writer::{MeshSink, export_to_format};

#[derive(Debug, Default)]
pub struct GetDpReader {
    options: ReaderOptions,
    geometry: Option<Geometry>,
    preprocessing: Option<Preprocessing>,
    solution: Option<SolutionFile>,
    mesh: Option<ReconstructedMesh>,
}

impl GetDpReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn read_msh(&mut self, path: impl AsRef<Path>) -> Result<&Geometry> {
        let geometry = Geometry::from_file(path.as_ref(), &self.options)?;
        debug!("loaded geometry from {}", path.as_ref().display());
        self.mesh = None;
        Ok(self.geometry.insert(geometry))
    }

    pub fn read_pre(&mut self, path: impl AsRef<Path>) -> Result<&Preprocessing> {
        let preprocessing = Preprocessing::from_file(path.as_ref())?;
        debug!("loaded preprocessing from {}", path.as_ref().display());
        self.mesh = None;
        Ok(self.preprocessing.insert(preprocessing))
    }

    pub fn read_res(&mut self, path: impl AsRef<Path>) -> Result<&SolutionFile> {
        let solution = SolutionFile::from_file(path.as_ref(), &self.options)?;
        debug!("loaded solution from {}", path.as_ref().display());
        self.mesh = None;
        Ok(self.solution.insert(solution))
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn preprocessing(&self) -> Option<&Preprocessing> {
        self.preprocessing.as_ref()
    }

    pub fn solution(&self) -> Option<&SolutionFile> {
        self.solution.as_ref()
    }

    /// Reconstructed mesh for the current inputs, rebuilt after any re-read.
    ///
    /// Requires a geometry from [`GetDpReader::read_msh`]; a solution file
    /// that carries its own mesh does not stand in for it.
    pub fn mesh(&mut self) -> Result<&ReconstructedMesh> {
        let mesh = match self.mesh.take() {
            Some(mesh) => mesh,
            None => self.build_mesh()?,
        };
        Ok(self.mesh.insert(mesh))
    }

    fn build_mesh(&self) -> Result<ReconstructedMesh> {
        let geometry = self.geometry.as_ref().ok_or_else(|| {
            IoError::Precondition("no mesh geometry loaded; read a .msh file first".to_string())
        })?;
        let blocks = self
            .preprocessing
            .as_ref()
            .map(|pre| pre.blocks.as_slice())
            .unwrap_or_default();
        let samples = self
            .solution
            .as_ref()
            .map(SolutionFile::samples)
            .filter(|samples| !samples.is_empty());
        reconstruct(geometry, blocks, samples.as_deref())
    }

    /// Reconstructs (if needed) and hands the mesh to `sink`.
    pub fn export(
        &mut self,
        tag: &str,
        path: impl AsRef<Path>,
        sink: &dyn MeshSink,
    ) -> Result<PathBuf> {
        let mesh = self.mesh()?;
        export_to_format(mesh, tag, path, sink)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            mesh: self.geometry.as_ref().map(|geometry| MeshSummary {
                num_nodes: geometry.nodes.len(),
                num_elements: geometry.elements.len(),
                physical_regions: geometry.physical_names.keys().copied().collect(),
            }),
            dof: self.preprocessing.as_ref().map(|pre| {
                let resolution = pre.resolution.as_ref();
                DofSummary {
                    num_dof_blocks: pre.blocks.len(),
                    total_dofs: pre.total_dofs(),
                    resolution_name: resolution
                        .and_then(|res| res.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    main_resolution_number: resolution
                        .map(|res| res.main_resolution_number)
                        .unwrap_or(0),
                }
            }),
            solution: self.solution.as_ref().map(|solution| SolutionSummary {
                num_solutions: solution.samples().len(),
                num_steps: match solution {
                    SolutionFile::Mesh(mesh) => mesh.node_data.len(),
                    SolutionFile::Tabular(tabular) => tabular.steps.len(),
                },
                has_mesh: solution.has_mesh(),
            }),
        }
    }
}

/// Counts describing what a [`GetDpReader`] has loaded. Sections are absent
/// for inputs that were never read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dof: Option<DofSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<SolutionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshSummary {
    pub num_nodes: usize,
    pub num_elements: usize,
    /// Physical-name tags in ascending order
    pub physical_regions: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DofSummary {
    pub num_dof_blocks: usize,
    pub total_dofs: usize,
    pub resolution_name: String,
    pub main_resolution_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolutionSummary {
    /// Complex samples read from the first dataset or step
    pub num_solutions: usize,
    /// `$Solution` sections or `$NodeData` datasets
    pub num_steps: usize,
    pub has_mesh: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mesh::{SOLUTION_MAGNITUDE, SOLUTION_REAL};
    use std::fs;

    const TRIANGLE: &str = "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n\
$PhysicalNames\n1\n2 7 \"plate\"\n$EndPhysicalNames\n\
$Nodes\n3\n1 0 0 0\n2 1 0 0\n3 0 1 0\n$EndNodes\n\
$Elements\n1\n1 2 7 0 3 1 2 3\n$EndElements\n";

    const SOLUTION: &str = "$ResFormat /* GetDP 3.5 */\n1.1 0\n$EndResFormat\n\
$Solution /* DofData #0 */\n1.0 0.0\n0.0 1.0\n3.0 4.0\n$EndSolution\n";

    #[test]
    fn mesh_without_geometry_is_a_precondition_error() {
        let mut reader = GetDpReader::default();
        let err = reader.mesh().expect_err("no geometry was read");
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn rereading_invalidates_the_cached_mesh() {
        let dir = tempfile::tempdir().expect("temp dir");
        let msh = dir.path().join("plate.msh");
        let res = dir.path().join("plate.res");
        fs::write(&msh, TRIANGLE).expect("write msh");
        fs::write(&res, SOLUTION).expect("write res");

        let mut reader = GetDpReader::default();
        reader.read_msh(&msh).expect("read msh");
        assert!(reader.mesh().expect("mesh").point_array(SOLUTION_REAL).is_none());

        reader.read_res(&res).expect("read res");
        let mesh = reader.mesh().expect("mesh");
        assert_eq!(
            mesh.point_array(SOLUTION_MAGNITUDE),
            Some(&[1.0, 1.0, 5.0][..])
        );
    }

    #[test]
    fn summary_reports_loaded_inputs_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        let msh = dir.path().join("plate.msh");
        fs::write(&msh, TRIANGLE).expect("write msh");

        let mut reader = GetDpReader::default();
        assert_eq!(reader.summary(), Summary::default());

        reader.read_msh(&msh).expect("read msh");
        let summary = reader.summary();
        assert_eq!(
            summary.mesh,
            Some(MeshSummary {
                num_nodes: 3,
                num_elements: 1,
                physical_regions: vec![7],
            })
        );
        assert!(summary.dof.is_none());

        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["mesh"]["num_nodes"], 3);
        assert!(json.get("solution").is_none());
    }

    #[test]
    fn solution_count_is_the_number_of_samples() {
        let dir = tempfile::tempdir().expect("temp dir");
        let res = dir.path().join("plate.res");
        fs::write(&res, SOLUTION).expect("write res");

        let mut reader = GetDpReader::default();
        reader.read_res(&res).expect("read res");
        assert_eq!(
            reader.summary().solution,
            Some(SolutionSummary {
                num_solutions: 3,
                num_steps: 1,
                has_mesh: false,
            })
        );
    }

    #[test]
    fn missing_input_leaves_previous_state() {
        let dir = tempfile::tempdir().expect("temp dir");
        let msh = dir.path().join("plate.msh");
        fs::write(&msh, TRIANGLE).expect("write msh");

        let mut reader = GetDpReader::default();
        reader.read_msh(&msh).expect("read msh");
        let err = reader
            .read_msh(dir.path().join("absent.msh"))
            .expect_err("file is missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(reader.geometry().map(|g| g.nodes.len()), Some(3));
    }
}
