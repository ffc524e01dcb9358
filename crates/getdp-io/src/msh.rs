//! Gmsh `.msh` geometry reader
//!
//! Reads node coordinates, element connectivity and physical names from
//! ASCII Gmsh mesh files.
//!
//! ## Format families
//!
//! The `$MeshFormat` version string selects the layout of `$Nodes` and
//! `$Elements`; only its leading character is inspected:
//!
//! - **Legacy**: a count line, then one `tag x y z` line per node and one
//!   `tag type region unused num_nodes node...` line per element.
//! - **Version 4**: entity blocks. Each node block lists all of its node
//!   tags first and then all coordinates (two separate runs), while each
//!   element block holds one `tag node...` line per element.
//!
//! Files without `$MeshFormat` are read with the legacy layout.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use getdp_io::{Geometry, ReaderOptions};
//!
//! let geometry = Geometry::from_file("model.msh", &ReaderOptions::default())?;
//! println!("Nodes: {}, Elements: {}", geometry.nodes.len(), geometry.elements.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};

use crate::error::{IoError, Result};
use crate::options::{ReaderOptions, RecordPolicy};
use crate::sections::{LineCursor, Section, find_section, parse_token, read_text};

/// Layout family of the `$Nodes`/`$Elements` sections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MshFamily {
    Legacy,
    V4,
}

impl MshFamily {
    pub fn from_version(version: &str) -> Self {
        if version.trim_start().starts_with('4') {
            MshFamily::V4
        } else {
            MshFamily::Legacy
        }
    }
}

/// Contents of the `$MeshFormat` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshFormat {
    pub version: String,
    /// 0 for ASCII, 1 for binary
    pub file_type: i32,
    pub data_size: i32,
}

impl MeshFormat {
    pub fn family(&self) -> MshFamily {
        MshFamily::from_version(&self.version)
    }

    fn parse(section: Section<'_>) -> Result<Self> {
        let mut cursor = section.cursor();
        let (line, text) = cursor.next_line("mesh format")?;
        let mut parts = text.split_whitespace();
        let version = parts
            .next()
            .ok_or_else(|| IoError::parse(section.name, line, "missing mesh format version"))?
            .to_string();
        let file_type: i32 = parse_token(parts.next(), "file type", section.name, line)?;
        let data_size: i32 = parse_token(parts.next(), "data size", section.name, line)?;
        if file_type != 0 {
            return Err(IoError::UnsupportedFormat(format!(
                "binary .msh files are not supported (version {version})"
            )));
        }
        Ok(Self {
            version,
            file_type,
            data_size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalName {
    pub dimension: i32,
    pub name: String,
}

/// Element record as stored in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Gmsh element type code
    pub element_type: i32,
    /// Region (legacy) or entity (version 4) tag
    pub entity_tag: i32,
    /// Node tags in connectivity order
    pub nodes: Vec<u64>,
}

/// Parsed mesh geometry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub format: Option<MeshFormat>,
    /// Node tag → coordinates
    pub nodes: BTreeMap<u64, [f64; 3]>,
    /// Element tag → element
    pub elements: BTreeMap<u64, Element>,
    /// Physical tag → name
    pub physical_names: BTreeMap<i32, PhysicalName>,
    /// Records dropped under [`RecordPolicy::Skip`]
    pub skipped_records: usize,
}

impl Geometry {
    pub fn from_file(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let text = read_text(path.as_ref())?;
        parse_geometry(&text, options)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Parses a mesh file, choosing the layout from its `$MeshFormat` version.
pub fn parse_geometry(text: &str, options: &ReaderOptions) -> Result<Geometry> {
    let format = read_format(text)?;
    let family = format.as_ref().map_or(MshFamily::Legacy, MeshFormat::family);
    parse_sections(text, format, family, options)
}

/// Parses a mesh file with a fixed layout regardless of its declared version.
pub fn parse_geometry_as(text: &str, family: MshFamily, options: &ReaderOptions) -> Result<Geometry> {
    let format = read_format(text)?;
    parse_sections(text, format, family, options)
}

fn read_format(text: &str) -> Result<Option<MeshFormat>> {
    find_section(text, "MeshFormat")?
        .map(MeshFormat::parse)
        .transpose()
}

fn parse_sections(
    text: &str,
    format: Option<MeshFormat>,
    family: MshFamily,
    options: &ReaderOptions,
) -> Result<Geometry> {
    let policy = options.record_policy;
    let mut geometry = Geometry {
        format,
        ..Geometry::default()
    };

    if let Some(section) = find_section(text, "PhysicalNames")? {
        geometry.physical_names =
            parse_physical_names(section, policy, &mut geometry.skipped_records)?;
    }

    if let Some(section) = find_section(text, "Nodes")? {
        geometry.nodes = match family {
            MshFamily::Legacy => parse_nodes_legacy(section, policy, &mut geometry.skipped_records)?,
            MshFamily::V4 => parse_nodes_v4(section, policy, &mut geometry.skipped_records)?,
        };
    }

    if let Some(section) = find_section(text, "Elements")? {
        geometry.elements = match family {
            MshFamily::Legacy => {
                parse_elements_legacy(section, policy, &mut geometry.skipped_records)?
            }
            MshFamily::V4 => parse_elements_v4(section, policy, &mut geometry.skipped_records)?,
        };
    }

    debug!(
        "parsed {:?} mesh: {} nodes, {} elements, {} physical names",
        family,
        geometry.nodes.len(),
        geometry.elements.len(),
        geometry.physical_names.len()
    );
    Ok(geometry)
}

fn parse_count(cursor: &mut LineCursor<'_>, what: &str) -> Result<usize> {
    let (line, text) = cursor.next_line(what)?;
    parse_token(text.split_whitespace().next(), what, cursor.section(), line)
}

fn parse_coords<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    section: &str,
    line: usize,
) -> Result<[f64; 3]> {
    let x = parse_token(parts.next(), "x coordinate", section, line)?;
    let y = parse_token(parts.next(), "y coordinate", section, line)?;
    let z = parse_token(parts.next(), "z coordinate", section, line)?;
    Ok([x, y, z])
}

fn insert_node(nodes: &mut BTreeMap<u64, [f64; 3]>, tag: u64, xyz: [f64; 3]) {
    if nodes.insert(tag, xyz).is_some() {
        warn!("node {tag} defined more than once; keeping the last definition");
    }
}

fn insert_element(elements: &mut BTreeMap<u64, Element>, tag: u64, element: Element) {
    if elements.insert(tag, element).is_some() {
        warn!("element {tag} defined more than once; keeping the last definition");
    }
}

fn parse_physical_names(
    section: Section<'_>,
    policy: RecordPolicy,
    skipped: &mut usize,
) -> Result<BTreeMap<i32, PhysicalName>> {
    let mut cursor = section.cursor();
    let count = parse_count(&mut cursor, "physical name count")?;
    let mut names = BTreeMap::new();

    for _ in 0..count {
        let (line, text) = cursor.next_line("physical name")?;
        let record = (|| -> Result<_> {
            let (dim, rest) = split_token(text);
            let (tag, rest) = split_token(rest);
            let dimension: i32 = parse_token(Some(dim), "physical dimension", section.name, line)?;
            let tag: i32 = parse_token(Some(tag), "physical tag", section.name, line)?;
            let name = rest.trim().trim_matches('"').to_string();
            Ok((tag, PhysicalName { dimension, name }))
        })();
        if let Some((tag, name)) = policy.apply(record, skipped)? {
            names.insert(tag, name);
        }
    }

    Ok(names)
}

/// Splits off the first whitespace-delimited token.
fn split_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], &text[end..]),
        None => (text, ""),
    }
}

fn parse_nodes_legacy(
    section: Section<'_>,
    policy: RecordPolicy,
    skipped: &mut usize,
) -> Result<BTreeMap<u64, [f64; 3]>> {
    let mut cursor = section.cursor();
    let count = parse_count(&mut cursor, "node count")?;
    let mut nodes = BTreeMap::new();

    for _ in 0..count {
        let (line, text) = cursor.next_line("node record")?;
        let record = (|| -> Result<_> {
            let mut parts = text.split_whitespace();
            let tag: u64 = parse_token(parts.next(), "node tag", section.name, line)?;
            let xyz = parse_coords(parts, section.name, line)?;
            Ok((tag, xyz))
        })();
        if let Some((tag, xyz)) = policy.apply(record, skipped)? {
            insert_node(&mut nodes, tag, xyz);
        }
    }

    Ok(nodes)
}

fn parse_elements_legacy(
    section: Section<'_>,
    policy: RecordPolicy,
    skipped: &mut usize,
) -> Result<BTreeMap<u64, Element>> {
    let mut cursor = section.cursor();
    let count = parse_count(&mut cursor, "element count")?;
    let mut elements = BTreeMap::new();

    for _ in 0..count {
        let (line, text) = cursor.next_line("element record")?;
        let record = (|| -> Result<_> {
            let mut parts = text.split_whitespace();
            let tag: u64 = parse_token(parts.next(), "element tag", section.name, line)?;
            let element_type: i32 = parse_token(parts.next(), "element type", section.name, line)?;
            let entity_tag: i32 = parse_token(parts.next(), "element region", section.name, line)?;
            // Fixed-position placeholder, always present and never used
            parts.next();
            let num_nodes: usize =
                parse_token(parts.next(), "element node count", section.name, line)?;
            let nodes = (0..num_nodes)
                .map(|_| parse_token(parts.next(), "element node tag", section.name, line))
                .collect::<Result<Vec<u64>>>()?;
            Ok((
                tag,
                Element {
                    element_type,
                    entity_tag,
                    nodes,
                },
            ))
        })();
        if let Some((tag, element)) = policy.apply(record, skipped)? {
            insert_element(&mut elements, tag, element);
        }
    }

    Ok(elements)
}

/// Reads the four-field header shared by version-4 sections and blocks.
/// Returns the header's line number along with its fields.
fn parse_block_header(
    cursor: &mut LineCursor<'_>,
    names: [&str; 4],
) -> Result<(usize, [i64; 4])> {
    let (line, text) = cursor.next_line(names[0])?;
    let mut parts = text.split_whitespace();
    let mut fields = [0i64; 4];
    for (field, name) in fields.iter_mut().zip(names) {
        *field = parse_token(parts.next(), name, cursor.section(), line)?;
    }
    Ok((line, fields))
}

fn block_len(value: i64, what: &str, section: &str, line: usize) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| IoError::parse(section, line, format!("negative {what}: {value}")))
}

fn header_i32(value: i64, what: &str, section: &str, line: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| IoError::parse(section, line, format!("{what} out of range: {value}")))
}

fn parse_nodes_v4(
    section: Section<'_>,
    policy: RecordPolicy,
    skipped: &mut usize,
) -> Result<BTreeMap<u64, [f64; 3]>> {
    let mut cursor = section.cursor();
    let (line, [num_blocks, declared, _, _]) = parse_block_header(
        &mut cursor,
        ["entity block count", "node count", "min node tag", "max node tag"],
    )?;
    let num_blocks = block_len(num_blocks, "entity block count", section.name, line)?;
    let mut nodes = BTreeMap::new();

    for _ in 0..num_blocks {
        let (line, [_dim, _entity, _parametric, in_block]) = parse_block_header(
            &mut cursor,
            ["entity dimension", "entity tag", "parametric flag", "block node count"],
        )?;
        let in_block = block_len(in_block, "block node count", section.name, line)?;

        // All tags of the block come first, then all coordinates. Capacity is
        // capped by the lines left in the section.
        let mut tags = Vec::with_capacity(in_block.min(cursor.remaining().len()));
        for _ in 0..in_block {
            let (line, text) = cursor.next_line("node tag")?;
            let tag = parse_token::<u64>(text.split_whitespace().next(), "node tag", section.name, line);
            tags.push(policy.apply(tag, skipped)?);
        }
        for tag in tags {
            let (line, text) = cursor.next_line("node coordinates")?;
            let xyz = policy.apply(parse_coords(text.split_whitespace(), section.name, line), skipped)?;
            if let (Some(tag), Some(xyz)) = (tag, xyz) {
                insert_node(&mut nodes, tag, xyz);
            }
        }
    }

    if nodes.len() as i64 != declared {
        warn!(
            "$Nodes declares {declared} nodes but {} were read",
            nodes.len()
        );
    }
    Ok(nodes)
}

fn parse_elements_v4(
    section: Section<'_>,
    policy: RecordPolicy,
    skipped: &mut usize,
) -> Result<BTreeMap<u64, Element>> {
    let mut cursor = section.cursor();
    let (line, [num_blocks, declared, _, _]) = parse_block_header(
        &mut cursor,
        ["entity block count", "element count", "min element tag", "max element tag"],
    )?;
    let num_blocks = block_len(num_blocks, "entity block count", section.name, line)?;
    let mut elements = BTreeMap::new();

    for _ in 0..num_blocks {
        let (line, [_dim, entity_tag, element_type, in_block]) = parse_block_header(
            &mut cursor,
            ["entity dimension", "entity tag", "element type", "block element count"],
        )?;
        let entity_tag = header_i32(entity_tag, "entity tag", section.name, line)?;
        let element_type = header_i32(element_type, "element type", section.name, line)?;
        let in_block = block_len(in_block, "block element count", section.name, line)?;

        for _ in 0..in_block {
            let (line, text) = cursor.next_line("element record")?;
            let record = (|| -> Result<_> {
                let mut parts = text.split_whitespace();
                let tag: u64 = parse_token(parts.next(), "element tag", section.name, line)?;
                let nodes = parts
                    .map(|raw| parse_token(Some(raw), "element node tag", section.name, line))
                    .collect::<Result<Vec<u64>>>()?;
                if nodes.is_empty() {
                    return Err(IoError::parse(section.name, line, "missing element node tag"));
                }
                Ok((tag, nodes))
            })();
            if let Some((tag, nodes)) = policy.apply(record, skipped)? {
                insert_element(
                    &mut elements,
                    tag,
                    Element {
                        element_type,
                        entity_tag,
                        nodes,
                    },
                );
            }
        }
    }

    if elements.len() as i64 != declared {
        warn!(
            "$Elements declares {declared} elements but {} were read",
            elements.len()
        );
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_TRIANGLE: &str = r#"$MeshFormat
2.2 0 8
$EndMeshFormat
$PhysicalNames
2
1 10 "Outer boundary"
2 20 "Domain"
$EndPhysicalNames
$Nodes
3
1 0 0 0
2 1 0 0
3 0 1 0
$EndNodes
$Elements
1
1 2 20 0 3 1 2 3
$EndElements
"#;

    const V4_MESH: &str = r#"$MeshFormat
4.1 0 8
$EndMeshFormat
$Nodes
2 4 1 4
0 1 0 1
1
0 0 0
2 1 0 3
2
3
4
1 0 0
1 1 0
0 1 0
$EndNodes
$Elements
3 3 1 3
1 5 1 1
1 1 2
2 1 2 1
2 1 2 3
0 1 15 1
3 4
$EndElements
"#;

    #[test]
    fn legacy_nodes_elements_and_names() {
        let geometry =
            parse_geometry(LEGACY_TRIANGLE, &ReaderOptions::default()).expect("parse should succeed");

        let format = geometry.format.as_ref().expect("format present");
        assert_eq!(format.version, "2.2");
        assert_eq!(format.family(), MshFamily::Legacy);

        assert_eq!(geometry.nodes.len(), 3);
        assert!(geometry.nodes.values().all(|xyz| xyz.iter().all(|c| c.is_finite())));
        assert_eq!(geometry.nodes.get(&2), Some(&[1.0, 0.0, 0.0]));

        let element = geometry.elements.get(&1).expect("element 1");
        assert_eq!(element.element_type, 2);
        assert_eq!(element.entity_tag, 20);
        assert_eq!(element.nodes, vec![1, 2, 3]);

        assert_eq!(geometry.physical_names.len(), 2);
        assert_eq!(geometry.physical_names[&10].name, "Outer boundary");
        assert_eq!(geometry.physical_names[&10].dimension, 1);
    }

    #[test]
    fn version_four_blocks_keep_tags_and_coordinates_apart() {
        let geometry = parse_geometry(V4_MESH, &ReaderOptions::default()).expect("parse should succeed");

        assert_eq!(
            geometry.format.as_ref().map(MeshFormat::family),
            Some(MshFamily::V4)
        );
        assert_eq!(geometry.nodes.len(), 4);
        assert_eq!(geometry.nodes[&1], [0.0, 0.0, 0.0]);
        assert_eq!(geometry.nodes[&2], [1.0, 0.0, 0.0]);
        assert_eq!(geometry.nodes[&3], [1.0, 1.0, 0.0]);
        assert_eq!(geometry.nodes[&4], [0.0, 1.0, 0.0]);

        assert_eq!(geometry.elements.len(), 3);
        assert_eq!(geometry.elements[&1].element_type, 1);
        assert_eq!(geometry.elements[&1].entity_tag, 5);
        assert_eq!(geometry.elements[&2].nodes, vec![1, 2, 3]);
        assert_eq!(geometry.elements[&3].nodes, vec![4]);
        assert_eq!(geometry.elements[&3].element_type, 15);
    }

    #[test]
    fn forced_legacy_layout_ignores_declared_version() {
        let text = "$MeshFormat\n4.1 0 8\n$EndMeshFormat\n$Nodes\n1\n7 1 2 3\n$EndNodes\n";
        let geometry =
            parse_geometry_as(text, MshFamily::Legacy, &ReaderOptions::default()).expect("parse");
        assert_eq!(geometry.nodes[&7], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn missing_format_defaults_to_legacy() {
        let text = "$Nodes\n1\n1 0.5 0.5 0\n$EndNodes\n";
        let geometry = parse_geometry(text, &ReaderOptions::default()).expect("parse");
        assert!(geometry.format.is_none());
        assert_eq!(geometry.nodes.len(), 1);
    }

    #[test]
    fn binary_files_are_rejected() {
        let text = "$MeshFormat\n2.2 1 8\n$EndMeshFormat\n";
        let err = parse_geometry(text, &ReaderOptions::default()).expect_err("should fail");
        assert!(matches!(err, IoError::UnsupportedFormat(_)));
    }

    #[test]
    fn malformed_node_aborts_by_default() {
        let text = "$Nodes\n2\n1 0 0 0\n2 abc 0 0\n$EndNodes\n";
        let err = parse_geometry(text, &ReaderOptions::default()).expect_err("should fail");
        match err {
            IoError::Parse { section, line, message } => {
                assert_eq!(section, "Nodes");
                assert_eq!(line, 4);
                assert!(message.contains("x coordinate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_records_are_skipped_when_lenient() {
        let text = "$Nodes\n3\n1 0 0 0\n2 abc 0 0\n3 0 1 0\n$EndNodes\n\
$Elements\n2\n1 2 0 0 3 1 2 3\n2 x 0 0 2 1 3\n$EndElements\n";
        let geometry = parse_geometry(text, &ReaderOptions::lenient()).expect("parse");
        assert_eq!(geometry.nodes.len(), 2);
        assert!(!geometry.nodes.contains_key(&2));
        assert_eq!(geometry.elements.len(), 1);
        assert_eq!(geometry.skipped_records, 2);
    }

    #[test]
    fn truncated_sections_are_fatal_even_when_lenient() {
        let text = "$Nodes\n3\n1 0 0 0\n$EndNodes\n";
        let err = parse_geometry(text, &ReaderOptions::lenient()).expect_err("should fail");
        assert!(err.to_string().contains("unexpected end of section"));
    }

    #[test]
    fn oversized_block_count_is_a_parse_error() {
        let text = "$MeshFormat\n4.1 0 8\n$EndMeshFormat\n\
$Nodes\n2 1 0 4\n0 1 0 4611686018427387903\n1\n$EndNodes\n";
        let err = parse_geometry(text, &ReaderOptions::lenient()).expect_err("should fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::Malformed);
        assert!(err.to_string().contains("unexpected end of section"));
    }

    #[test]
    fn out_of_range_block_header_fields_are_rejected() {
        let text = "$MeshFormat\n4.1 0 8\n$EndMeshFormat\n\
$Nodes\n1 1 1 1\n0 1 0 1\n1\n0 0 0\n$EndNodes\n\
$Elements\n1 1 1 1\n0 1 4294967298 1\n1 1\n$EndElements\n";
        let err = parse_geometry(text, &ReaderOptions::default()).expect_err("should fail");
        match err {
            IoError::Parse { section, line, message } => {
                assert_eq!(section, "Elements");
                assert_eq!(line, 12);
                assert!(message.contains("element type out of range"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_block_count_reports_header_line() {
        let text = "$MeshFormat\n4.1 0 8\n$EndMeshFormat\n$Nodes\n-1 0 0 0\n$EndNodes\n";
        let err = parse_geometry(text, &ReaderOptions::default()).expect_err("should fail");
        assert!(matches!(err, IoError::Parse { line: 5, .. }));
    }

    #[test]
    fn unknown_element_types_are_kept_in_geometry() {
        let text = "$Nodes\n1\n1 0 0 0\n$EndNodes\n$Elements\n1\n1 99 0 0 1 1\n$EndElements\n";
        let geometry = parse_geometry(text, &ReaderOptions::default()).expect("parse");
        assert_eq!(geometry.elements[&1].element_type, 99);
    }

    #[test]
    fn reparsing_is_deterministic() {
        let first = parse_geometry(V4_MESH, &ReaderOptions::default()).expect("parse");
        let second = parse_geometry(V4_MESH, &ReaderOptions::default()).expect("parse");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_reported_before_parsing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Geometry::from_file(dir.path().join("absent.msh"), &ReaderOptions::default())
            .expect_err("should fail");
        assert!(matches!(err, IoError::FileNotFound(_)));
    }
}
