//! GetDP `.res` (solution) reader
//!
//! Two shapes exist, told apart by the presence of a `$MeshFormat` marker:
//!
//! - **Mesh-annotated**: a legacy-layout Gmsh mesh followed by `$NodeData`
//!   sections holding field values per node tag.
//! - **Tabular**: a `$ResFormat` header and one or more `$Solution`
//!   sections with one `real [imag]` row per point.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use log::debug;
use num_complex::Complex64;

use crate::error::Result;
use crate::msh::{Geometry, MshFamily, parse_geometry_as};
use crate::options::{ReaderOptions, RecordPolicy};
use crate::sections::{LineCursor, Section, find_section, find_sections, parse_token, read_text};

/// One `$NodeData` dataset
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub name: String,
    pub time: f64,
    pub time_step: i64,
    pub num_components: usize,
    /// Node tag → component values
    pub values: BTreeMap<u64, Vec<f64>>,
}

impl NodeData {
    /// One complex sample per node in ascending tag order. Two or more
    /// components are read as real and imaginary parts.
    pub fn samples(&self) -> Vec<Complex64> {
        self.values
            .values()
            .map(|components| {
                let re = components.first().copied().unwrap_or(0.0);
                let im = if self.num_components >= 2 {
                    components.get(1).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                Complex64::new(re, im)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshSolution {
    pub geometry: Geometry,
    pub node_data: Vec<NodeData>,
    /// NodeData rows dropped under [`RecordPolicy::Skip`]
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResFormat {
    pub description: String,
    pub version: String,
}

/// One `$Solution` section
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionStep {
    pub info: String,
    pub samples: Vec<Complex64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularSolution {
    pub format: Option<ResFormat>,
    pub steps: Vec<SolutionStep>,
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolutionFile {
    Mesh(MeshSolution),
    Tabular(TabularSolution),
}

impl SolutionFile {
    pub fn from_file(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let text = read_text(path.as_ref())?;
        parse_solution(&text, options)
    }

    /// Samples aligned to point order: the first dataset or step.
    pub fn samples(&self) -> Vec<Complex64> {
        match self {
            SolutionFile::Mesh(mesh) => mesh
                .node_data
                .first()
                .map(NodeData::samples)
                .unwrap_or_default(),
            SolutionFile::Tabular(table) => table
                .steps
                .first()
                .map(|step| step.samples.clone())
                .unwrap_or_default(),
        }
    }

    pub fn has_mesh(&self) -> bool {
        matches!(self, SolutionFile::Mesh(mesh) if !mesh.geometry.is_empty())
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            SolutionFile::Mesh(mesh) => Some(&mesh.geometry),
            SolutionFile::Tabular(_) => None,
        }
    }
}

pub fn parse_solution(text: &str, options: &ReaderOptions) -> Result<SolutionFile> {
    if text.contains("$MeshFormat") {
        parse_mesh_solution(text, options).map(SolutionFile::Mesh)
    } else {
        parse_tabular_solution(text, options).map(SolutionFile::Tabular)
    }
}

fn parse_mesh_solution(text: &str, options: &ReaderOptions) -> Result<MeshSolution> {
    // Solution meshes are always written with the legacy layout
    let geometry = parse_geometry_as(text, MshFamily::Legacy, options)?;
    let mut skipped = 0usize;
    let node_data = find_sections(text, "NodeData")?
        .into_iter()
        .map(|section| parse_node_data(section, options.record_policy, &mut skipped))
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "parsed mesh solution: {} nodes, {} NodeData datasets",
        geometry.nodes.len(),
        node_data.len()
    );
    Ok(MeshSolution {
        geometry,
        node_data,
        skipped_records: skipped,
    })
}

/// Reads a `count` line followed by `count` single-value lines.
/// Each value keeps its line number.
fn parse_tag_group<'a>(cursor: &mut LineCursor<'a>, what: &str) -> Result<Vec<(usize, &'a str)>> {
    let (line, text) = cursor.next_line(what)?;
    let count: usize = parse_token(text.split_whitespace().next(), what, cursor.section(), line)?;
    (0..count).map(|_| cursor.next_line(what)).collect()
}

/// Tag `index` converted to `T`, or `default` when the group is shorter.
fn tag_value<T: FromStr>(
    tags: &[(usize, &str)],
    index: usize,
    what: &str,
    section: &str,
    default: T,
) -> Result<T> {
    match tags.get(index) {
        Some(&(line, raw)) => parse_token(Some(raw), what, section, line),
        None => Ok(default),
    }
}

fn parse_node_data(
    section: Section<'_>,
    policy: RecordPolicy,
    skipped: &mut usize,
) -> Result<NodeData> {
    let mut cursor = section.cursor();
    let strings = parse_tag_group(&mut cursor, "string tag count")?;
    let reals = parse_tag_group(&mut cursor, "real tag count")?;
    let integers = parse_tag_group(&mut cursor, "integer tag count")?;

    let name = strings
        .first()
        .map(|(_, raw)| raw.trim_matches('"').to_string())
        .unwrap_or_default();
    let time = tag_value(&reals, 0, "time value", section.name, 0.0)?;
    let time_step = tag_value(&integers, 0, "time step", section.name, 0i64)?;
    let num_components = tag_value(&integers, 1, "component count", section.name, 1usize)?;
    let num_nodes = tag_value(&integers, 2, "node count", section.name, 0usize)?;

    let mut values = BTreeMap::new();
    for _ in 0..num_nodes {
        let (line, text) = cursor.next_line("node value row")?;
        let row = (|| -> Result<_> {
            let mut parts = text.split_whitespace();
            let tag: u64 = parse_token(parts.next(), "node tag", section.name, line)?;
            let components = (0..num_components)
                .map(|_| parse_token(parts.next(), "component value", section.name, line))
                .collect::<Result<Vec<f64>>>()?;
            Ok((tag, components))
        })();
        if let Some((tag, components)) = policy.apply(row, skipped)? {
            values.insert(tag, components);
        }
    }

    Ok(NodeData {
        name,
        time,
        time_step,
        num_components,
        values,
    })
}

/// `/* text */` → `text`
fn comment_text(annotation: &str) -> String {
    annotation
        .trim()
        .trim_start_matches("/*")
        .trim_end_matches("*/")
        .trim()
        .to_string()
}

fn parse_tabular_solution(text: &str, options: &ReaderOptions) -> Result<TabularSolution> {
    let mut table = TabularSolution::default();

    if let Some(section) = find_section(text, "ResFormat")? {
        table.format = Some(ResFormat {
            description: comment_text(section.annotation),
            version: section
                .lines()
                .next()
                .map(|(_, line)| line.to_string())
                .unwrap_or_default(),
        });
    }

    for section in find_sections(text, "Solution")? {
        let mut samples = Vec::new();
        for (line, row) in section.lines() {
            let sample = (|| -> Result<_> {
                let mut parts = row.split_whitespace();
                let re: f64 = parse_token(parts.next(), "real part", section.name, line)?;
                let im: f64 = match parts.next() {
                    Some(raw) => parse_token(Some(raw), "imaginary part", section.name, line)?,
                    None => 0.0,
                };
                Ok(Complex64::new(re, im))
            })();
            if let Some(sample) = options.record_policy.apply(sample, &mut table.skipped_records)? {
                samples.push(sample);
            }
        }
        table.steps.push(SolutionStep {
            info: comment_text(section.annotation),
            samples,
        });
    }

    debug!(
        "parsed tabular solution: {} steps, {} samples in the first",
        table.steps.len(),
        table.steps.first().map_or(0, |step| step.samples.len())
    );
    Ok(table)
}
