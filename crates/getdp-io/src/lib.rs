//! Readers for Gmsh/GetDP simulation artifacts.
//!
//! This crate provides:
//! - **MSH (mesh geometry)** parser for the legacy and version-4 text layouts
//! - **PRE (DOF preprocessing)** parser for resolution and DofData blocks
//! - **RES (solution)** parser for mesh-annotated and tabular solutions
//! - **Mesh reconstruction** into point-indexed cells with per-point arrays
//! - **VTK/VTU export** for ParaView visualization
//! - **Reader session** caching the above with a JSON-serializable summary
//!
//! The free functions ([`parse_geometry`], [`parse_preprocessing`],
//! [`parse_solution`], [`reconstruct`]) form the pipeline; [`GetDpReader`]
//! composes them over files.

pub mod error;
pub mod mesh;
pub mod msh;
pub mod options;
pub mod pre;
pub mod reader;
pub mod res;
pub mod sections;
pub mod vtk_writer;

pub use error::{ErrorKind, IoError, Result};
pub use mesh::{CellKind, MeshDiagnostics, ReconstructedMesh, reconstruct};
pub use msh::{
    Element, Geometry, MeshFormat, MshFamily, PhysicalName, parse_geometry, parse_geometry_as,
};
pub use options::{ReaderOptions, RecordPolicy};
pub use pre::{
    Dof, DofDataBlock, DofPayload, DofType, Preprocessing, RawValue, Resolution,
    parse_dof_payload, parse_preprocessing,
};
pub use reader::{DofSummary, GetDpReader, MeshSummary, SolutionSummary, Summary};
pub use res::{
    MeshSolution, NodeData, ResFormat, SolutionFile, SolutionStep, TabularSolution,
    parse_solution,
};
pub use sections::{Section, find_section, find_sections};
pub use vtk_writer::{ExportFormat, MeshSink, VtkWriter, export_to_format};
