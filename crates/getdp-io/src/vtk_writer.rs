//! VTK/VTU export for ParaView visualization
//!
//! A [`MeshSink`] persists a [`ReconstructedMesh`] under a format tag at a
//! path. [`VtkWriter`] is the sink shipped with the crate:
//!
//! - **VTK Legacy**: ASCII text format (.vtk)
//! - **VTU XML**: XML format with ASCII data arrays (.vtu)
//!
//! Polygon files (.ply) are a recognised tag but need a sink that supports
//! them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use getdp_io::{GetDpReader, VtkWriter, export_to_format};
//!
//! let mut reader = GetDpReader::default();
//! reader.read_msh("model.msh")?;
//! reader.read_res("model.res")?;
//! let mesh = reader.mesh()?;
//! export_to_format(mesh, "vtu", "out/model", &VtkWriter::new())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{IoError, Result};
use crate::mesh::ReconstructedMesh;

/// Export container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Legacy VTK unstructured grid
    Vtk,
    /// XML unstructured grid
    Vtu,
    /// Polygon file format
    Ply,
}

impl ExportFormat {
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "vtk" => Ok(ExportFormat::Vtk),
            "vtu" => Ok(ExportFormat::Vtu),
            "ply" => Ok(ExportFormat::Ply),
            other => Err(IoError::UnsupportedFormat(format!(
                "unknown export format '{other}'"
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Vtk => "vtk",
            ExportFormat::Vtu => "vtu",
            ExportFormat::Ply => "ply",
        }
    }
}

/// Destination for reconstructed meshes
pub trait MeshSink {
    fn supports(&self, format: ExportFormat) -> bool;

    fn write_mesh(&self, mesh: &ReconstructedMesh, format: ExportFormat, path: &Path)
    -> Result<()>;
}

/// Exports `mesh` in the format named by `tag`. The path is used as given
/// for `vtk`; `vtu` and `ply` replace its extension. Returns the written path.
pub fn export_to_format(
    mesh: &ReconstructedMesh,
    tag: &str,
    path: impl AsRef<Path>,
    sink: &dyn MeshSink,
) -> Result<PathBuf> {
    let format = ExportFormat::from_tag(tag)?;
    if !sink.supports(format) {
        return Err(IoError::UnsupportedFormat(format!(
            "sink cannot write {} files",
            format.extension()
        )));
    }
    let path = match format {
        ExportFormat::Vtk => path.as_ref().to_path_buf(),
        ExportFormat::Vtu | ExportFormat::Ply => path.as_ref().with_extension(format.extension()),
    };
    sink.write_mesh(mesh, format, &path)?;
    Ok(path)
}

/// Text VTK writer
#[derive(Debug, Clone)]
pub struct VtkWriter {
    title: String,
}

impl Default for VtkWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl VtkWriter {
    pub fn new() -> Self {
        Self {
            title: "GetDP Results".to_string(),
        }
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Write VTK legacy format
    pub fn write_vtk<W: Write>(&self, mesh: &ReconstructedMesh, mut out: W) -> io::Result<()> {
        writeln!(out, "# vtk DataFile Version 3.0")?;
        // The title line is limited to one line
        writeln!(out, "{}", self.title.lines().next().unwrap_or_default())?;
        writeln!(out, "ASCII")?;
        writeln!(out, "DATASET UNSTRUCTURED_GRID")?;

        writeln!(out, "POINTS {} double", mesh.num_points())?;
        for [x, y, z] in &mesh.points {
            writeln!(out, "{x} {y} {z}")?;
        }

        writeln!(
            out,
            "CELLS {} {}",
            mesh.num_cells(),
            mesh.num_cells() + mesh.connectivity.len()
        )?;
        for (_, cell) in mesh.cells() {
            write!(out, "{}", cell.len())?;
            for index in cell {
                write!(out, " {index}")?;
            }
            writeln!(out)?;
        }

        writeln!(out, "CELL_TYPES {}", mesh.num_cells())?;
        for kind in &mesh.cell_types {
            writeln!(out, "{}", kind.vtk_code())?;
        }

        if !mesh.point_data.is_empty() {
            writeln!(out, "POINT_DATA {}", mesh.num_points())?;
            for (name, values) in &mesh.point_data {
                writeln!(out, "SCALARS {name} double 1")?;
                writeln!(out, "LOOKUP_TABLE default")?;
                for value in values {
                    writeln!(out, "{value}")?;
                }
            }
        }

        out.flush()
    }

    /// Write VTU XML format with ASCII data arrays
    pub fn write_vtu<W: Write>(&self, mesh: &ReconstructedMesh, mut out: W) -> io::Result<()> {
        writeln!(out, "<?xml version=\"1.0\"?>")?;
        writeln!(
            out,
            "<VTKFile type=\"UnstructuredGrid\" version=\"1.0\" byte_order=\"LittleEndian\">"
        )?;
        writeln!(out, "  <UnstructuredGrid>")?;
        writeln!(
            out,
            "    <Piece NumberOfPoints=\"{}\" NumberOfCells=\"{}\">",
            mesh.num_points(),
            mesh.num_cells()
        )?;

        if !mesh.point_data.is_empty() {
            writeln!(out, "      <PointData>")?;
            for (name, values) in &mesh.point_data {
                writeln!(
                    out,
                    "        <DataArray type=\"Float64\" Name=\"{name}\" format=\"ascii\">"
                )?;
                write_values(&mut out, values.iter())?;
                writeln!(out, "        </DataArray>")?;
            }
            writeln!(out, "      </PointData>")?;
        }

        writeln!(out, "      <Points>")?;
        writeln!(
            out,
            "        <DataArray type=\"Float64\" NumberOfComponents=\"3\" format=\"ascii\">"
        )?;
        for [x, y, z] in &mesh.points {
            writeln!(out, "          {x} {y} {z}")?;
        }
        writeln!(out, "        </DataArray>")?;
        writeln!(out, "      </Points>")?;

        writeln!(out, "      <Cells>")?;
        writeln!(
            out,
            "        <DataArray type=\"Int64\" Name=\"connectivity\" format=\"ascii\">"
        )?;
        write_values(&mut out, mesh.connectivity.iter())?;
        writeln!(out, "        </DataArray>")?;
        writeln!(
            out,
            "        <DataArray type=\"Int64\" Name=\"offsets\" format=\"ascii\">"
        )?;
        write_values(&mut out, mesh.offsets.iter())?;
        writeln!(out, "        </DataArray>")?;
        writeln!(
            out,
            "        <DataArray type=\"UInt8\" Name=\"types\" format=\"ascii\">"
        )?;
        write_values(&mut out, mesh.cell_types.iter().map(|kind| kind.vtk_code()))?;
        writeln!(out, "        </DataArray>")?;
        writeln!(out, "      </Cells>")?;

        writeln!(out, "    </Piece>")?;
        writeln!(out, "  </UnstructuredGrid>")?;
        writeln!(out, "</VTKFile>")?;
        out.flush()
    }
}

fn write_values<W: Write, T: std::fmt::Display>(
    out: &mut W,
    values: impl Iterator<Item = T>,
) -> io::Result<()> {
    write!(out, "         ")?;
    for value in values {
        write!(out, " {value}")?;
    }
    writeln!(out)
}

impl MeshSink for VtkWriter {
    fn supports(&self, format: ExportFormat) -> bool {
        matches!(format, ExportFormat::Vtk | ExportFormat::Vtu)
    }

    fn write_mesh(
        &self,
        mesh: &ReconstructedMesh,
        format: ExportFormat,
        path: &Path,
    ) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let out = BufWriter::new(File::create(path)?);
        match format {
            ExportFormat::Vtk => self.write_vtk(mesh, out)?,
            ExportFormat::Vtu => self.write_vtu(mesh, out)?,
            ExportFormat::Ply => {
                return Err(IoError::UnsupportedFormat(
                    "VtkWriter does not write ply files".to_string(),
                ));
            }
        }
        debug!(
            "wrote {} points, {} cells to {}",
            mesh.num_points(),
            mesh.num_cells(),
            path.display()
        );
        Ok(())
    }
}
