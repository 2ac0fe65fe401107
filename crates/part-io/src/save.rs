//! File writers. Each one builds the complete document in memory before
//! touching the file system.

use std::fs;
use std::path::Path;

use part_kernel::Shape;
use tracing::{info, instrument};

use crate::brep::write_brep_string;
use crate::errors::IoError;
use crate::iges::{write_iges_string, IgesWriterConfig};
use crate::progress::{Progress, ProgressIndicator};
use crate::step::{write_step_string, StepWriterConfig};
use crate::stl::{mesh_shape, write_ascii_stl, write_binary_stl, StlMode, StlWriterConfig};

const WRITING_SCOPE: &str = "Writing file";
const WRITING_WEIGHT: u32 = 100;

/// Product name recorded inside exchange files.
fn part_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("part")
        .to_string()
}

fn write_with(
    path: &Path,
    progress: Option<&mut dyn ProgressIndicator>,
    build: impl FnOnce() -> Result<Vec<u8>, IoError>,
) -> Result<(), IoError> {
    let mut progress = Progress::new(progress);
    let _scope = progress.scope(WRITING_SCOPE, WRITING_WEIGHT);
    let bytes = build()?;
    fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

#[instrument(skip(shape, path, progress), fields(path = %path.as_ref().display()))]
pub fn write_brep_file(
    shape: &Shape,
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<(), IoError> {
    write_with(path.as_ref(), progress, || Ok(write_brep_string(shape)?.into_bytes()))
}

/// STEP with the default header and millimetre units.
pub fn write_step_file(
    shape: &Shape,
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<(), IoError> {
    write_step_file_with(shape, path, &StepWriterConfig::default(), progress)
}

#[instrument(skip(shape, path, config, progress), fields(path = %path.as_ref().display()))]
pub fn write_step_file_with(
    shape: &Shape,
    path: impl AsRef<Path>,
    config: &StepWriterConfig,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<(), IoError> {
    let path = path.as_ref();
    let name = part_name(path);
    write_with(path, progress, || Ok(write_step_string(shape, &name, config).into_bytes()))
}

/// IGES as trimmed surfaces in millimetres.
pub fn write_iges_file(
    shape: &Shape,
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<(), IoError> {
    write_iges_file_with(shape, path, &IgesWriterConfig::default(), progress)
}

#[instrument(skip(shape, path, config, progress), fields(path = %path.as_ref().display(), mode = ?config.mode))]
pub fn write_iges_file_with(
    shape: &Shape,
    path: impl AsRef<Path>,
    config: &IgesWriterConfig,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<(), IoError> {
    let path = path.as_ref();
    let name = part_name(path);
    write_with(path, progress, || Ok(write_iges_string(shape, &name, config).into_bytes()))
}

pub fn write_ascii_stl_file(shape: &Shape, path: impl AsRef<Path>) -> Result<(), IoError> {
    write_stl_file(shape, path, StlMode::Ascii)
}

pub fn write_binary_stl_file(shape: &Shape, path: impl AsRef<Path>) -> Result<(), IoError> {
    write_stl_file(shape, path, StlMode::Binary)
}

pub fn write_stl_file(shape: &Shape, path: impl AsRef<Path>, mode: StlMode) -> Result<(), IoError> {
    write_stl_file_with(shape, path, mode, &StlWriterConfig::default())
}

/// Tessellate `shape` at the configured deflection and write the mesh.
#[instrument(skip(shape, path, config), fields(path = %path.as_ref().display()))]
pub fn write_stl_file_with(
    shape: &Shape,
    path: impl AsRef<Path>,
    mode: StlMode,
    config: &StlWriterConfig,
) -> Result<(), IoError> {
    let path = path.as_ref();
    let name = part_name(path);
    let mesh = mesh_shape(shape, config);
    let bytes = match mode {
        StlMode::Ascii => write_ascii_stl(&mesh, &name)?.into_bytes(),
        StlMode::Binary => write_binary_stl(&mesh, &name)?,
    };
    fs::write(path, &bytes)?;
    info!(path = %path.display(), triangles = mesh.triangle_count(), "wrote STL");
    Ok(())
}
