//! File loaders. The `read_*` functions report every failure; the `load_*`
//! wrappers log it and hand back an empty shape instead.

use std::fs;
use std::path::Path;

use part_kernel::Shape;
use part_tessellation::TriangleMesh;
use tracing::{info, instrument, warn};

use crate::brep::read_brep_str;
use crate::errors::IoError;
use crate::format::{part_format, PartFormat};
use crate::iges::read_iges_str;
use crate::progress::{Progress, ProgressIndicator};
use crate::step::read_step_str;
use crate::stl::read_stl_bytes;

const LOADING_SCOPE: &str = "Loading file";
const LOADING_WEIGHT: u32 = 30;
const TRANSLATING_SCOPE: &str = "Translating file";
const TRANSLATING_WEIGHT: u32 = 70;

/// Read the file text inside the loading scope, then translate it inside
/// the translating scope. Translation only starts once reading succeeded.
fn read_text_with<T, E>(
    path: &Path,
    progress: Option<&mut dyn ProgressIndicator>,
    translate: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, IoError>
where
    IoError: From<E>,
{
    let mut progress = Progress::new(progress);
    let text = {
        let _scope = progress.scope(LOADING_SCOPE, LOADING_WEIGHT);
        fs::read_to_string(path)?
    };
    let _scope = progress.scope(TRANSLATING_SCOPE, TRANSLATING_WEIGHT);
    Ok(translate(&text)?)
}

fn log_loaded(path: &Path, format: PartFormat, shape: &Shape) {
    info!(
        path = %path.display(),
        %format,
        solids = shape.solids().len(),
        faces = shape.face_count(),
        "loaded part"
    );
}

/// Load, or an empty shape on failure.
fn or_empty(path: &Path, format: PartFormat, result: Result<Shape, IoError>) -> Shape {
    match result {
        Ok(shape) => shape,
        Err(err) => {
            warn!(path = %path.display(), %format, %err, "failed to load part; returning an empty shape");
            Shape::new()
        }
    }
}

pub fn read_brep_file(
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<Shape, IoError> {
    let path = path.as_ref();
    let shape = read_text_with(path, progress, read_brep_str)?;
    log_loaded(path, PartFormat::NativeBRep, &shape);
    Ok(shape)
}

pub fn read_step_file(
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<Shape, IoError> {
    let path = path.as_ref();
    let shape = read_text_with(path, progress, read_step_str)?;
    log_loaded(path, PartFormat::Step, &shape);
    Ok(shape)
}

pub fn read_iges_file(
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<Shape, IoError> {
    let path = path.as_ref();
    let shape = read_text_with(path, progress, read_iges_str)?;
    log_loaded(path, PartFormat::Iges, &shape);
    Ok(shape)
}

/// ASCII or binary STL, told apart by content.
pub fn read_stl_file(path: impl AsRef<Path>) -> Result<TriangleMesh, IoError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let mesh = read_stl_bytes(&bytes)?;
    info!(path = %path.display(), triangles = mesh.triangle_count(), "loaded STL mesh");
    Ok(mesh)
}

#[instrument(skip(path, progress), fields(path = %path.as_ref().display()))]
pub fn load_brep_file(path: impl AsRef<Path>, progress: Option<&mut dyn ProgressIndicator>) -> Shape {
    let path = path.as_ref();
    or_empty(path, PartFormat::NativeBRep, read_brep_file(path, progress))
}

#[instrument(skip(path, progress), fields(path = %path.as_ref().display()))]
pub fn load_step_file(path: impl AsRef<Path>, progress: Option<&mut dyn ProgressIndicator>) -> Shape {
    let path = path.as_ref();
    or_empty(path, PartFormat::Step, read_step_file(path, progress))
}

#[instrument(skip(path, progress), fields(path = %path.as_ref().display()))]
pub fn load_iges_file(path: impl AsRef<Path>, progress: Option<&mut dyn ProgressIndicator>) -> Shape {
    let path = path.as_ref();
    or_empty(path, PartFormat::Iges, read_iges_file(path, progress))
}

/// Read any B-Rep format recognized by [`part_format`]. Meshes and
/// unrecognized files are [`IoError::UnsupportedFormat`].
pub fn read_part_file(
    path: impl AsRef<Path>,
    progress: Option<&mut dyn ProgressIndicator>,
) -> Result<Shape, IoError> {
    let path = path.as_ref();
    match part_format(path) {
        PartFormat::Step => read_step_file(path, progress),
        PartFormat::Iges => read_iges_file(path, progress),
        PartFormat::NativeBRep => read_brep_file(path, progress),
        other => Err(IoError::UnsupportedFormat(other)),
    }
}

/// [`read_part_file`], or an empty shape on failure.
#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load_part_file(path: impl AsRef<Path>) -> Shape {
    let path = path.as_ref();
    or_empty(path, part_format(path), read_part_file(path, None))
}

/// Load an STL mesh, or `None` on failure.
#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load_stl_file(path: impl AsRef<Path>) -> Option<TriangleMesh> {
    let path = path.as_ref();
    match read_stl_file(path) {
        Ok(mesh) => Some(mesh),
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to load STL");
            None
        }
    }
}
