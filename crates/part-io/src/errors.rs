use part_kernel::GeometryError;

use crate::format::PartFormat;

/// Top-level error for every file adapter.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(PartFormat),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Iges(#[from] IgesError),

    #[error(transparent)]
    Brep(#[from] BrepError),

    #[error(transparent)]
    Stl(#[from] StlError),
}

/// Errors while parsing or translating an ISO 10303-21 file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("STEP syntax error: {0}")]
    Syntax(String),

    #[error("duplicate STEP entity #{0}")]
    DuplicateEntity(u64),

    #[error("missing STEP entity #{0}")]
    MissingEntity(u64),

    #[error("STEP entity #{id}: expected {expected}, got {actual}")]
    UnexpectedType { id: u64, expected: String, actual: String },

    #[error("STEP entity #{id}: bad argument {index}: {message}")]
    BadArgument { id: u64, index: usize, message: String },

    #[error("STEP entity #{0}: curve references nested too deeply")]
    TooDeep(u64),

    #[error("invalid STEP geometry: {0}")]
    Geometry(#[from] GeometryError),
}

impl StepError {
    pub fn unexpected(id: u64, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::UnexpectedType {
            id,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Errors while reading or translating an IGES 5.3 file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IgesError {
    #[error("IGES record {line}: {message}")]
    Section { line: usize, message: String },

    #[error("IGES directory entry {de}: {message}")]
    Directory { de: usize, message: String },

    #[error("IGES parameter data for entry {de}: {message}")]
    Parameter { de: usize, message: String },

    #[error("IGES entity {entity_type} (entry {de}): {message}")]
    Entity { de: usize, entity_type: u32, message: String },

    #[error("invalid IGES geometry: {0}")]
    Geometry(#[from] GeometryError),
}

/// Errors during native BREP loading.
#[derive(Debug, thiserror::Error)]
pub enum BrepError {
    #[error("failed to parse BREP document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown BREP format: {0}")]
    UnknownFormat(String),

    #[error("BREP version {file_version} is newer than supported version {supported_version}")]
    FutureVersion { file_version: u32, supported_version: u32 },
}

/// Errors while reading or writing STL.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StlError {
    #[error("binary STL truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("ASCII STL line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("mesh has no triangles")]
    EmptyMesh,
}
