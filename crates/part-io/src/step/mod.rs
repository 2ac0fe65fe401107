//! ISO 10303-21 (STEP) exchange: the `ruststep` entity graph, B-Rep reader
//! and AP214 writer.

pub mod data;
pub mod reader;
pub mod writer;

use part_kernel::Shape;

use crate::errors::StepError;

pub use writer::{StepLengthUnit, StepWriterConfig};

/// Parse and translate a STEP document held in memory.
pub fn read_step_str(input: &str) -> Result<Shape, StepError> {
    let file = data::parse(input)?;
    reader::translate(&file)
}

/// Serialize `shape` as a STEP document.
pub fn write_step_string(shape: &Shape, name: &str, config: &StepWriterConfig) -> String {
    writer::write(shape, name, config)
}
