//! IGES 5.3 exchange: fixed-column records, entity reader and writer.

pub mod reader;
pub mod record;
pub mod writer;

use part_kernel::Shape;

use crate::errors::IgesError;

pub use writer::{IgesUnit, IgesWriteMode, IgesWriterConfig};

/// Parse and translate an IGES document held in memory.
pub fn read_iges_str(input: &str) -> Result<Shape, IgesError> {
    let file = record::parse(input)?;
    reader::translate(&file)
}

/// Serialize `shape` as an IGES document.
pub fn write_iges_string(shape: &Shape, name: &str, config: &IgesWriterConfig) -> String {
    writer::write(shape, name, config)
}
