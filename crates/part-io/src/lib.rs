//! Reading and writing parts: format detection, STEP, IGES, the native
//! BREP document and STL meshes.

pub mod brep;
pub mod errors;
pub mod format;
pub mod iges;
pub mod load;
mod numbers;
pub mod progress;
pub mod save;
pub mod step;
pub mod stl;

pub use brep::{read_brep_str, write_brep_string, BREP_FORMAT_NAME, BREP_FORMAT_VERSION};
pub use errors::{BrepError, IgesError, IoError, StepError, StlError};
pub use format::{part_format, sniff_format, PartFormat};
pub use iges::{read_iges_str, write_iges_string, IgesUnit, IgesWriteMode, IgesWriterConfig};
pub use load::{
    load_brep_file, load_iges_file, load_part_file, load_step_file, load_stl_file, read_brep_file, read_iges_file,
    read_part_file, read_step_file, read_stl_file,
};
pub use progress::{ProgressEvent, ProgressIndicator, ProgressLog};
pub use save::{
    write_ascii_stl_file, write_binary_stl_file, write_brep_file, write_iges_file, write_iges_file_with,
    write_step_file, write_step_file_with, write_stl_file, write_stl_file_with,
};
pub use step::{read_step_str, write_step_string, StepLengthUnit, StepWriterConfig};
pub use stl::{mesh_shape, read_stl_bytes, write_ascii_stl, write_binary_stl, StlMode, StlWriterConfig};
