//! I/O modules for reading StAMPS exports and boundary files

pub mod mat_reader;
pub mod boundary;

pub use mat_reader::{NamedArray, NamedArraySource, StampsReader};
pub use boundary::Boundary;
