//! Utility types and functions shared by the store and schema layers.
//!
//! - [`Error`] / [`Result`] / [`ErrorKind`] - Error handling
//! - [`FieldType`] - Header field storage types (re-exported from `standard-headers`)
//! - File helpers: size probing, full reads, bounded relative seeks

mod error;
mod file;

pub use error::*;
pub use file::*;
pub use standard_headers::FieldType;
