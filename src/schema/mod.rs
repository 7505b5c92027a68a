//! Trace header schemas.
//!
//! - [`FieldDescriptor`] / [`DescriptorPool`] - field definitions, shared for the process lifetime
//! - [`FieldCatalog`] - ordered field set with byte offsets
//! - [`FieldMapping`] - copy plan between two header layouts
//! - [`StandardFieldRegistry`] - seam to the standard header table
//! - [`SchemaManager`] / [`Schema`] / [`PortDiff`] - per-stage schema building and merging

mod descriptor;
mod catalog;
mod registry;
mod manager;

pub use descriptor::*;
pub use catalog::*;
pub use registry::*;
pub use manager::*;
