//! Standard header registry seam.

use super::FieldDescriptor;

/// Static name -> definition catalog consulted when fields are added.
pub trait StandardFieldRegistry: Send + Sync {
    /// Definition of the standard field called `name`, if there is one.
    fn lookup(&self, name: &str) -> Option<FieldDescriptor>;
}

/// Registry backed by the `standard-headers` table.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardHeaders;

impl StandardFieldRegistry for StandardHeaders {
    fn lookup(&self, name: &str) -> Option<FieldDescriptor> {
        standard_headers::lookup(name).map(FieldDescriptor::from)
    }
}
