//! Header field descriptors and the shared descriptor pool.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use standard_headers::StandardHeader;

use crate::util::{Error, FieldType, Result};

/// Definition of one trace header field.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// Storage type of each element.
    pub field_type: FieldType,
    /// Field name, unique within a catalog.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Number of elements (string width for [`FieldType::String`]).
    pub element_count: u32,
}

impl FieldDescriptor {
    /// Create a new descriptor.
    pub fn new(
        field_type: FieldType,
        name: impl Into<String>,
        description: impl Into<String>,
        element_count: u32,
    ) -> Self {
        Self {
            field_type,
            name: name.into(),
            description: description.into(),
            element_count,
        }
    }

    /// Create a single-element descriptor with an empty description.
    pub fn scalar(field_type: FieldType, name: impl Into<String>) -> Self {
        Self::new(field_type, name, "", 1)
    }

    /// Total byte width of the field.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.field_type.num_bytes() * self.element_count as usize
    }

    /// Same type and element count (names and descriptions ignored).
    #[inline]
    pub fn same_layout(&self, other: &FieldDescriptor) -> bool {
        self.field_type == other.field_type && self.element_count == other.element_count
    }

    /// Check the name and element count are usable.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidSchema("empty header field name".into()));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidSchema(format!(
                "header field name '{}' contains whitespace",
                self.name
            )));
        }
        if self.element_count == 0 {
            return Err(Error::InvalidSchema(format!(
                "header field '{}' has zero elements",
                self.name
            )));
        }
        Ok(())
    }
}

impl From<&StandardHeader> for FieldDescriptor {
    fn from(h: &StandardHeader) -> Self {
        Self::new(h.field_type, h.name, h.description, h.element_count)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.element_count == 1 {
            write!(f, "{}:{}", self.name, self.field_type)
        } else {
            write!(f, "{}:{}[{}]", self.name, self.field_type, self.element_count)
        }
    }
}

/// Process-lifetime pool of field descriptors.
///
/// Catalogs hold `Arc`s into the pool, so a descriptor is never freed or
/// mutated while any catalog still references it. Identical definitions
/// share one allocation.
#[derive(Default)]
pub struct DescriptorPool {
    entries: RwLock<HashSet<Arc<FieldDescriptor>>>,
}

impl DescriptorPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool shared by every schema in the process.
    pub fn global() -> &'static DescriptorPool {
        static POOL: OnceLock<DescriptorPool> = OnceLock::new();
        POOL.get_or_init(DescriptorPool::new)
    }

    /// Return the pooled instance of `desc`, inserting it if new.
    pub fn intern(&self, desc: FieldDescriptor) -> Arc<FieldDescriptor> {
        if let Some(existing) = self.entries.read().get(&desc) {
            return existing.clone();
        }
        let mut entries = self.entries.write();
        // Another thread may have inserted between the two locks.
        if let Some(existing) = entries.get(&desc) {
            return existing.clone();
        }
        let arc = Arc::new(desc);
        entries.insert(arc.clone());
        arc
    }

    /// Number of distinct descriptors in the pool.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
