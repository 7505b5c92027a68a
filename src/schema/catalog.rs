//! Ordered header field catalog with byte offsets.

use std::collections::HashMap;
use std::sync::Arc;

use super::{DescriptorPool, FieldDescriptor};
use crate::util::{Error, Result};

/// Ordered set of header fields.
///
/// Names are unique. The byte offset of field `i` is the sum of the widths
/// of fields `0..i`.
#[derive(Clone, Debug, Default)]
pub struct FieldCatalog {
    fields: Vec<Arc<FieldDescriptor>>,
    index: HashMap<String, usize>,
    offsets: Vec<usize>,
    byte_size: usize,
}

impl FieldCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from plain descriptors, interning them in `pool`.
    pub fn from_descriptors<'a, I>(descs: I, pool: &DescriptorPool) -> Result<Self>
    where
        I: IntoIterator<Item = &'a FieldDescriptor>,
    {
        let mut catalog = Self::new();
        for desc in descs {
            desc.validate()?;
            catalog.push(pool.intern(desc.clone()))?;
        }
        Ok(catalog)
    }

    /// Append a field. Fails if the name is already present.
    pub fn push(&mut self, desc: Arc<FieldDescriptor>) -> Result<usize> {
        if self.index.contains_key(&desc.name) {
            return Err(Error::InvalidSchema(format!(
                "duplicate header field name '{}'",
                desc.name
            )));
        }
        let idx = self.fields.len();
        self.index.insert(desc.name.clone(), idx);
        self.offsets.push(self.byte_size);
        self.byte_size += desc.byte_size();
        self.fields.push(desc);
        Ok(idx)
    }

    /// Recompute the offset table from scratch.
    pub fn reset_offsets(&mut self) {
        self.offsets.clear();
        let mut offset = 0;
        for f in &self.fields {
            self.offsets.push(offset);
            offset += f.byte_size();
        }
        self.byte_size = offset;
    }

    /// Number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the catalog is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total byte size of one header block.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Field at `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<FieldDescriptor>> {
        self.fields.get(index)
    }

    /// Index of the field called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Field called `name`.
    pub fn find(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Check if a field called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Byte offset of field `index` within the header block.
    pub fn offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    /// Iterate over the fields in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> + '_ {
        self.fields.iter()
    }

    /// Field names in order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Owned copies of the descriptors, for serialization.
    pub fn to_descriptors(&self) -> Vec<FieldDescriptor> {
        self.fields.iter().map(|f| (**f).clone()).collect()
    }
}

/// Byte-range copy plan from one header layout into another, matched by name.
///
/// Fields missing from the source are left zeroed in the target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldMapping {
    /// (source offset, target offset, length)
    ranges: Vec<(usize, usize, usize)>,
    source_size: usize,
    target_size: usize,
}

impl FieldMapping {
    /// Plan the copy from `source` into `target`.
    ///
    /// Every source field present in the target must have the same layout.
    pub fn new(source: &FieldCatalog, target: &FieldCatalog) -> Result<Self> {
        let mut ranges: Vec<(usize, usize, usize)> = Vec::new();
        for (si, field) in source.iter().enumerate() {
            let Some(ti) = target.index_of(&field.name) else {
                continue;
            };
            let target_field = &target.fields[ti];
            if field.field_type != target_field.field_type {
                return Err(Error::FieldTypeMismatch {
                    name: field.name.clone(),
                    expected: target_field.field_type,
                    actual: field.field_type,
                });
            }
            if field.element_count != target_field.element_count {
                return Err(Error::ElementCountMismatch {
                    name: field.name.clone(),
                    expected: target_field.element_count,
                    actual: field.element_count,
                });
            }
            let src = source.offsets[si];
            let dst = target.offsets[ti];
            let len = field.byte_size();
            // Merge with the previous range when both sides are contiguous.
            match ranges.last_mut() {
                Some((ps, pd, pl)) if *ps + *pl == src && *pd + *pl == dst => *pl += len,
                _ => ranges.push((src, dst, len)),
            }
        }
        Ok(Self {
            ranges,
            source_size: source.byte_size(),
            target_size: target.byte_size(),
        })
    }

    /// True when the copy is a plain prefix copy (source layout is a prefix of target).
    pub fn is_prefix(&self) -> bool {
        match self.ranges.as_slice() {
            [] => self.source_size == 0,
            [(0, 0, len)] => *len == self.source_size,
            _ => false,
        }
    }

    /// Copy `source` into `target`, zeroing bytes with no source field.
    pub fn apply(&self, source: &[u8], target: &mut [u8]) -> Result<()> {
        if source.len() < self.source_size || target.len() < self.target_size {
            return Err(Error::protocol(format!(
                "header buffers too small for mapping: source {} < {} or target {} < {}",
                source.len(),
                self.source_size,
                target.len(),
                self.target_size
            )));
        }
        target[..self.target_size].fill(0);
        for &(src, dst, len) in &self.ranges {
            target[dst..dst + len].copy_from_slice(&source[src..src + len]);
        }
        Ok(())
    }
}
