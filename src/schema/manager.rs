//! Per-stage schema construction and multi-port merging.
//!
//! A [`SchemaManager`] is built once per processing stage from zero, one or
//! several upstream [`Schema`]s, mutated while the stage is configured, then
//! frozen into an immutable [`Schema`] before any trace data flows.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use standard_headers::{is_system_field, TIME_SAMP1, TIME_SAMP1_US};
use tracing::debug;

use super::{
    DescriptorPool, FieldCatalog, FieldDescriptor, StandardFieldRegistry, StandardHeaders,
};
use crate::util::{Error, FieldType, Result};

/// Changes one input port must apply to reach the unified layout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortDiff {
    /// Unified-catalog indices of fields the port lacks, ascending.
    pub added: Vec<usize>,
    /// Total byte width of the added fields.
    pub added_byte_size: usize,
    /// Indices into the predecessor's catalog dropped on the way in.
    pub deleted: Vec<usize>,
}

impl PortDiff {
    /// True when the port already matches the unified layout.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Frozen header schema of one processing stage.
#[derive(Clone, Debug)]
pub struct Schema {
    catalog: FieldCatalog,
    deleted: Vec<usize>,
    port_diffs: Vec<PortDiff>,
}

impl Schema {
    /// Header layout of this stage, pending deletions included.
    #[inline]
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Indices of fields marked for deletion by the next stage, ascending.
    #[inline]
    pub fn pending_deletes(&self) -> &[usize] {
        &self.deleted
    }

    /// Check if the field called `name` is marked for deletion.
    pub fn is_pending_delete(&self, name: &str) -> bool {
        self.catalog
            .index_of(name)
            .is_some_and(|i| self.deleted.binary_search(&i).is_ok())
    }

    /// Diff for input port `port`.
    pub fn port_diff(&self, port: usize) -> Option<&PortDiff> {
        self.port_diffs.get(port)
    }

    /// Number of input ports this schema was merged from.
    pub fn num_ports(&self) -> usize {
        self.port_diffs.len()
    }

    /// Byte size of one trace header block.
    #[inline]
    pub fn header_byte_size(&self) -> usize {
        self.catalog.byte_size()
    }

    /// Byte offset of the field called `name`.
    pub fn byte_location(&self, name: &str) -> Option<usize> {
        self.catalog.index_of(name).and_then(|i| self.catalog.offset(i))
    }

    /// Fields that survive into the next stage.
    pub fn live_fields(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> + '_ {
        live_fields(&self.catalog, &self.deleted)
    }
}

/// Builds and edits the header catalog of one processing stage.
pub struct SchemaManager {
    catalog: FieldCatalog,
    pending_deletes: BTreeSet<usize>,
    port_diffs: Vec<PortDiff>,
    registry: Arc<dyn StandardFieldRegistry>,
    pool: &'static DescriptorPool,
    layout_dirty: bool,
}

impl fmt::Debug for SchemaManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaManager")
            .field("catalog", &self.catalog)
            .field("pending_deletes", &self.pending_deletes)
            .field("port_diffs", &self.port_diffs)
            .finish_non_exhaustive()
    }
}

impl Default for SchemaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaManager {
    /// Schema with no predecessor: only the system fields.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(StandardHeaders))
    }

    /// Same as [`SchemaManager::new`] with a custom standard-field registry.
    pub fn with_registry(registry: Arc<dyn StandardFieldRegistry>) -> Self {
        let pool = DescriptorPool::global();
        let mut catalog = FieldCatalog::new();
        for desc in system_fields() {
            let pushed = catalog.push(pool.intern(desc));
            debug_assert!(pushed.is_ok(), "system field names are distinct");
        }
        Self {
            catalog,
            pending_deletes: BTreeSet::new(),
            port_diffs: Vec::new(),
            registry,
            pool,
            layout_dirty: false,
        }
    }

    /// Schema continuing a single upstream stage.
    pub fn from_predecessor(predecessor: &Schema) -> Result<Self> {
        Self::merge(&[predecessor])
    }

    /// Unify the schemas of several input ports.
    pub fn merge(predecessors: &[&Schema]) -> Result<Self> {
        Self::merge_with_registry(predecessors, Arc::new(StandardHeaders))
    }

    /// Same as [`SchemaManager::merge`] with a custom standard-field registry.
    pub fn merge_with_registry(
        predecessors: &[&Schema],
        registry: Arc<dyn StandardFieldRegistry>,
    ) -> Result<Self> {
        let ports: Vec<PortInput<'_>> = predecessors
            .iter()
            .map(|s| PortInput { catalog: &s.catalog, deleted: &s.deleted })
            .collect();
        Self::unify(&ports, registry)
    }

    /// Schema whose single input is a bare catalog, e.g. one read from a file.
    pub fn from_catalog(
        catalog: &FieldCatalog,
        registry: Arc<dyn StandardFieldRegistry>,
    ) -> Result<Self> {
        Self::unify(&[PortInput { catalog, deleted: &[] }], registry)
    }

    fn unify(ports: &[PortInput<'_>], registry: Arc<dyn StandardFieldRegistry>) -> Result<Self> {
        if ports.is_empty() {
            return Ok(Self::with_registry(registry));
        }
        let pool = DescriptorPool::global();

        let live: Vec<Vec<&Arc<FieldDescriptor>>> = ports
            .iter()
            .map(|p| live_fields(p.catalog, p.deleted).collect())
            .collect();

        // Port 0 seeds the layout, later ports append what is new.
        let mut unified = FieldCatalog::new();
        for fields in &live {
            for field in fields {
                match unified.find(&field.name) {
                    Some(existing) => check_compatible(existing, field)?,
                    None => {
                        unified.push(Arc::clone(field))?;
                    }
                }
            }
        }
        ensure_system_fields(&mut unified, pool)?;

        let port_diffs = ports
            .iter()
            .zip(&live)
            .enumerate()
            .map(|(port, (input, fields))| port_diff(port, &unified, fields, input.deleted))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            ports = ports.len(),
            fields = unified.len(),
            bytes = unified.byte_size(),
            "merged header schemas"
        );

        Ok(Self {
            catalog: unified,
            pending_deletes: BTreeSet::new(),
            port_diffs,
            registry,
            pool,
            layout_dirty: false,
        })
    }

    /// Add a header field, or return the index of an identical existing one.
    ///
    /// A name known to the standard registry must use the standard type.
    /// Re-adding a field that is pending deletion clears the deletion mark.
    pub fn add_header(
        &mut self,
        field_type: FieldType,
        name: &str,
        description: Option<&str>,
        element_count: u32,
    ) -> Result<usize> {
        let standard = self.registry.lookup(name);
        if let Some(std_def) = &standard {
            if std_def.field_type != field_type {
                return Err(Error::FieldTypeMismatch {
                    name: name.to_string(),
                    expected: std_def.field_type,
                    actual: field_type,
                });
            }
        }

        if let Some(idx) = self.catalog.index_of(name) {
            if let Some(existing) = self.catalog.get(idx) {
                let requested = FieldDescriptor::new(field_type, name, "", element_count);
                check_compatible(existing, &requested)?;
            }
            self.pending_deletes.remove(&idx);
            return Ok(idx);
        }

        let description = description
            .map(str::to_string)
            .or_else(|| standard.map(|s| s.description))
            .unwrap_or_default();
        let desc = FieldDescriptor::new(field_type, name, description, element_count);
        desc.validate()?;

        let idx = self.catalog.push(self.pool.intern(desc))?;
        self.layout_dirty = true;
        debug!(name, %field_type, element_count, index = idx, "added header field");
        Ok(idx)
    }

    /// Add a field from the standard registry by name.
    pub fn add_standard_header(&mut self, name: &str) -> Result<usize> {
        let def = self
            .registry
            .lookup(name)
            .ok_or_else(|| Error::FieldNotFound(format!("{name} (not a standard header)")))?;
        self.add_header(def.field_type, name, Some(def.description.as_str()), def.element_count)
    }

    /// Mark a field for deletion by the next stage.
    ///
    /// The field keeps its bytes in this stage's layout.
    pub fn delete_header(&mut self, name: &str) -> Result<()> {
        if is_system_field(name) {
            return Err(Error::MandatoryField(name.to_string()));
        }
        let idx = self
            .catalog
            .index_of(name)
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))?;
        self.pending_deletes.insert(idx);
        debug!(name, index = idx, "marked header field for deletion");
        Ok(())
    }

    /// Recompute byte offsets once configuration is complete.
    pub fn reset_byte_location(&mut self) {
        self.catalog.reset_offsets();
        self.layout_dirty = false;
    }

    /// Byte offset of the field called `name`.
    ///
    /// Fails until [`reset_byte_location`](Self::reset_byte_location) has run
    /// after the last added field.
    pub fn byte_location(&self, name: &str) -> Result<usize> {
        if self.layout_dirty {
            return Err(Error::protocol(
                "byte locations requested before reset_byte_location",
            ));
        }
        self.catalog
            .index_of(name)
            .and_then(|i| self.catalog.offset(i))
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))
    }

    /// Current catalog.
    #[inline]
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Byte size of one trace header block.
    #[inline]
    pub fn header_byte_size(&self) -> usize {
        self.catalog.byte_size()
    }

    /// Check if the field called `name` is marked for deletion.
    pub fn is_pending_delete(&self, name: &str) -> bool {
        self.catalog
            .index_of(name)
            .is_some_and(|i| self.pending_deletes.contains(&i))
    }

    /// Diff for input port `port`.
    pub fn port_diff(&self, port: usize) -> Option<&PortDiff> {
        self.port_diffs.get(port)
    }

    /// Fix the layout and hand out the immutable schema.
    pub fn freeze(mut self) -> Schema {
        self.reset_byte_location();
        Schema {
            catalog: self.catalog,
            deleted: self.pending_deletes.into_iter().collect(),
            port_diffs: self.port_diffs,
        }
    }
}

/// One predecessor as seen by the merge.
struct PortInput<'a> {
    catalog: &'a FieldCatalog,
    deleted: &'a [usize],
}

fn live_fields<'a>(
    catalog: &'a FieldCatalog,
    deleted: &'a [usize],
) -> impl Iterator<Item = &'a Arc<FieldDescriptor>> + 'a {
    catalog
        .iter()
        .enumerate()
        .filter(move |(i, _)| deleted.binary_search(i).is_err())
        .map(|(_, f)| f)
}

fn system_fields() -> [FieldDescriptor; 2] {
    [TIME_SAMP1, TIME_SAMP1_US].map(|name| match standard_headers::lookup(name) {
        Some(def) => FieldDescriptor::from(def),
        None => FieldDescriptor::scalar(FieldType::Int32, name),
    })
}

fn ensure_system_fields(catalog: &mut FieldCatalog, pool: &DescriptorPool) -> Result<()> {
    for desc in system_fields() {
        match catalog.find(&desc.name) {
            Some(existing) => check_compatible(existing, &desc)?,
            None => {
                catalog.push(pool.intern(desc))?;
            }
        }
    }
    Ok(())
}

fn check_compatible(existing: &FieldDescriptor, incoming: &FieldDescriptor) -> Result<()> {
    if existing.field_type != incoming.field_type {
        return Err(Error::FieldTypeMismatch {
            name: existing.name.clone(),
            expected: existing.field_type,
            actual: incoming.field_type,
        });
    }
    if existing.element_count != incoming.element_count {
        return Err(Error::ElementCountMismatch {
            name: existing.name.clone(),
            expected: existing.element_count,
            actual: incoming.element_count,
        });
    }
    Ok(())
}

fn port_diff(
    port: usize,
    unified: &FieldCatalog,
    fields: &[&Arc<FieldDescriptor>],
    deleted: &[usize],
) -> Result<PortDiff> {
    let mut present = HashSet::with_capacity(fields.len());
    let mut last: Option<usize> = None;
    for field in fields {
        let idx = unified.index_of(&field.name).ok_or_else(|| Error::PortConflict {
            port,
            detail: format!("field '{}' is missing from the unified layout", field.name),
        })?;
        if last.is_some_and(|prev| idx <= prev) {
            return Err(Error::PortConflict {
                port,
                detail: format!(
                    "field '{}' is ordered differently than on the other ports",
                    field.name
                ),
            });
        }
        last = Some(idx);
        present.insert(idx);
    }

    let added: Vec<usize> = (0..unified.len()).filter(|i| !present.contains(i)).collect();
    let added_byte_size = added
        .iter()
        .filter_map(|&i| unified.get(i))
        .map(|f| f.byte_size())
        .sum();

    Ok(PortDiff {
        added,
        added_byte_size,
        deleted: deleted.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[(&str, FieldType)]) -> Schema {
        let mut m = SchemaManager::new();
        for (name, t) in fields {
            m.add_header(*t, name, None, 1).unwrap();
        }
        m.freeze()
    }

    fn index(schema: &Schema, name: &str) -> usize {
        schema.catalog().index_of(name).unwrap()
    }

    #[test]
    fn test_new_has_system_fields() {
        let m = SchemaManager::new();
        assert_eq!(m.catalog().names(), vec![TIME_SAMP1, TIME_SAMP1_US]);
        assert_eq!(m.header_byte_size(), 8);
    }

    #[test]
    fn test_add_header_idempotent() {
        let mut m = SchemaManager::new();
        let a = m.add_header(FieldType::Float32, "my_val", Some("custom"), 1).unwrap();
        let b = m.add_header(FieldType::Float32, "my_val", None, 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(m.catalog().len(), 3);
        assert_eq!(m.catalog().get(a).unwrap().description, "custom");
    }

    #[test]
    fn test_add_header_conflicts() {
        let mut m = SchemaManager::new();
        m.add_header(FieldType::Float32, "my_val", None, 1).unwrap();
        assert!(matches!(
            m.add_header(FieldType::Int32, "my_val", None, 1),
            Err(Error::FieldTypeMismatch { .. })
        ));
        assert!(matches!(
            m.add_header(FieldType::Float32, "my_val", None, 2),
            Err(Error::ElementCountMismatch { .. })
        ));
        // cdp is a standard Int32 field
        assert!(matches!(
            m.add_header(FieldType::Float64, "cdp", None, 1),
            Err(Error::FieldTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_standard_description_used() {
        let mut m = SchemaManager::new();
        let idx = m.add_standard_header("sou_x").unwrap();
        let f = m.catalog().get(idx).unwrap();
        assert_eq!(f.field_type, FieldType::Float64);
        assert!(!f.description.is_empty());
        assert!(m.add_standard_header("not_standard").is_err());
    }

    #[test]
    fn test_delete_header() {
        let mut m = SchemaManager::new();
        m.add_header(FieldType::Int32, "cdp", None, 1).unwrap();
        m.delete_header("cdp").unwrap();
        assert!(m.is_pending_delete("cdp"));
        // Still occupies bytes in this stage
        assert_eq!(m.header_byte_size(), 12);

        assert!(matches!(m.delete_header(TIME_SAMP1), Err(Error::MandatoryField(_))));
        assert!(matches!(m.delete_header("nope"), Err(Error::FieldNotFound(_))));

        // Re-adding clears the mark
        m.add_header(FieldType::Int32, "cdp", None, 1).unwrap();
        assert!(!m.is_pending_delete("cdp"));
    }

    #[test]
    fn test_deleted_fields_dropped_downstream() {
        let mut m = SchemaManager::new();
        m.add_header(FieldType::Int32, "cdp", None, 1).unwrap();
        m.add_header(FieldType::Float32, "offset", None, 1).unwrap();
        m.delete_header("cdp").unwrap();
        let upstream = m.freeze();
        assert_eq!(upstream.pending_deletes(), &[2]);

        let next = SchemaManager::from_predecessor(&upstream).unwrap();
        assert_eq!(next.catalog().names(), vec![TIME_SAMP1, TIME_SAMP1_US, "offset"]);
        let diff = next.port_diff(0).unwrap();
        assert!(diff.added.is_empty());
        assert_eq!(diff.deleted, vec![2]);
    }

    #[test]
    fn test_byte_location_requires_reset() {
        let mut m = SchemaManager::new();
        m.add_header(FieldType::Float64, "sou_x", None, 1).unwrap();
        assert!(matches!(m.byte_location("sou_x"), Err(Error::Protocol(_))));
        m.reset_byte_location();
        assert_eq!(m.byte_location("sou_x").unwrap(), 8);
    }

    #[test]
    fn test_three_port_merge() {
        let a = schema(&[("x", FieldType::Int32), ("y", FieldType::Float32)]);
        let b = schema(&[("x", FieldType::Int32), ("z", FieldType::Float64)]);
        let c = schema(&[
            ("x", FieldType::Int32),
            ("y", FieldType::Float32),
            ("z", FieldType::Float64),
        ]);

        let merged = SchemaManager::merge(&[&a, &b, &c]).unwrap().freeze();
        assert_eq!(
            merged.catalog().names(),
            vec![TIME_SAMP1, TIME_SAMP1_US, "x", "y", "z"]
        );
        assert_eq!(merged.num_ports(), 3);

        let da = merged.port_diff(0).unwrap();
        assert_eq!(da.added, vec![index(&merged, "z")]);
        assert_eq!(da.added_byte_size, 8);

        let db = merged.port_diff(1).unwrap();
        assert_eq!(db.added, vec![index(&merged, "y")]);
        assert_eq!(db.added_byte_size, 4);

        assert!(merged.port_diff(2).unwrap().is_empty());
    }

    #[test]
    fn test_merge_type_mismatch() {
        let a = schema(&[("x", FieldType::Int32)]);
        let b = schema(&[("x", FieldType::Float32)]);
        let err = SchemaManager::merge(&[&a, &b]).unwrap_err();
        assert!(matches!(err, Error::FieldTypeMismatch { .. }));
        assert!(err.to_string().contains("different type"));
    }

    #[test]
    fn test_merge_element_count_mismatch() {
        let mut a = SchemaManager::new();
        a.add_header(FieldType::String, "line_name", None, 16).unwrap();
        let a = a.freeze();
        let mut b = SchemaManager::new();
        b.add_header(FieldType::String, "line_name", None, 8).unwrap();
        let b = b.freeze();

        let err = SchemaManager::merge(&[&a, &b]).unwrap_err();
        assert!(matches!(
            err,
            Error::ElementCountMismatch { expected: 16, actual: 8, .. }
        ));
        assert!(err.to_string().contains("different number of elements"));
    }

    #[test]
    fn test_merge_order_conflict() {
        let a = schema(&[("x", FieldType::Int32), ("y", FieldType::Int32)]);
        let b = schema(&[("y", FieldType::Int32), ("x", FieldType::Int32)]);
        let err = SchemaManager::merge(&[&a, &b]).unwrap_err();
        assert!(matches!(err, Error::PortConflict { port: 1, .. }));
    }

    #[test]
    fn test_from_catalog_adds_system_fields() {
        let pool = DescriptorPool::new();
        let cat = FieldCatalog::from_descriptors(
            &[FieldDescriptor::scalar(FieldType::Int32, "cdp")],
            &pool,
        )
        .unwrap();
        let m = SchemaManager::from_catalog(&cat, Arc::new(StandardHeaders)).unwrap();
        assert_eq!(m.catalog().names(), vec!["cdp", TIME_SAMP1, TIME_SAMP1_US]);
        assert_eq!(m.port_diff(0).unwrap().added, vec![1, 2]);
        assert_eq!(m.port_diff(0).unwrap().added_byte_size, 8);
    }

    #[test]
    fn test_custom_registry() {
        struct Strict;
        impl StandardFieldRegistry for Strict {
            fn lookup(&self, name: &str) -> Option<FieldDescriptor> {
                (name == "amp").then(|| FieldDescriptor::scalar(FieldType::Float64, "amp"))
            }
        }
        let mut m = SchemaManager::with_registry(Arc::new(Strict));
        assert!(m.add_header(FieldType::Float32, "amp", None, 1).is_err());
        assert!(m.add_header(FieldType::Float64, "amp", None, 1).is_ok());
        // cdp is unknown to this registry, any type is accepted
        assert!(m.add_header(FieldType::Float64, "cdp", None, 1).is_ok());
    }
}
