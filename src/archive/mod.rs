//! High-level store access.
//!
//! - [`IArchive`] - reads a store and presents its headers in the layout of a
//!   frozen [`Schema`] (system fields always present)
//! - [`OArchive`] - writes traces laid out by an upstream [`Schema`]
//!
//! ## Example
//!
//! ```ignore
//! use cseis_store::archive::IArchive;
//! use cseis_store::store::ReaderOptions;
//!
//! let mut archive = IArchive::open("line_12.cseis", ReaderOptions::new())?;
//! let mut samples = vec![0.0f32; archive.config().sample_count];
//! let mut header = vec![0u8; archive.header_byte_size()];
//! while archive.read_trace(&mut samples, &mut header)? {
//!     // ...
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::schema::{
    DescriptorPool, FieldCatalog, FieldDescriptor, FieldMapping, Schema, SchemaManager,
    StandardFieldRegistry, StandardHeaders,
};
use crate::store::{
    open_for_read, open_for_write, FormatVersion, ReaderOptions, StoreConfig, StoreReader,
    StoreWriter, WriterOptions,
};
use crate::util::{Error, Result};

/// Suffix given to stored fields that clash with a standard definition.
pub const RENAMED_FIELD_SUFFIX: &str = "_file";

// ============================================================================
// Input
// ============================================================================

/// Input archive for reading store files.
pub struct IArchive {
    reader: StoreReader,
    config: StoreConfig,
    schema: Schema,
    file_catalog: FieldCatalog,
    mapping: FieldMapping,
    scratch: Vec<u8>,
}

impl IArchive {
    /// Open a store file and read its header.
    pub fn open(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        Self::open_with_registry(path, options, Arc::new(StandardHeaders))
    }

    /// Same as [`IArchive::open`] with a custom standard-field registry.
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        options: ReaderOptions,
        registry: Arc<dyn StandardFieldRegistry>,
    ) -> Result<Self> {
        let mut reader = open_for_read(path, options)?;
        let config = reader.read_header()?.clone();

        let fields = reconcile_fields(&config.fields, registry.as_ref());
        let file_catalog = FieldCatalog::from_descriptors(&fields, DescriptorPool::global())
            .map_err(|e| Error::corrupt(format!("stored header fields: {e}")))?;
        let schema = SchemaManager::from_catalog(&file_catalog, registry)?.freeze();
        let mapping = FieldMapping::new(&file_catalog, schema.catalog())?;

        debug!(
            "{}: {} stored fields, {} in schema",
            reader.path().display(),
            file_catalog.len(),
            schema.catalog().len()
        );

        Ok(Self {
            scratch: vec![0u8; config.header_block_byte_size],
            reader,
            config,
            schema,
            file_catalog,
            mapping,
        })
    }

    /// Read the next trace. `header` receives one block in the schema layout.
    ///
    /// Returns `Ok(false)` at end of data.
    pub fn read_trace(&mut self, samples: &mut [f32], header: &mut [u8]) -> Result<bool> {
        let size = self.schema.header_byte_size();
        if header.len() < size {
            return Err(Error::protocol(format!(
                "header buffer of {} bytes, schema needs {size}",
                header.len()
            )));
        }
        if !self.reader.read_trace(samples, &mut self.scratch)? {
            return Ok(false);
        }
        self.mapping.apply(&self.scratch, header)?;
        Ok(true)
    }

    /// Position on trace `index`. See [`StoreReader::move_to_trace`].
    pub fn move_to_trace(&mut self, index: u64, prefetch: Option<usize>) -> Result<bool> {
        self.reader.move_to_trace(index, prefetch)
    }

    /// Read the raw bytes of field `name` for one trace into `out`.
    ///
    /// Fields added by the schema but absent from the file read as zeros.
    pub fn peek_field(
        &mut self,
        name: &str,
        trace_index: Option<u64>,
        out: &mut [u8],
    ) -> Result<bool> {
        let field = self
            .schema
            .catalog()
            .find(name)
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))?;
        let size = field.byte_size();
        if out.len() < size {
            return Err(Error::protocol(format!(
                "buffer of {} bytes for field '{name}' of {size} bytes",
                out.len()
            )));
        }
        match self
            .file_catalog
            .index_of(name)
            .and_then(|i| self.file_catalog.offset(i))
        {
            Some(offset) => self.reader.peek(offset, &mut out[..size], trace_index),
            None => {
                out[..size].fill(0);
                Ok(true)
            }
        }
    }

    /// Restore the sequential position after peeking.
    pub fn revert_from_peek_position(&mut self) -> Result<()> {
        self.reader.revert_from_peek_position()
    }

    /// Decoded file header.
    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Header schema traces are presented in.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Bytes per header block returned by [`read_trace`](Self::read_trace).
    #[inline]
    pub fn header_byte_size(&self) -> usize {
        self.schema.header_byte_size()
    }

    /// Fields as stored, after renaming clashes.
    #[inline]
    pub fn file_catalog(&self) -> &FieldCatalog {
        &self.file_catalog
    }

    #[inline]
    pub fn trace_count(&self) -> Option<u64> {
        self.reader.trace_count()
    }

    #[inline]
    pub fn version(&self) -> FormatVersion {
        self.reader.version()
    }

    /// Underlying codec reader.
    #[inline]
    pub fn reader(&self) -> &StoreReader {
        &self.reader
    }
}

/// Rename stored fields whose layout differs from the standard definition
/// of the same name.
fn reconcile_fields(
    fields: &[FieldDescriptor],
    registry: &dyn StandardFieldRegistry,
) -> Vec<FieldDescriptor> {
    fields
        .iter()
        .map(|f| match registry.lookup(&f.name) {
            Some(standard) if !standard.same_layout(f) => {
                let renamed = format!("{}{RENAMED_FIELD_SUFFIX}", f.name);
                warn!(
                    "stored field {:?} conflicts with standard {:?}; renamed to '{}'",
                    f, standard, renamed
                );
                FieldDescriptor { name: renamed, ..f.clone() }
            }
            _ => f.clone(),
        })
        .collect()
}

// ============================================================================
// Output
// ============================================================================

/// Output archive for writing store files.
///
/// Fields the schema marks for deletion are dropped from the file.
pub struct OArchive {
    writer: StoreWriter,
    schema: Schema,
    mapping: Option<FieldMapping>,
    scratch: Vec<u8>,
}

impl OArchive {
    /// Create `path` and write its header.
    ///
    /// `config` supplies geometry and sample settings; its fields are
    /// replaced by the schema's surviving fields.
    pub fn create(
        path: impl AsRef<Path>,
        config: &StoreConfig,
        schema: &Schema,
        options: WriterOptions,
    ) -> Result<Self> {
        let live: Vec<FieldDescriptor> = schema.live_fields().map(|f| (**f).clone()).collect();
        let live_catalog = FieldCatalog::from_descriptors(&live, DescriptorPool::global())?;
        let mapping = FieldMapping::new(schema.catalog(), &live_catalog)?;
        let mapping = (!mapping.is_prefix()).then_some(mapping);

        let config = config.clone().with_fields(live);
        let mut writer = open_for_write(path, options)?;
        writer.write_header(&config)?;

        Ok(Self {
            writer,
            schema: schema.clone(),
            mapping,
            scratch: vec![0u8; live_catalog.byte_size()],
        })
    }

    /// Append one trace. `header` is one block in the schema layout.
    pub fn write_trace(&mut self, samples: &[f32], header: &[u8]) -> Result<()> {
        let size = self.schema.header_byte_size();
        if header.len() != size {
            return Err(Error::protocol(format!(
                "header of {} bytes, schema needs {size}",
                header.len()
            )));
        }
        match &self.mapping {
            Some(mapping) => {
                mapping.apply(header, &mut self.scratch)?;
                self.writer.write_trace(samples, &self.scratch)
            }
            None => self.writer.write_trace(samples, &header[..self.scratch.len()]),
        }
    }

    /// Flush and close the file.
    pub fn close(self) -> Result<()> {
        self.writer.close()
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn traces_written(&self) -> u64 {
        self.writer.traces_written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::FieldType;

    #[test]
    fn test_reconcile_renames_clashes() {
        let stored = vec![
            FieldDescriptor::scalar(FieldType::Float32, "cdp"),
            FieldDescriptor::scalar(FieldType::Int32, "trcno"),
            FieldDescriptor::scalar(FieldType::Float64, "sou_x"),
            FieldDescriptor::scalar(FieldType::Int16, "my_flag"),
        ];
        let fields = reconcile_fields(&stored, &StandardHeaders);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["cdp_file", "trcno", "sou_x", "my_flag"]);
        assert_eq!(fields[0].field_type, FieldType::Float32);
    }
}
