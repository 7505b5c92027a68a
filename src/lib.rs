//! # CSEIS trace store
//!
//! Reader and writer for the CSEIS binary seismic trace format, plus the
//! header schema machinery processing stages use to agree on a trace
//! header layout.
//!
//! ## Modules
//!
//! - [`util`] - Errors, field types and file helpers
//! - [`schema`] - Field descriptors, catalogs and multi-port schema merging
//! - [`store`] - Low-level versioned file codec (reader, writer, compression)
//! - [`archive`] - High-level API joining the codec and the schema layer
//!
//! ## Example
//!
//! ```ignore
//! use cseis_store::prelude::*;
//!
//! let mut reader = open_for_read("shots.cseis", ReaderOptions::new().random_access(true))?;
//! let config = reader.read_header()?.clone();
//! let mut samples = vec![0.0f32; config.sample_count];
//! let mut header = vec![0u8; config.header_block_byte_size];
//! reader.move_to_trace(10, None)?;
//! reader.read_trace(&mut samples, &mut header)?;
//! ```

pub mod util;
pub mod schema;
pub mod store;
pub mod archive;

// Re-export commonly used types
pub use util::{Error, ErrorKind, FieldType, Result};
pub use archive::{IArchive, OArchive};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, ErrorKind, FieldType, Result};
    pub use crate::schema::{FieldDescriptor, FieldCatalog, Schema, SchemaManager, PortDiff};
    pub use crate::store::{
        open_for_read, open_for_write, Domain, FormatVersion, GridGeometry, ReaderOptions,
        SampleFormat, StoreConfig, StoreReader, StoreWriter, WriterOptions,
    };
    pub use crate::archive::{IArchive, OArchive};
}
