//! Binary trace store format.
//!
//! A store file is a header followed by fixed-size trace records. All
//! numbers use the host byte order.
//!
//! ## File Structure
//!
//! ```text
//! +----------------------+
//! | Magic + version      |  8 bytes ("CSEIS0.3", "OSEIS0.1", ...)
//! +----------------------+
//! | Header block length  |  i32 (L)
//! +----------------------+
//! | Fixed slots          |  per-version table, see FormatVersion::slots
//! | Ensemble keys        |  i32 count, then (i32 len, bytes) each
//! | Header block size    |  i32, bytes per trace header
//! | Field definitions    |  i32 count, then (u8 type, i32 elements,
//! |                      |  i32 len + name, i32 len + description) each
//! +----------------------+  <- 12 + L
//! | Trace 0              |  header block
//! |                      |  [f32 min][f32 range]  (quantized only)
//! |                      |  samples: f32 | u16 | u8
//! +----------------------+
//! | Trace 1 ...          |
//! +----------------------+
//! ```
//!
//! Version 0.0 carries only sample count, interval and domain. Versions 0.1
//! and 0.2 add the inline grid geometry. Version 0.3 adds crossline origin and
//! azimuth and the sample byte width; it is the only version written.

mod format;
mod config;
mod options;
pub(crate) mod header;
mod compression;
mod reader;
mod writer;
mod dispatch;

pub use format::*;
pub use config::*;
pub use options::*;
pub use header::{decode_header_block, encode_header_block};
pub use compression::*;
pub use reader::*;
pub use writer::*;
pub use dispatch::*;
