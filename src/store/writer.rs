//! Buffered trace writer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, trace};

use super::compression::encode_samples;
use super::header::encode_file_header;
use super::{buffer_capacity, FormatVersion, Magic, SampleFormat, StoreConfig, WriterOptions};
use crate::util::{Error, Result};

#[derive(Clone, Copy, Debug)]
struct WriterGeometry {
    header_block: usize,
    sample_count: usize,
    sample_format: SampleFormat,
}

/// Writer for one store file. Always emits the latest format version.
///
/// Traces are staged in memory and written in batches. Call
/// [`close`](Self::close) to observe flush errors; dropping an open writer
/// flushes on a best-effort basis.
pub struct StoreWriter {
    path: PathBuf,
    file: File,
    options: WriterOptions,
    geometry: Option<WriterGeometry>,
    capacity: usize,
    buffer: Vec<u8>,
    buffered: usize,
    traces_written: u64,
    closed: bool,
}

impl StoreWriter {
    /// Create the destination file.
    pub fn create(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let mut open = OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }
        let file = open.open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => Error::FileExists(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            options,
            geometry: None,
            capacity: 0,
            buffer: Vec::new(),
            buffered: 0,
            traces_written: 0,
            closed: false,
        })
    }

    /// Write the file header. The sample format comes from the writer options.
    pub fn write_header(&mut self, config: &StoreConfig) -> Result<()> {
        if self.geometry.is_some() {
            return Err(Error::protocol("file header already written"));
        }
        let mut config = config.clone();
        config.sample_format = self.options.sample_format;
        config.header_block_byte_size =
            config.header_block_byte_size.max(config.fields_byte_size());

        let bytes = encode_file_header(&config, Magic::Cseis, FormatVersion::LATEST)?;
        self.file.write_all(&bytes)?;

        let trace_bytes = config.trace_byte_size();
        let capacity = buffer_capacity(config.sample_block_byte_size(), self.options.buffer_traces);
        let bytes_needed = capacity
            .checked_mul(trace_bytes)
            .ok_or(Error::Allocation { bytes: usize::MAX })?;
        self.buffer
            .try_reserve_exact(bytes_needed)
            .map_err(|_| Error::Allocation { bytes: bytes_needed })?;

        debug!(
            "{}: header {} bytes, trace_bytes={} format={:?} buffer={}",
            self.path.display(),
            bytes.len(),
            trace_bytes,
            config.sample_format,
            capacity
        );

        self.capacity = capacity;
        self.geometry = Some(WriterGeometry {
            header_block: config.header_block_byte_size,
            sample_count: config.sample_count,
            sample_format: config.sample_format,
        });
        Ok(())
    }

    /// Append one trace.
    ///
    /// `samples` is truncated or zero-padded to the configured sample count.
    /// `header` must be exactly one header block.
    pub fn write_trace(&mut self, samples: &[f32], header: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::protocol("writer is closed"));
        }
        let geo = self
            .geometry
            .ok_or_else(|| Error::protocol("file header not written"))?;
        if header.len() != geo.header_block {
            return Err(Error::protocol(format!(
                "header of {} bytes, expected {}",
                header.len(),
                geo.header_block
            )));
        }
        self.buffer.extend_from_slice(header);
        encode_samples(samples, geo.sample_format, geo.sample_count, &mut self.buffer);
        self.buffered += 1;
        self.traces_written += 1;
        if self.buffered >= self.capacity {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buffer)?;
        trace!("flushed {} traces ({} bytes)", self.buffered, self.buffer.len());
        self.buffer.clear();
        self.buffered = 0;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.flush_buffer()?;
        self.file.flush()?;
        debug!("{}: closed after {} traces", self.path.display(), self.traces_written);
        Ok(())
    }

    /// Flush staged traces and close the file.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    /// Traces accepted so far.
    #[inline]
    pub fn traces_written(&self) -> u64 {
        self.traces_written
    }

    /// Traces per batch write (0 before the header is written).
    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("{}: failed to flush on drop: {e}", self.path.display());
        }
    }
}

impl std::fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWriter")
            .field("path", &self.path)
            .field("traces_written", &self.traces_written)
            .field("buffered", &self.buffered)
            .finish()
    }
}
