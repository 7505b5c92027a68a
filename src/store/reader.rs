//! Buffered trace reader with random access and header peeking.

use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, NativeEndian};
use tracing::{debug, trace, warn};

use super::compression::decode_samples;
use super::header::decode_header_block;
use super::{
    buffer_capacity, parse_prefix, FormatVersion, ReaderOptions, SampleFormat, StoreConfig,
    LENGTH_FIELD_SIZE, PREFIX_SIZE,
};
use crate::util::{file_size, read_full, seek_relative, Error, Result};

/// Peek bookkeeping.
///
/// While peeking the stream sits away from the next sequential trace; the
/// displacement is the net byte movement since the last idle position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeekState {
    Idle,
    Peeking { anchor_trace: u64, displacement: i64 },
}

/// Record layout fixed once the file header is read.
#[derive(Clone, Copy, Debug)]
struct TraceGeometry {
    header_size: u64,
    header_block: usize,
    sample_count: usize,
    sample_format: SampleFormat,
    trace_bytes: usize,
    trace_count: Option<u64>,
}

impl TraceGeometry {
    /// Index of the trace record containing byte `pos`.
    fn trace_at(&self, pos: u64) -> u64 {
        pos.saturating_sub(self.header_size) / self.trace_bytes as u64
    }
}

/// Sequential, buffered reader for one store file.
///
/// Traces are read in bulk into an internal slab holding up to
/// [`buffer_capacity`](Self::buffer_capacity) records. With random access
/// enabled, [`move_to_trace`](Self::move_to_trace) repositions the stream and
/// [`peek`](Self::peek) reads header bytes of arbitrary traces without
/// disturbing sequential reads once reverted.
pub struct StoreReader {
    path: PathBuf,
    file: File,
    version: FormatVersion,
    options: ReaderOptions,
    file_size: Option<u64>,
    config: Option<StoreConfig>,
    geometry: Option<TraceGeometry>,
    capacity: usize,
    slab: Vec<u8>,
    slab_traces: usize,
    slab_next: usize,
    next_fill: Option<usize>,
    /// Index of the trace the next `read_trace` returns.
    current_trace: u64,
    /// Physical stream position in bytes.
    file_pos: u64,
    peek: PeekState,
}

impl StoreReader {
    /// Open `path` as a store of the given version. The header is not read yet.
    pub fn open(
        path: impl AsRef<Path>,
        version: FormatVersion,
        options: ReaderOptions,
    ) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let size = file_size(path);
        if options.random_access && size.is_none() {
            warn!(
                "{}: size unknown, random access will be refused",
                path.display()
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            version,
            options,
            file_size: size,
            config: None,
            geometry: None,
            capacity: 0,
            slab: Vec::new(),
            slab_traces: 0,
            slab_next: 0,
            next_fill: None,
            current_trace: 0,
            file_pos: 0,
            peek: PeekState::Idle,
        })
    }

    /// Read and decode the file header. Must be called exactly once, before any trace access.
    pub fn read_header(&mut self) -> Result<&StoreConfig> {
        if self.config.is_some() {
            return Err(Error::protocol("file header already read"));
        }

        let mut prefix = [0u8; PREFIX_SIZE];
        let n = read_full(&mut self.file, &mut prefix)?;
        let (_, version) = parse_prefix(&prefix[..n])?;
        if version != self.version {
            return Err(Error::corrupt(format!(
                "file is version {} but was opened as {}",
                version.tag(),
                self.version.tag()
            )));
        }

        let mut len_bytes = [0u8; LENGTH_FIELD_SIZE];
        if read_full(&mut self.file, &mut len_bytes)? < LENGTH_FIELD_SIZE {
            return Err(Error::truncated("header block length missing"));
        }
        let block_len = NativeEndian::read_i32(&len_bytes);
        let block_len = usize::try_from(block_len)
            .map_err(|_| Error::corrupt(format!("negative header block length {block_len}")))?;
        let header_size = (PREFIX_SIZE + LENGTH_FIELD_SIZE + block_len) as u64;
        if let Some(size) = self.file_size {
            if header_size > size {
                return Err(Error::truncated(format!(
                    "header needs {header_size} bytes, file has {size}"
                )));
            }
        }

        let mut block = vec![0u8; block_len];
        if read_full(&mut self.file, &mut block)? < block_len {
            return Err(Error::truncated(format!(
                "header block of {block_len} bytes ends early"
            )));
        }
        let mut config = decode_header_block(&block, version)?;

        let trace_bytes = config.trace_byte_size();
        let trace_count = self
            .file_size
            .map(|size| (size - header_size) / trace_bytes as u64);
        config.trace_count = trace_count.unwrap_or(0);

        let capacity = buffer_capacity(config.sample_block_byte_size(), self.options.buffer_traces);
        let slab_bytes = capacity
            .checked_mul(trace_bytes)
            .ok_or(Error::Allocation { bytes: usize::MAX })?;
        let mut slab = Vec::new();
        slab.try_reserve_exact(slab_bytes)
            .map_err(|_| Error::Allocation { bytes: slab_bytes })?;
        slab.resize(slab_bytes, 0);

        debug!(
            "{}: v{} samples={} hbs={} trace_bytes={} traces={:?} buffer={}",
            self.path.display(),
            version.tag(),
            config.sample_count,
            config.header_block_byte_size,
            trace_bytes,
            trace_count,
            capacity
        );

        self.geometry = Some(TraceGeometry {
            header_size,
            header_block: config.header_block_byte_size,
            sample_count: config.sample_count,
            sample_format: config.sample_format,
            trace_bytes,
            trace_count,
        });
        self.capacity = capacity;
        self.slab = slab;
        self.file_pos = header_size;
        Ok(&*self.config.insert(config))
    }

    /// Read the next trace.
    ///
    /// `samples` receives `min(samples.len(), sample_count)` values, the rest
    /// is zeroed. `header` must hold at least one header block. Returns
    /// `Ok(false)` at end of data.
    pub fn read_trace(&mut self, samples: &mut [f32], header: &mut [u8]) -> Result<bool> {
        let geo = self.geometry()?;
        self.require_idle("read_trace")?;
        if header.len() < geo.header_block {
            return Err(Error::protocol(format!(
                "header buffer of {} bytes is smaller than the {}-byte header block",
                header.len(),
                geo.header_block
            )));
        }
        if self.slab_next >= self.slab_traces && !self.refill(&geo)? {
            return Ok(false);
        }

        let start = self.slab_next * geo.trace_bytes;
        let record = &self.slab[start..start + geo.trace_bytes];
        header[..geo.header_block].copy_from_slice(&record[..geo.header_block]);
        decode_samples(
            &record[geo.header_block..],
            geo.sample_format,
            geo.sample_count,
            samples,
        );
        self.slab_next += 1;
        self.current_trace += 1;
        Ok(true)
    }

    /// Bulk-read the next batch of traces into the slab.
    fn refill(&mut self, geo: &TraceGeometry) -> Result<bool> {
        let mut count = self.next_fill.take().unwrap_or(self.capacity);
        if let Some(total) = geo.trace_count {
            let remaining = total.saturating_sub(self.current_trace);
            count = count.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        self.slab_traces = 0;
        self.slab_next = 0;
        if count == 0 {
            return Ok(false);
        }

        let want = count * geo.trace_bytes;
        let got = read_full(&mut self.file, &mut self.slab[..want])?;
        self.file_pos += got as u64;
        self.slab_traces = got / geo.trace_bytes;
        trace!(
            "refill at trace {}: {} of {} traces",
            self.current_trace,
            self.slab_traces,
            count
        );
        Ok(self.slab_traces > 0)
    }

    /// Position so the next [`read_trace`](Self::read_trace) returns trace `index`.
    ///
    /// `prefetch` limits the next bulk read to that many traces (clamped to
    /// `1..=buffer_capacity`). Returns `Ok(false)` if the seek itself fails.
    pub fn move_to_trace(&mut self, index: u64, prefetch: Option<usize>) -> Result<bool> {
        let geo = self.geometry()?;
        let total = self.require_random_access(&geo, "move_to_trace")?;
        self.require_idle("move_to_trace")?;
        if index >= total {
            return Err(Error::TraceOutOfBounds { index, count: total });
        }

        let target = geo.header_size + index * geo.trace_bytes as u64;
        self.slab_traces = 0;
        self.slab_next = 0;
        if let Err(e) = self.seek_to(target) {
            warn!("{}: seek to trace {index} failed: {e}", self.path.display());
            self.resync()?;
            self.current_trace = geo.trace_at(self.file_pos);
            return Ok(false);
        }
        self.current_trace = index;
        self.next_fill = prefetch.map(|n| n.clamp(1, self.capacity));
        Ok(true)
    }

    /// Read `out.len()` bytes starting `byte_offset` into the header of a trace.
    ///
    /// Reads from trace `trace_index`, or the next sequential trace when
    /// `None`. Returns `Ok(false)` past the last trace. Sequential reads are
    /// refused until [`revert_from_peek_position`](Self::revert_from_peek_position).
    pub fn peek(
        &mut self,
        byte_offset: usize,
        out: &mut [u8],
        trace_index: Option<u64>,
    ) -> Result<bool> {
        let geo = self.geometry()?;
        let total = self.require_random_access(&geo, "peek")?;
        let end = byte_offset.checked_add(out.len());
        if end.filter(|&e| e <= geo.header_block).is_none() {
            return Err(Error::protocol(format!(
                "peek of {} bytes at offset {} exceeds the {}-byte header block",
                out.len(),
                byte_offset,
                geo.header_block
            )));
        }
        let trace = trace_index.unwrap_or(self.current_trace);
        if trace >= total {
            return Ok(false);
        }

        let start = self.file_pos;
        let target = geo.header_size + trace * geo.trace_bytes as u64 + byte_offset as u64;
        let outcome = match self.seek_to(target) {
            Ok(()) => match read_full(&mut self.file, out) {
                Ok(got) => {
                    self.file_pos += got as u64;
                    Ok(got == out.len())
                }
                Err(e) => self.resync().and(Err(Error::Io(e))),
            },
            Err(e) => {
                warn!("{}: peek seek to trace {trace} failed: {e}", self.path.display());
                self.resync().map(|()| false)
            }
        };

        let moved = (self.file_pos as i128 - start as i128) as i64;
        self.peek = match self.peek {
            PeekState::Idle => PeekState::Peeking {
                anchor_trace: trace,
                displacement: moved,
            },
            PeekState::Peeking { displacement, .. } => PeekState::Peeking {
                anchor_trace: trace,
                displacement: displacement + moved,
            },
        };
        outcome
    }

    /// Undo every peek since the reader was last idle. No-op when not peeking.
    pub fn revert_from_peek_position(&mut self) -> Result<()> {
        let PeekState::Peeking { displacement, .. } = self.peek else {
            return Ok(());
        };
        seek_relative(&mut self.file, -displacement)?;
        self.file_pos = (self.file_pos as i128 - displacement as i128) as u64;
        self.peek = PeekState::Idle;
        Ok(())
    }

    fn geometry(&self) -> Result<TraceGeometry> {
        self.geometry
            .ok_or_else(|| Error::protocol("file header not read"))
    }

    fn require_idle(&self, op: &str) -> Result<()> {
        match self.peek {
            PeekState::Idle => Ok(()),
            PeekState::Peeking { .. } => Err(Error::protocol(format!(
                "{op} while peeking; call revert_from_peek_position first"
            ))),
        }
    }

    /// Check random access is usable and return the trace count.
    fn require_random_access(&self, geo: &TraceGeometry, op: &str) -> Result<u64> {
        if !self.options.random_access {
            return Err(Error::protocol(format!("{op} requires random access")));
        }
        geo.trace_count
            .ok_or_else(|| Error::protocol(format!("{op} requires a file of known size")))
    }

    fn seek_to(&mut self, target: u64) -> std::io::Result<()> {
        let offset = i64::try_from(target as i128 - self.file_pos as i128).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek offset overflow")
        })?;
        seek_relative(&mut self.file, offset)?;
        self.file_pos = target;
        Ok(())
    }

    /// Recover the physical position after a failed seek.
    fn resync(&mut self) -> Result<()> {
        self.file_pos = self.file.stream_position()?;
        Ok(())
    }

    /// Decoded header, once read.
    #[inline]
    pub fn config(&self) -> Option<&StoreConfig> {
        self.config.as_ref()
    }

    /// Number of traces, when the file size is known.
    #[inline]
    pub fn trace_count(&self) -> Option<u64> {
        self.geometry.and_then(|g| g.trace_count)
    }

    /// Index of the trace the next sequential read returns.
    #[inline]
    pub fn current_trace(&self) -> u64 {
        self.current_trace
    }

    /// Traces per bulk read (0 before the header is read).
    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn peek_state(&self) -> PeekState {
        self.peek
    }

    #[inline]
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes, when it is a regular file.
    #[inline]
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// Bytes before the first trace (0 before the header is read).
    #[inline]
    pub fn header_byte_size(&self) -> u64 {
        self.geometry.map_or(0, |g| g.header_size)
    }

    /// Physical stream position in bytes.
    #[inline]
    pub fn stream_position(&self) -> u64 {
        self.file_pos
    }
}

impl std::fmt::Debug for StoreReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreReader")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("current_trace", &self.current_trace)
            .field("peek", &self.peek)
            .finish()
    }
}
