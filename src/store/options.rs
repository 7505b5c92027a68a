//! Reader and writer options.

use super::SampleFormat;
use crate::util::{Error, Result};

/// Options for opening a store for reading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Allow seeking and peeking. Requires a regular file.
    pub random_access: bool,
    /// Traces per bulk read. Derived from the trace size when unset.
    pub buffer_traces: Option<usize>,
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn random_access(mut self, enabled: bool) -> Self {
        self.random_access = enabled;
        self
    }

    pub fn buffer_traces(mut self, count: usize) -> Self {
        self.buffer_traces = Some(count);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_traces == Some(0) {
            return Err(Error::InvalidConfig("buffer_traces must be at least 1".into()));
        }
        Ok(())
    }
}

/// Options for creating a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    /// Traces per bulk write. Derived from the trace size when unset.
    pub buffer_traces: Option<usize>,
    /// Sample representation on disk.
    pub sample_format: SampleFormat,
    /// Replace an existing file.
    pub overwrite: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            buffer_traces: None,
            sample_format: SampleFormat::Float32,
            overwrite: true,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_traces(mut self, count: usize) -> Self {
        self.buffer_traces = Some(count);
        self
    }

    pub fn sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    /// Select the sample format by stored byte width (4, 2 or 1).
    pub fn sample_byte_width(mut self, width: i32) -> Result<Self> {
        self.sample_format = SampleFormat::from_byte_width(width).ok_or_else(|| {
            Error::InvalidConfig(format!("sample byte width must be 4, 2 or 1, got {width}"))
        })?;
        Ok(self)
    }

    pub fn overwrite(mut self, allow: bool) -> Self {
        self.overwrite = allow;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_traces == Some(0) {
            return Err(Error::InvalidConfig("buffer_traces must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let r = ReaderOptions::new().random_access(true).buffer_traces(7);
        assert!(r.random_access);
        assert_eq!(r.buffer_traces, Some(7));
        assert!(ReaderOptions::new().buffer_traces(0).validate().is_err());

        let w = WriterOptions::new().sample_byte_width(2).unwrap().overwrite(false);
        assert_eq!(w.sample_format, SampleFormat::Quantized16);
        assert!(!w.overwrite);
        assert!(WriterOptions::new().sample_byte_width(3).is_err());
    }
}
