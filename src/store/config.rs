//! Per-file store configuration.

use smallvec::SmallVec;

use super::SampleFormat;
use crate::schema::FieldDescriptor;
use crate::util::{Error, Result};

/// Axis of the sample dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Domain {
    #[default]
    Time,
    Depth,
    Frequency,
    /// Any other stored code, kept as-is.
    Unknown(i32),
}

impl Domain {
    /// Stored code.
    pub const fn code(self) -> i32 {
        match self {
            Self::Time => 1,
            Self::Depth => 2,
            Self::Frequency => 3,
            Self::Unknown(code) => code,
        }
    }

    /// Decode a stored code.
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Time,
            2 => Self::Depth,
            3 => Self::Frequency,
            other => Self::Unknown(other),
        }
    }
}

/// Survey grid geometry. All zero when the file predates grid support.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GridGeometry {
    pub origin_x: f64,
    pub origin_y: f64,
    pub origin_inline: i32,
    pub origin_crossline: i32,
    pub bin_inline: f64,
    pub bin_crossline: f64,
    /// Degrees.
    pub azimuth_inline: f64,
    /// Degrees.
    pub azimuth_crossline: f64,
}

/// Ensemble key names; files rarely carry more than three.
pub type EnsembleKeys = SmallVec<[String; 3]>;

/// Everything a file header describes.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    pub sample_count: usize,
    pub sample_interval: f32,
    pub domain: Domain,
    pub grid: GridGeometry,
    pub ensemble_keys: EnsembleKeys,
    pub sample_format: SampleFormat,
    /// Bytes per trace header record. At least the sum of the field widths.
    pub header_block_byte_size: usize,
    pub fields: Vec<FieldDescriptor>,
    /// Derived from the file size on read; not stored.
    pub trace_count: u64,
}

impl StoreConfig {
    /// Create a configuration with no header fields.
    pub fn new(sample_count: usize, sample_interval: f32) -> Self {
        Self {
            sample_count,
            sample_interval,
            domain: Domain::Time,
            grid: GridGeometry::default(),
            ensemble_keys: EnsembleKeys::new(),
            sample_format: SampleFormat::Float32,
            header_block_byte_size: 0,
            fields: Vec::new(),
            trace_count: 0,
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_grid(mut self, grid: GridGeometry) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_ensemble_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensemble_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    /// Set the header fields. The header block shrinks or grows to fit them.
    pub fn with_fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.fields = fields;
        self.header_block_byte_size = self.fields_byte_size();
        self
    }

    /// Sum of the field widths.
    pub fn fields_byte_size(&self) -> usize {
        self.fields.iter().map(FieldDescriptor::byte_size).sum()
    }

    /// Bytes of stored samples per trace, excluding the scale pair.
    #[inline]
    pub fn sample_block_byte_size(&self) -> usize {
        self.sample_count * self.sample_format.byte_width()
    }

    /// Bytes per trace record on disk.
    #[inline]
    pub fn trace_byte_size(&self) -> usize {
        self.header_block_byte_size + self.sample_format.overhead() + self.sample_block_byte_size()
    }

    /// Find a field and its byte offset in the header block.
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        let mut offset = 0;
        for f in &self.fields {
            if f.name == name {
                return Some((offset, f));
            }
            offset += f.byte_size();
        }
        None
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for f in &self.fields {
            f.validate()?;
            if !seen.insert(f.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate header field '{}'",
                    f.name
                )));
            }
        }
        if self.fields_byte_size() > self.header_block_byte_size {
            return Err(Error::InvalidConfig(format!(
                "header fields need {} bytes but the header block is {}",
                self.fields_byte_size(),
                self.header_block_byte_size
            )));
        }
        if !self.sample_interval.is_finite() {
            return Err(Error::InvalidConfig("sample interval is not finite".into()));
        }
        if self.trace_byte_size() == 0 {
            return Err(Error::InvalidConfig(
                "trace records would be empty: no samples and no header fields".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::FieldType;

    #[test]
    fn test_domain_codes() {
        assert_eq!(Domain::from_code(2), Domain::Depth);
        assert_eq!(Domain::from_code(77), Domain::Unknown(77));
        assert_eq!(Domain::Unknown(77).code(), 77);
        assert_eq!(Domain::Frequency.code(), 3);
    }

    #[test]
    fn test_trace_byte_size() {
        let config = StoreConfig::new(100, 2.0).with_fields(vec![
            FieldDescriptor::scalar(FieldType::Int32, "cdp"),
            FieldDescriptor::scalar(FieldType::Float64, "sou_x"),
        ]);
        assert_eq!(config.header_block_byte_size, 12);
        assert_eq!(config.trace_byte_size(), 12 + 400);

        let q = config.clone().with_sample_format(SampleFormat::Quantized8);
        assert_eq!(q.trace_byte_size(), 12 + 8 + 100);
        assert_eq!(config.field("sou_x").map(|(o, _)| o), Some(4));
    }

    #[test]
    fn test_validate() {
        let mut config = StoreConfig::new(10, 4.0).with_fields(vec![
            FieldDescriptor::scalar(FieldType::Int32, "a"),
            FieldDescriptor::scalar(FieldType::Int32, "a"),
        ]);
        assert!(config.validate().is_err());

        config.fields.pop();
        config.header_block_byte_size = 2;
        assert!(config.validate().is_err());

        config.header_block_byte_size = 16;
        assert!(config.validate().is_ok());

        assert!(StoreConfig::new(0, 1.0).validate().is_err());
    }
}
