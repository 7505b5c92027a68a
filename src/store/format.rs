//! Store format constants, versions and per-version header layouts.

use crate::util::{Error, Result};

/// Magic tag written by current writers.
pub const CSEIS_MAGIC: &[u8; 5] = b"CSEIS";

/// Alternate magic tag accepted on read.
pub const OSEIS_MAGIC: &[u8; 5] = b"OSEIS";

/// Length of the magic tag.
pub const MAGIC_SIZE: usize = 5;

/// Length of the magic + version prefix ("CSEIS0.3").
pub const PREFIX_SIZE: usize = 8;

/// Size of the header-block length field that follows the prefix.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Bytes read ahead per bulk read when the caller does not choose.
pub const DEFAULT_BUFFERED_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound on traces held in one read or write buffer.
pub const MAX_BUFFERED_TRACES: usize = 20;

/// Per-trace scale pair (min, range) stored ahead of quantized samples.
pub const COMPRESSION_OVERHEAD: usize = 8;

/// File magic tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Magic {
    Cseis,
    Oseis,
}

impl Magic {
    /// The five tag bytes.
    pub const fn bytes(self) -> &'static [u8; 5] {
        match self {
            Self::Cseis => CSEIS_MAGIC,
            Self::Oseis => OSEIS_MAGIC,
        }
    }

    /// Recognize a tag.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"CSEIS" => Some(Self::Cseis),
            b"OSEIS" => Some(Self::Oseis),
            _ => None,
        }
    }
}

/// Supported on-disk format versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatVersion {
    V00,
    V01,
    V02,
    V03,
}

impl FormatVersion {
    /// Version emitted by writers.
    pub const LATEST: Self = Self::V03;

    /// All versions, oldest first.
    pub const ALL: [Self; 4] = [Self::V00, Self::V01, Self::V02, Self::V03];

    /// Three-character version text following the magic.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::V00 => "0.0",
            Self::V01 => "0.1",
            Self::V02 => "0.2",
            Self::V03 => "0.3",
        }
    }

    /// Recognize a version text.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"0.0" => Some(Self::V00),
            b"0.1" => Some(Self::V01),
            b"0.2" => Some(Self::V02),
            b"0.3" => Some(Self::V03),
            _ => None,
        }
    }

    /// Fixed fields at the start of the header block, in file order.
    pub const fn slots(self) -> &'static [HeaderSlot] {
        match self {
            Self::V00 => V00_SLOTS,
            Self::V01 | Self::V02 => V01_SLOTS,
            Self::V03 => V03_SLOTS,
        }
    }
}

/// One fixed-position value in the header block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderSlot {
    /// i32
    SampleCount,
    /// f32, milliseconds (or meters / Hz depending on domain)
    SampleInterval,
    /// i32 domain code
    Domain,
    /// f64
    OriginX,
    /// f64
    OriginY,
    /// i32
    OriginInline,
    /// i32
    OriginCrossline,
    /// f64
    BinInline,
    /// f64
    BinCrossline,
    /// f64, degrees
    AzimuthInline,
    /// f64, degrees
    AzimuthCrossline,
    /// i32: 4, 2 or 1
    SampleByteWidth,
}

impl HeaderSlot {
    /// Encoded size in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::SampleCount
            | Self::SampleInterval
            | Self::Domain
            | Self::OriginInline
            | Self::OriginCrossline
            | Self::SampleByteWidth => 4,
            Self::OriginX
            | Self::OriginY
            | Self::BinInline
            | Self::BinCrossline
            | Self::AzimuthInline
            | Self::AzimuthCrossline => 8,
        }
    }
}

use HeaderSlot::*;

const V00_SLOTS: &[HeaderSlot] = &[SampleCount, SampleInterval, Domain];

const V01_SLOTS: &[HeaderSlot] = &[
    SampleCount,
    SampleInterval,
    Domain,
    OriginX,
    OriginY,
    OriginInline,
    BinInline,
    BinCrossline,
    AzimuthInline,
];

const V03_SLOTS: &[HeaderSlot] = &[
    SampleCount,
    SampleInterval,
    Domain,
    OriginX,
    OriginY,
    OriginInline,
    OriginCrossline,
    BinInline,
    BinCrossline,
    AzimuthInline,
    AzimuthCrossline,
    SampleByteWidth,
];

/// On-disk sample representation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Raw 32-bit floats.
    #[default]
    Float32,
    /// Per-trace linear quantization to 16 bits.
    Quantized16,
    /// Per-trace linear quantization to 8 bits.
    Quantized8,
}

impl SampleFormat {
    /// Bytes per stored sample.
    pub const fn byte_width(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Quantized16 => 2,
            Self::Quantized8 => 1,
        }
    }

    /// Parse a stored byte width.
    pub const fn from_byte_width(width: i32) -> Option<Self> {
        match width {
            4 => Some(Self::Float32),
            2 => Some(Self::Quantized16),
            1 => Some(Self::Quantized8),
            _ => None,
        }
    }

    /// Largest quantized value, 0 for unquantized samples.
    pub const fn max_quantized(self) -> u32 {
        match self {
            Self::Float32 => 0,
            Self::Quantized16 => u16::MAX as u32,
            Self::Quantized8 => u8::MAX as u32,
        }
    }

    /// Extra per-trace bytes for the scale pair.
    pub const fn overhead(self) -> usize {
        match self {
            Self::Float32 => 0,
            _ => COMPRESSION_OVERHEAD,
        }
    }

    /// True for the lossy formats.
    pub const fn is_quantized(self) -> bool {
        !matches!(self, Self::Float32)
    }
}

/// Build the eight-byte file prefix.
pub fn file_prefix(magic: Magic, version: FormatVersion) -> [u8; PREFIX_SIZE] {
    let mut prefix = [0u8; PREFIX_SIZE];
    prefix[..MAGIC_SIZE].copy_from_slice(magic.bytes());
    prefix[MAGIC_SIZE..].copy_from_slice(version.tag().as_bytes());
    prefix
}

/// Split and validate a file prefix.
pub fn parse_prefix(prefix: &[u8]) -> Result<(Magic, FormatVersion)> {
    let tag = &prefix[..prefix.len().min(MAGIC_SIZE)];
    let magic = Magic::from_bytes(tag)
        .ok_or_else(|| Error::InvalidMagic(String::from_utf8_lossy(tag).into_owned()))?;
    if prefix.len() < PREFIX_SIZE {
        return Err(Error::truncated(format!(
            "file prefix is {} bytes, expected {}",
            prefix.len(),
            PREFIX_SIZE
        )));
    }
    let text = &prefix[MAGIC_SIZE..PREFIX_SIZE];
    let version = FormatVersion::from_tag(text)
        .ok_or_else(|| Error::UnsupportedVersion(String::from_utf8_lossy(text).into_owned()))?;
    Ok((magic, version))
}

/// Number of traces held per buffer.
///
/// `requested` overrides the default of `DEFAULT_BUFFERED_BYTES / sample_block_bytes`,
/// which is clamped to `1..=MAX_BUFFERED_TRACES`.
pub fn buffer_capacity(sample_block_bytes: usize, requested: Option<usize>) -> usize {
    match requested {
        Some(n) => n.max(1),
        None => (DEFAULT_BUFFERED_BYTES / sample_block_bytes.max(1)).clamp(1, MAX_BUFFERED_TRACES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_roundtrip() {
        for version in FormatVersion::ALL {
            for magic in [Magic::Cseis, Magic::Oseis] {
                let prefix = file_prefix(magic, version);
                assert_eq!(parse_prefix(&prefix).unwrap(), (magic, version));
            }
        }
        assert_eq!(&file_prefix(Magic::Cseis, FormatVersion::V03), b"CSEIS0.3");
    }

    #[test]
    fn test_bad_prefix() {
        assert!(matches!(parse_prefix(b"XSEIS0.3"), Err(Error::InvalidMagic(_))));
        assert!(matches!(parse_prefix(b"CSEIS0.9"), Err(Error::UnsupportedVersion(_))));
        assert!(matches!(parse_prefix(b"CSEIS0"), Err(Error::TruncatedHeader(_))));
        assert!(matches!(parse_prefix(b"CS"), Err(Error::InvalidMagic(_))));
    }

    #[test]
    fn test_slot_tables() {
        let size = |v: FormatVersion| v.slots().iter().map(|s| s.byte_size()).sum::<usize>();
        assert_eq!(size(FormatVersion::V00), 12);
        assert_eq!(size(FormatVersion::V01), 12 + 16 + 4 + 24);
        assert_eq!(size(FormatVersion::V02), size(FormatVersion::V01));
        assert_eq!(size(FormatVersion::V03), 12 + 16 + 8 + 16 + 16 + 4);
        assert_eq!(FormatVersion::V03.slots().last(), Some(&HeaderSlot::SampleByteWidth));
    }

    #[test]
    fn test_buffer_capacity() {
        assert_eq!(buffer_capacity(4000, None), MAX_BUFFERED_TRACES);
        assert_eq!(buffer_capacity(DEFAULT_BUFFERED_BYTES, None), 1);
        assert_eq!(buffer_capacity(DEFAULT_BUFFERED_BYTES / 7, None), 7);
        assert_eq!(buffer_capacity(4000, Some(3)), 3);
        assert_eq!(buffer_capacity(0, None), MAX_BUFFERED_TRACES);
    }

    #[test]
    fn test_sample_format() {
        assert_eq!(SampleFormat::from_byte_width(2), Some(SampleFormat::Quantized16));
        assert_eq!(SampleFormat::from_byte_width(3), None);
        assert_eq!(SampleFormat::Quantized8.max_quantized(), 255);
        assert_eq!(SampleFormat::Float32.overhead(), 0);
        assert_eq!(SampleFormat::Quantized16.overhead(), 8);
    }
}
