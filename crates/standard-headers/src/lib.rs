//! Standard seismic trace header catalog.
//!
//! A static name -> definition table of the trace header fields every
//! processing stage agrees on. Non-standard fields may still be created by
//! callers, but a field whose name appears here must use the type listed.
//!
//! ```
//! use standard_headers::{lookup, FieldType};
//!
//! let cdp = lookup("cdp").unwrap();
//! assert_eq!(cdp.field_type, FieldType::Int32);
//! ```

use std::fmt;

/// Storage type of a single trace header field element.
///
/// The discriminant is the one-byte tag written to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FieldType {
    /// Signed 32-bit integer
    Int32 = 1,
    /// 32-bit floating point
    Float32 = 2,
    /// 64-bit floating point
    Float64 = 3,
    /// Single byte character
    Char = 4,
    /// Fixed-size byte string; width equals the element count
    String = 5,
    /// Signed 64-bit integer
    Int64 = 6,
    /// Signed 16-bit integer
    Int16 = 7,
    /// Unsigned 16-bit integer
    Uint16 = 8,
}

impl FieldType {
    /// All known types, in tag order.
    pub const ALL: [FieldType; 8] = [
        Self::Int32,
        Self::Float32,
        Self::Float64,
        Self::Char,
        Self::String,
        Self::Int64,
        Self::Int16,
        Self::Uint16,
    ];

    /// Size in bytes of one element of this type.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Int32 => 4,
            Self::Float32 => 4,
            Self::Float64 => 8,
            Self::Char => 1,
            Self::String => 1,
            Self::Int64 => 8,
            Self::Int16 => 2,
            Self::Uint16 => 2,
        }
    }

    /// On-disk tag.
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode an on-disk tag.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Int32),
            2 => Some(Self::Float32),
            3 => Some(Self::Float64),
            4 => Some(Self::Char),
            5 => Some(Self::String),
            6 => Some(Self::Int64),
            7 => Some(Self::Int16),
            8 => Some(Self::Uint16),
            _ => None,
        }
    }

    /// Short type name used in messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Char => "char",
            Self::String => "string",
            Self::Int64 => "int64",
            Self::Int16 => "short",
            Self::Uint16 => "ushort",
        }
    }

    /// Returns true for the byte-string type.
    #[inline]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::String)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Definition of one standard header field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardHeader {
    pub name: &'static str,
    pub field_type: FieldType,
    pub element_count: u32,
    pub description: &'static str,
}

impl StandardHeader {
    const fn new(
        name: &'static str,
        field_type: FieldType,
        description: &'static str,
    ) -> Self {
        Self { name, field_type, element_count: 1, description }
    }

    const fn string(name: &'static str, width: u32, description: &'static str) -> Self {
        Self { name, field_type: FieldType::String, element_count: width, description }
    }

    /// Total byte width of the field.
    pub const fn byte_size(&self) -> usize {
        self.field_type.num_bytes() * self.element_count as usize
    }
}

/// Absolute time of the first sample, whole seconds.
pub const TIME_SAMP1: &str = "time_samp1";

/// Absolute time of the first sample, microsecond part.
pub const TIME_SAMP1_US: &str = "time_samp1_us";

use FieldType::{Char, Float32, Float64, Int16, Int32, Int64, Uint16};

/// The standard header table.
pub static STANDARD_HEADERS: &[StandardHeader] = &[
    StandardHeader::new(TIME_SAMP1, Int32, "Time of first sample [s]"),
    StandardHeader::new(TIME_SAMP1_US, Int32, "Time of first sample, sub-second part [us]"),
    StandardHeader::new("trcno", Int32, "Sequential trace number"),
    StandardHeader::new("ffid", Int32, "Field file ID"),
    StandardHeader::new("source", Int32, "Source point number"),
    StandardHeader::new("chan", Int32, "Channel number"),
    StandardHeader::new("rcv", Int32, "Receiver station number"),
    StandardHeader::new("cdp", Int32, "CDP number"),
    StandardHeader::new("il", Int32, "Inline number"),
    StandardHeader::new("xl", Int32, "Crossline number"),
    StandardHeader::new("fold", Int32, "Fold"),
    StandardHeader::new("trc_type", Int32, "Trace type (1: data, 2: dead, 3: aux)"),
    StandardHeader::new("trc_edit", Int32, "Trace edit flag"),
    StandardHeader::new("offset", Float32, "Source-receiver offset [m]"),
    StandardHeader::new("azim", Float32, "Source-receiver azimuth [deg]"),
    StandardHeader::new("incl", Float32, "Inclination [deg]"),
    StandardHeader::new("stat_tot", Float32, "Total static [ms]"),
    StandardHeader::new("sou_x", Float64, "Source X coordinate [m]"),
    StandardHeader::new("sou_y", Float64, "Source Y coordinate [m]"),
    StandardHeader::new("sou_z", Float32, "Source depth [m]"),
    StandardHeader::new("sou_elev", Float32, "Source elevation [m]"),
    StandardHeader::new("rec_x", Float64, "Receiver X coordinate [m]"),
    StandardHeader::new("rec_y", Float64, "Receiver Y coordinate [m]"),
    StandardHeader::new("rec_z", Float32, "Receiver depth [m]"),
    StandardHeader::new("rec_elev", Float32, "Receiver elevation [m]"),
    StandardHeader::new("bin_x", Float64, "Bin center X coordinate [m]"),
    StandardHeader::new("bin_y", Float64, "Bin center Y coordinate [m]"),
    StandardHeader::new("sou_line", Int32, "Source line number"),
    StandardHeader::new("rec_line", Int32, "Receiver line number"),
    StandardHeader::new("data_type", Int32, "Data type"),
    StandardHeader::new("time_first", Float32, "Time of first sample relative to t0 [ms]"),
    StandardHeader::new("row", Int16, "Matrix row index"),
    StandardHeader::new("col", Uint16, "Matrix column index"),
    StandardHeader::new("shot_time", Int64, "Shot time [us since epoch]"),
    StandardHeader::new("sensor", Char, "Sensor code"),
    StandardHeader::string("line_name", 16, "Line name"),
];

/// Look up a standard header definition by name.
pub fn lookup(name: &str) -> Option<&'static StandardHeader> {
    STANDARD_HEADERS.iter().find(|h| h.name == name)
}

/// Returns true for the fields that must be present in every catalog.
pub fn is_system_field(name: &str) -> bool {
    name == TIME_SAMP1 || name == TIME_SAMP1_US
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tags_roundtrip() {
        for t in FieldType::ALL {
            assert_eq!(FieldType::from_tag(t.tag()), Some(t));
        }
        assert_eq!(FieldType::from_tag(0), None);
        assert_eq!(FieldType::from_tag(9), None);
    }

    #[test]
    fn test_widths() {
        assert_eq!(FieldType::Int32.num_bytes(), 4);
        assert_eq!(FieldType::Float64.num_bytes(), 8);
        assert_eq!(FieldType::Uint16.num_bytes(), 2);
        assert_eq!(lookup("line_name").unwrap().byte_size(), 16);
    }

    #[test]
    fn test_names_unique() {
        let names: HashSet<_> = STANDARD_HEADERS.iter().map(|h| h.name).collect();
        assert_eq!(names.len(), STANDARD_HEADERS.len());
    }

    #[test]
    fn test_system_fields() {
        assert!(is_system_field(TIME_SAMP1));
        assert!(is_system_field(TIME_SAMP1_US));
        assert!(!is_system_field("cdp"));
        assert!(lookup(TIME_SAMP1).is_some());
        assert!(lookup("no_such_field").is_none());
    }
}
