//! File header block encoding and decoding.
//!
//! One table-driven codec covers every version: the fixed slots come from
//! [`FormatVersion::slots`], the variable sections are shared.

use byteorder::{ByteOrder, NativeEndian, WriteBytesExt};
use tracing::trace;

use super::{
    file_prefix, Domain, FormatVersion, HeaderSlot, Magic, SampleFormat, StoreConfig,
    LENGTH_FIELD_SIZE, PREFIX_SIZE,
};
use crate::schema::FieldDescriptor;
use crate::util::{Error, FieldType, Result};

/// Bounds-checked cursor over a header block.
struct BlockReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let bytes = &self.buf[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(Error::truncated(format!(
                "{what} at byte {} needs {n} bytes, block has {}",
                self.pos,
                self.buf.len()
            ))),
        }
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn i32(&mut self, what: &str) -> Result<i32> {
        Ok(NativeEndian::read_i32(self.take(4, what)?))
    }

    fn f32(&mut self, what: &str) -> Result<f32> {
        Ok(NativeEndian::read_f32(self.take(4, what)?))
    }

    fn f64(&mut self, what: &str) -> Result<f64> {
        Ok(NativeEndian::read_f64(self.take(8, what)?))
    }

    /// Non-negative i32 count or length.
    fn count(&mut self, what: &str) -> Result<usize> {
        let v = self.i32(what)?;
        usize::try_from(v).map_err(|_| Error::corrupt(format!("negative {what}: {v}")))
    }

    /// i32 length followed by that many bytes.
    fn string(&mut self, what: &str) -> Result<String> {
        let len = self.count(what)?;
        let bytes = self.take(len, what)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Decode a header block (the bytes after the length field).
///
/// `trace_count` is left at zero; the reader derives it from the file size.
pub fn decode_header_block(block: &[u8], version: FormatVersion) -> Result<StoreConfig> {
    let mut r = BlockReader::new(block);
    let mut config = StoreConfig::new(0, 0.0);

    for slot in version.slots() {
        match slot {
            HeaderSlot::SampleCount => config.sample_count = r.count("sample count")?,
            HeaderSlot::SampleInterval => config.sample_interval = r.f32("sample interval")?,
            HeaderSlot::Domain => config.domain = Domain::from_code(r.i32("domain")?),
            HeaderSlot::OriginX => config.grid.origin_x = r.f64("origin x")?,
            HeaderSlot::OriginY => config.grid.origin_y = r.f64("origin y")?,
            HeaderSlot::OriginInline => config.grid.origin_inline = r.i32("origin inline")?,
            HeaderSlot::OriginCrossline => {
                config.grid.origin_crossline = r.i32("origin crossline")?
            }
            HeaderSlot::BinInline => config.grid.bin_inline = r.f64("inline bin size")?,
            HeaderSlot::BinCrossline => config.grid.bin_crossline = r.f64("crossline bin size")?,
            HeaderSlot::AzimuthInline => config.grid.azimuth_inline = r.f64("inline azimuth")?,
            HeaderSlot::AzimuthCrossline => {
                config.grid.azimuth_crossline = r.f64("crossline azimuth")?
            }
            HeaderSlot::SampleByteWidth => {
                let width = r.i32("sample byte width")?;
                config.sample_format = SampleFormat::from_byte_width(width)
                    .ok_or_else(|| Error::corrupt(format!("sample byte width {width}")))?;
            }
        }
    }

    let key_count = r.count("ensemble key count")?;
    for _ in 0..key_count {
        let key = r.string("ensemble key")?;
        config.ensemble_keys.push(key);
    }

    config.header_block_byte_size = r.count("header block byte size")?;

    let field_count = r.count("header field count")?;
    // Each field takes at least 13 bytes; reject absurd counts before allocating.
    if field_count > r.remaining() / 13 {
        return Err(Error::truncated(format!(
            "{field_count} header fields cannot fit in {} remaining bytes",
            r.remaining()
        )));
    }
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let tag = r.u8("field type")?;
        let field_type = FieldType::from_tag(tag)
            .ok_or_else(|| Error::corrupt(format!("unknown header field type tag {tag}")))?;
        let count = r.count("field element count")?;
        let element_count = u32::try_from(count)
            .map_err(|_| Error::corrupt(format!("field element count {count}")))?;
        let name = r.string("field name")?;
        let description = r.string("field description")?;
        fields.push(FieldDescriptor::new(field_type, name, description, element_count));
    }
    config.fields = fields;

    if r.remaining() > 0 {
        trace!("ignoring {} trailing header block bytes", r.remaining());
    }

    config
        .validate()
        .map_err(|e| Error::corrupt(format!("inconsistent header: {e}")))?;
    Ok(config)
}

fn put_count(out: &mut Vec<u8>, value: usize, what: &str) -> Result<()> {
    let v = i32::try_from(value)
        .map_err(|_| Error::InvalidConfig(format!("{what} {value} does not fit in 32 bits")))?;
    out.write_i32::<NativeEndian>(v)?;
    Ok(())
}

fn put_string(out: &mut Vec<u8>, s: &str, what: &str) -> Result<()> {
    put_count(out, s.len(), what)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Encode a header block for `version`.
///
/// Versions without a sample width slot can only carry 32-bit float samples.
pub fn encode_header_block(config: &StoreConfig, version: FormatVersion) -> Result<Vec<u8>> {
    config.validate()?;
    let slots = version.slots();
    if config.sample_format.is_quantized() && !slots.contains(&HeaderSlot::SampleByteWidth) {
        return Err(Error::InvalidConfig(format!(
            "version {} cannot store {:?} samples",
            version.tag(),
            config.sample_format
        )));
    }

    let mut out = Vec::with_capacity(256);
    let g = &config.grid;
    for slot in slots {
        match slot {
            HeaderSlot::SampleCount => put_count(&mut out, config.sample_count, "sample count")?,
            HeaderSlot::SampleInterval => {
                out.write_f32::<NativeEndian>(config.sample_interval)?
            }
            HeaderSlot::Domain => out.write_i32::<NativeEndian>(config.domain.code())?,
            HeaderSlot::OriginX => out.write_f64::<NativeEndian>(g.origin_x)?,
            HeaderSlot::OriginY => out.write_f64::<NativeEndian>(g.origin_y)?,
            HeaderSlot::OriginInline => out.write_i32::<NativeEndian>(g.origin_inline)?,
            HeaderSlot::OriginCrossline => out.write_i32::<NativeEndian>(g.origin_crossline)?,
            HeaderSlot::BinInline => out.write_f64::<NativeEndian>(g.bin_inline)?,
            HeaderSlot::BinCrossline => out.write_f64::<NativeEndian>(g.bin_crossline)?,
            HeaderSlot::AzimuthInline => out.write_f64::<NativeEndian>(g.azimuth_inline)?,
            HeaderSlot::AzimuthCrossline => out.write_f64::<NativeEndian>(g.azimuth_crossline)?,
            HeaderSlot::SampleByteWidth => {
                out.write_i32::<NativeEndian>(config.sample_format.byte_width() as i32)?
            }
        }
    }

    put_count(&mut out, config.ensemble_keys.len(), "ensemble key count")?;
    for key in &config.ensemble_keys {
        put_string(&mut out, key, "ensemble key length")?;
    }

    put_count(&mut out, config.header_block_byte_size, "header block byte size")?;
    put_count(&mut out, config.fields.len(), "header field count")?;
    for f in &config.fields {
        out.write_u8(f.field_type.tag())?;
        put_count(&mut out, f.element_count as usize, "field element count")?;
        put_string(&mut out, &f.name, "field name length")?;
        put_string(&mut out, &f.description, "field description length")?;
    }
    Ok(out)
}

/// Encode the complete file header: prefix, block length and block.
pub(crate) fn encode_file_header(
    config: &StoreConfig,
    magic: Magic,
    version: FormatVersion,
) -> Result<Vec<u8>> {
    let block = encode_header_block(config, version)?;
    let mut out = Vec::with_capacity(PREFIX_SIZE + LENGTH_FIELD_SIZE + block.len());
    out.extend_from_slice(&file_prefix(magic, version));
    put_count(&mut out, block.len(), "header block length")?;
    out.extend_from_slice(&block);
    Ok(out)
}
