//! Per-trace linear sample quantization.
//!
//! A quantized sample block is `[f32 min][f32 range][q; n]` where each `q` is
//! a `u16` or `u8`. Decoding computes `q * (range / max_q) + min` in f64.

use byteorder::{ByteOrder, NativeEndian};

use super::{SampleFormat, COMPRESSION_OVERHEAD};

/// Minimum and range of the finite samples, `(0, 0)` if there are none.
///
/// The range saturates at `f32::MAX` so it stays representable.
fn scale(samples: &[f32]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &s in samples.iter().filter(|s| s.is_finite()) {
        min = min.min(s);
        max = max.max(s);
    }
    if min > max {
        return (0.0, 0.0);
    }
    let range = (max as f64 - min as f64).min(f32::MAX as f64);
    (min, range as f32)
}

/// Non-finite samples quantize to 0.
fn quantize(value: f32, min: f32, step: f64, max_q: f64) -> f64 {
    if step <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    ((value as f64 - min as f64) / step).round().clamp(0.0, max_q)
}

/// Append the stored form of `samples` to `out`.
///
/// `samples` is truncated or zero-padded to `sample_count` first.
pub fn encode_samples(
    samples: &[f32],
    format: SampleFormat,
    sample_count: usize,
    out: &mut Vec<u8>,
) {
    let n = samples.len().min(sample_count);
    let padded;
    let samples = if samples.len() == sample_count {
        samples
    } else {
        let mut v = vec![0.0f32; sample_count];
        v[..n].copy_from_slice(&samples[..n]);
        padded = v;
        &padded[..]
    };

    match format {
        SampleFormat::Float32 => out.extend_from_slice(bytemuck::cast_slice(samples)),
        SampleFormat::Quantized16 => {
            let (min, step, max_q) = put_scale(samples, format, out);
            let q: Vec<u16> = samples
                .iter()
                .map(|&s| quantize(s, min, step, max_q) as u16)
                .collect();
            out.extend_from_slice(bytemuck::cast_slice(&q));
        }
        SampleFormat::Quantized8 => {
            let (min, step, max_q) = put_scale(samples, format, out);
            out.extend(samples.iter().map(|&s| quantize(s, min, step, max_q) as u8));
        }
    }
}

/// Append the (min, range) pair and return (min, step, max_q).
fn put_scale(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) -> (f32, f64, f64) {
    let (min, range) = scale(samples);
    let max_q = format.max_quantized() as f64;
    let mut pair = [0u8; COMPRESSION_OVERHEAD];
    NativeEndian::write_f32(&mut pair[..4], min);
    NativeEndian::write_f32(&mut pair[4..], range);
    out.extend_from_slice(&pair);
    (min, range as f64 / max_q, max_q)
}

/// Decode a stored sample block into `out`.
///
/// Decodes `min(out.len(), sample_count)` samples and zero-fills the rest of `out`.
/// `block` must hold the full stored block for `sample_count` samples.
pub fn decode_samples(block: &[u8], format: SampleFormat, sample_count: usize, out: &mut [f32]) {
    let n = out.len().min(sample_count);
    let width = format.byte_width();
    match format {
        SampleFormat::Float32 => {
            NativeEndian::read_f32_into(&block[..n * width], &mut out[..n]);
        }
        SampleFormat::Quantized16 | SampleFormat::Quantized8 => {
            let min = NativeEndian::read_f32(&block[..4]) as f64;
            let range = NativeEndian::read_f32(&block[4..8]) as f64;
            let step = range / format.max_quantized() as f64;
            let data = &block[COMPRESSION_OVERHEAD..COMPRESSION_OVERHEAD + n * width];
            if format == SampleFormat::Quantized16 {
                for (o, q) in out.iter_mut().zip(data.chunks_exact(2)) {
                    *o = (NativeEndian::read_u16(q) as f64 * step + min) as f32;
                }
            } else {
                for (o, &q) in out.iter_mut().zip(data) {
                    *o = (q as f64 * step + min) as f32;
                }
            }
        }
    }
    out[n..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, lo: f32, hi: f32) -> Vec<f32> {
        (0..n)
            .map(|i| lo + (hi - lo) * i as f32 / (n - 1) as f32)
            .collect()
    }

    fn roundtrip(samples: &[f32], format: SampleFormat) -> Vec<f32> {
        let mut block = Vec::new();
        encode_samples(samples, format, samples.len(), &mut block);
        assert_eq!(block.len(), format.overhead() + samples.len() * format.byte_width());
        let mut out = vec![f32::NAN; samples.len()];
        decode_samples(&block, format, samples.len(), &mut out);
        out
    }

    #[test]
    fn test_float32_is_exact() {
        let samples = ramp(101, -3.5, 7.25);
        assert_eq!(roundtrip(&samples, SampleFormat::Float32), samples);
    }

    #[test]
    fn test_quantization_error_bound() {
        let samples = ramp(1000, -1000.0, 1000.0);
        for format in [SampleFormat::Quantized16, SampleFormat::Quantized8] {
            let bound = 2000.0 / format.max_quantized() as f64 / 2.0 + 1e-3;
            let decoded = roundtrip(&samples, format);
            for (a, b) in samples.iter().zip(&decoded) {
                assert!(
                    ((a - b).abs() as f64) <= bound,
                    "{format:?}: {a} decoded as {b}, bound {bound}"
                );
            }
        }
    }

    #[test]
    fn test_constant_trace() {
        let samples = vec![4.5f32; 32];
        for format in [SampleFormat::Quantized16, SampleFormat::Quantized8] {
            let mut block = Vec::new();
            encode_samples(&samples, format, 32, &mut block);
            // range is stored as zero and every sample quantizes to zero
            assert_eq!(NativeEndian::read_f32(&block[4..8]), 0.0);
            assert!(block[8..].iter().all(|&b| b == 0));
            assert_eq!(roundtrip(&samples, format), samples);
        }
    }

    #[test]
    fn test_extremes_hit_endpoints() {
        let samples = vec![-2.0f32, 0.0, 6.0];
        let mut block = Vec::new();
        encode_samples(&samples, SampleFormat::Quantized8, 3, &mut block);
        assert_eq!(&block[8..], &[0, 64, 255]);
    }

    #[test]
    fn test_non_finite_samples_encode_as_zero() {
        let samples = [0.0f32, 1.0, f32::INFINITY, f32::NAN, f32::NEG_INFINITY];
        let mut block = Vec::new();
        encode_samples(&samples, SampleFormat::Quantized8, 5, &mut block);
        assert_eq!(NativeEndian::read_f32(&block[..4]), 0.0);
        assert_eq!(NativeEndian::read_f32(&block[4..8]), 1.0);
        assert_eq!(&block[8..], &[0, 255, 0, 0, 0]);
    }

    #[test]
    fn test_range_saturates_at_f32_max() {
        let samples = [-3e38f32, 3e38];
        let mut block = Vec::new();
        encode_samples(&samples, SampleFormat::Quantized16, 2, &mut block);
        assert_eq!(NativeEndian::read_f32(&block[4..8]), f32::MAX);

        let decoded = roundtrip(&samples, SampleFormat::Quantized16);
        assert!(decoded.iter().all(|s| s.is_finite()), "decoded {decoded:?}");
        assert_eq!(decoded[0], -3e38);
        assert!(decoded[1] > decoded[0]);
    }

    #[test]
    fn test_pad_and_truncate() {
        let mut block = Vec::new();
        encode_samples(&[1.0, 2.0], SampleFormat::Float32, 4, &mut block);
        let mut out = [9.0f32; 4];
        decode_samples(&block, SampleFormat::Float32, 4, &mut out);
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0]);

        let mut short = [0.0f32; 1];
        decode_samples(&block, SampleFormat::Float32, 4, &mut short);
        assert_eq!(short, [1.0]);

        let mut long = [9.0f32; 6];
        decode_samples(&block, SampleFormat::Float32, 4, &mut long);
        assert_eq!(long, [1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
