//! File helpers: size probing, full reads and overflow-safe relative seeks.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Largest magnitude of a single relative seek.
///
/// Keeps every step representable as a 32-bit signed offset.
pub const MAX_SEEK_STEP: i64 = i32::MAX as i64 - 1;

/// Size of a regular file in bytes, or `None` when it cannot be determined
/// (pipes, devices, missing files).
pub fn file_size(path: impl AsRef<Path>) -> Option<u64> {
    let metadata = fs::metadata(path).ok()?;
    if metadata.is_file() {
        Some(metadata.len())
    } else {
        None
    }
}

/// Read until `buf` is full or the stream ends. Returns the number of bytes read.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Seek relative to the current position, splitting large displacements
/// into steps of at most [`MAX_SEEK_STEP`] bytes.
pub fn seek_relative<S: Seek + ?Sized>(stream: &mut S, offset: i64) -> io::Result<()> {
    seek_relative_capped(stream, offset, MAX_SEEK_STEP)
}

/// Same as [`seek_relative`] with an explicit step cap.
pub fn seek_relative_capped<S: Seek + ?Sized>(
    stream: &mut S,
    offset: i64,
    max_step: i64,
) -> io::Result<()> {
    if max_step <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek step must be positive",
        ));
    }
    let mut remaining = offset;
    while remaining != 0 {
        let step = remaining.clamp(-max_step, max_step);
        stream.seek(SeekFrom::Current(step))?;
        remaining -= step;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Records every relative step without touching any storage.
    #[derive(Default)]
    struct StepRecorder {
        pos: i128,
        steps: Vec<i64>,
    }

    impl Seek for StepRecorder {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            match pos {
                SeekFrom::Current(step) => {
                    self.steps.push(step);
                    self.pos += step as i128;
                    Ok(self.pos as u64)
                }
                _ => Err(io::Error::new(io::ErrorKind::Unsupported, "relative only")),
            }
        }
    }

    #[test]
    fn test_large_forward_seek() {
        let target: i64 = 3 * (1i64 << 31);
        let mut rec = StepRecorder::default();
        seek_relative(&mut rec, target).unwrap();

        assert_eq!(rec.pos, target as i128);
        assert!(rec.steps.iter().all(|s| s.abs() <= MAX_SEEK_STEP));
        assert!(rec.steps.iter().all(|s| *s > 0));
        // 3 * 2^31 needs four capped steps
        assert_eq!(rec.steps.len(), 4);
        let cumulative: i64 = rec.steps.iter().sum();
        assert_eq!(cumulative, target);
    }

    #[test]
    fn test_large_backward_seek() {
        let mut rec = StepRecorder { pos: 1 << 40, steps: Vec::new() };
        let offset = -(5 * (1i64 << 31) + 17);
        seek_relative(&mut rec, offset).unwrap();

        assert_eq!(rec.pos, (1i128 << 40) + offset as i128);
        assert!(rec.steps.iter().all(|s| *s < 0 && s.abs() <= MAX_SEEK_STEP));
    }

    #[test]
    fn test_cursor_lands_on_target() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let target = 3 * (1u64 << 31);
        seek_relative(&mut cursor, target as i64).unwrap();
        assert_eq!(cursor.position(), target);

        seek_relative(&mut cursor, -(target as i64) + 10).unwrap();
        assert_eq!(cursor.position(), 10);
    }

    #[test]
    fn test_small_cap() {
        let mut rec = StepRecorder::default();
        seek_relative_capped(&mut rec, 10, 3).unwrap();
        assert_eq!(rec.steps, vec![3, 3, 3, 1]);

        assert!(seek_relative_capped(&mut rec, 10, 0).is_err());
    }

    #[test]
    fn test_zero_seek_is_noop() {
        let mut rec = StepRecorder::default();
        seek_relative(&mut rec, 0).unwrap();
        assert!(rec.steps.is_empty());
    }

    #[test]
    fn test_read_full_short() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut cursor, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_file_size() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), [0u8; 42]).unwrap();
        assert_eq!(file_size(temp.path()), Some(42));
        assert_eq!(file_size(temp.path().with_extension("missing")), None);
    }
}
