//! Format version detection and reader/writer construction.

use std::fs::File;
use std::path::Path;

use tracing::debug;

use super::{
    parse_prefix, FormatVersion, Magic, ReaderOptions, StoreReader, StoreWriter, WriterOptions,
    PREFIX_SIZE,
};
use crate::util::{read_full, Error, Result};

/// Read the eight-byte prefix of `path` and identify its magic and version.
pub fn detect_version(path: impl AsRef<Path>) -> Result<(Magic, FormatVersion)> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;
    let mut prefix = [0u8; PREFIX_SIZE];
    let n = read_full(&mut file, &mut prefix)?;
    parse_prefix(&prefix[..n])
}

/// Open a reader for whichever supported version `path` holds.
pub fn open_for_read(path: impl AsRef<Path>, options: ReaderOptions) -> Result<StoreReader> {
    let path = path.as_ref();
    let (magic, version) = detect_version(path)?;
    debug!("{}: {:?} version {}", path.display(), magic, version.tag());
    StoreReader::open(path, version, options)
}

/// Create a writer. New files always use [`FormatVersion::LATEST`].
pub fn open_for_write(path: impl AsRef<Path>, options: WriterOptions) -> Result<StoreWriter> {
    StoreWriter::create(path, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use crate::store::header::encode_file_header;
    use crate::store::{Domain, GridGeometry, StoreConfig};
    use crate::util::FieldType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn legacy_config() -> StoreConfig {
        StoreConfig::new(8, 4.0)
            .with_domain(Domain::Time)
            .with_grid(GridGeometry {
                origin_x: 5.0,
                origin_inline: 3,
                origin_crossline: 4,
                ..Default::default()
            })
            .with_fields(vec![FieldDescriptor::scalar(FieldType::Int32, "cdp")])
    }

    /// Write a legacy file holding `traces` float traces with cdp = index.
    fn write_legacy(magic: Magic, version: FormatVersion, traces: usize) -> NamedTempFile {
        let config = legacy_config();
        let mut bytes = encode_file_header(&config, magic, version).unwrap();
        for t in 0..traces {
            bytes.extend_from_slice(&(t as i32).to_ne_bytes());
            for s in 0..8 {
                bytes.extend_from_slice(&((t * 10 + s) as f32).to_ne_bytes());
            }
        }
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_every_version() {
        for version in FormatVersion::ALL {
            for magic in [Magic::Cseis, Magic::Oseis] {
                let file = write_legacy(magic, version, 3);
                assert_eq!(detect_version(file.path()).unwrap(), (magic, version));

                let mut reader = open_for_read(file.path(), ReaderOptions::new()).unwrap();
                let config = reader.read_header().unwrap().clone();
                assert_eq!(config.sample_count, 8);
                assert_eq!(config.trace_count, 3);
                let expected_crossline = if version == FormatVersion::V03 { 4 } else { 0 };
                assert_eq!(config.grid.origin_crossline, expected_crossline);
                if version == FormatVersion::V00 {
                    assert_eq!(config.grid.origin_x, 0.0);
                } else {
                    assert_eq!(config.grid.origin_x, 5.0);
                }

                let mut samples = [0.0f32; 8];
                let mut header = [0u8; 4];
                for t in 0..3 {
                    assert!(reader.read_trace(&mut samples, &mut header).unwrap());
                    assert_eq!(i32::from_ne_bytes(header), t);
                    assert_eq!(samples[7], (t * 10 + 7) as f32);
                }
                assert!(!reader.read_trace(&mut samples, &mut header).unwrap());
            }
        }
    }

    #[test]
    fn test_rejects_unknown_files() {
        let mut bad_magic = NamedTempFile::new().unwrap();
        bad_magic.write_all(b"XSEIS0.3\0\0\0\0").unwrap();
        assert!(matches!(
            open_for_read(bad_magic.path(), ReaderOptions::new()),
            Err(Error::InvalidMagic(_))
        ));

        let mut bad_version = NamedTempFile::new().unwrap();
        bad_version.write_all(b"CSEIS0.9\0\0\0\0").unwrap();
        assert!(matches!(
            detect_version(bad_version.path()),
            Err(Error::UnsupportedVersion(_))
        ));

        let empty = NamedTempFile::new().unwrap();
        assert!(matches!(detect_version(empty.path()), Err(Error::InvalidMagic(_))));

        assert!(matches!(
            detect_version("/nonexistent/dir/file.cseis"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_new_files_are_latest() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = open_for_write(file.path(), WriterOptions::new()).unwrap();
        writer.write_header(&legacy_config()).unwrap();
        writer.close().unwrap();
        assert_eq!(
            detect_version(file.path()).unwrap(),
            (Magic::Cseis, FormatVersion::LATEST)
        );
    }
}
