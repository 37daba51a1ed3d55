//! Log file readers
//!
//! Engine processes roll their logs over into compressed files. Every
//! encoding is read through the same line visitor so callers never care
//! which one they have:
//!
//! | extension | backing reader                         |
//! |-----------|----------------------------------------|
//! | `.gz`     | gzip, multi-member (`flate2`)          |
//! | `.lz4`    | LZ4 frame (`lz4_flex`)                 |
//! | `.zip`    | every archive entry, in index order    |
//! | other     | plain text                             |
//!
//! A file that fails part-way through decoding reports `SourceError::Corrupt`;
//! the caller decides what to do with the lines already seen.

use crate::source::error::{SourceError, SourceResult};
use flate2::read::MultiGzDecoder;
use lz4_flex::frame::FrameDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// On-disk encoding of a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Plain,
    Gzip,
    Lz4,
    Zip,
}

impl Encoding {
    /// Select a backing reader by file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Encoding::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("lz4") => Encoding::Lz4,
            Some(ext) if ext.eq_ignore_ascii_case("zip") => Encoding::Zip,
            _ => Encoding::Plain,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Encoding::Plain)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Plain => write!(f, "plain"),
            Encoding::Gzip => write!(f, "gzip"),
            Encoding::Lz4 => write!(f, "lz4"),
            Encoding::Zip => write!(f, "zip"),
        }
    }
}

/// One log file selected for a run
#[derive(Debug, Clone)]
pub struct LogFile {
    /// Position in file-name order; the file-scan order key
    pub ordinal: u32,
    pub path: PathBuf,
    pub encoding: Encoding,
}

impl LogFile {
    pub fn new(ordinal: u32, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let encoding = Encoding::from_path(&path);
        Self {
            ordinal,
            path,
            encoding,
        }
    }

    /// Visit every line in file order
    ///
    /// `visit` receives the 1-based line number and the line without its
    /// terminator. Zip entries are numbered continuously. Returns the number
    /// of lines read.
    pub fn for_each_line<F>(&self, mut visit: F) -> SourceResult<u64>
    where
        F: FnMut(u64, &str),
    {
        let file = File::open(&self.path).map_err(|e| SourceError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        let mut count = 0u64;

        match self.encoding {
            Encoding::Plain => {
                read_lines(BufReader::new(file), &mut count, &mut visit)
                    .map_err(|e| self.read_error(e))?;
            }
            Encoding::Gzip => {
                let decoder = MultiGzDecoder::new(BufReader::new(file));
                read_lines(BufReader::new(decoder), &mut count, &mut visit)
                    .map_err(|e| self.read_error(e))?;
            }
            Encoding::Lz4 => {
                let decoder = FrameDecoder::new(BufReader::new(file));
                read_lines(BufReader::new(decoder), &mut count, &mut visit)
                    .map_err(|e| self.read_error(e))?;
            }
            Encoding::Zip => {
                let mut archive = zip::ZipArchive::new(BufReader::new(file))
                    .map_err(|e| self.corrupt(format!("invalid zip archive: {}", e)))?;

                for i in 0..archive.len() {
                    let entry = archive
                        .by_index(i)
                        .map_err(|e| self.corrupt(format!("unreadable zip entry {}: {}", i, e)))?;
                    if entry.is_dir() {
                        continue;
                    }
                    read_lines(BufReader::new(entry), &mut count, &mut visit)
                        .map_err(|e| self.read_error(e))?;
                }
            }
        }

        Ok(count)
    }

    fn corrupt(&self, reason: String) -> SourceError {
        SourceError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }

    /// Decoder failures on compressed files are corruption, anything else is I/O
    fn read_error(&self, err: io::Error) -> SourceError {
        let decode_failure = matches!(
            err.kind(),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof
        );

        if self.encoding.is_compressed() && decode_failure {
            self.corrupt(format!("{} decode failed: {}", self.encoding, err))
        } else {
            SourceError::Io {
                path: self.path.clone(),
                source: err,
            }
        }
    }
}

fn read_lines<R, F>(mut reader: R, count: &mut u64, visit: &mut F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(u64, &str),
{
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }

        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }

        *count += 1;
        let text = String::from_utf8_lossy(&buf);
        visit(*count, &text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const CONTENT: &str = "first\r\nsecond\nthird";

    fn collect(file: &LogFile) -> SourceResult<Vec<(u64, String)>> {
        let mut lines = Vec::new();
        file.for_each_line(|n, text| lines.push((n, text.to_string())))?;
        Ok(lines)
    }

    fn expected() -> Vec<(u64, String)> {
        vec![
            (1, "first".to_string()),
            (2, "second".to_string()),
            (3, "third".to_string()),
        ]
    }

    #[test]
    fn test_encoding_from_extension() {
        assert_eq!(Encoding::from_path(Path::new("nc.log")), Encoding::Plain);
        assert_eq!(Encoding::from_path(Path::new("nc.log.gz")), Encoding::Gzip);
        assert_eq!(Encoding::from_path(Path::new("nc.log.LZ4")), Encoding::Lz4);
        assert_eq!(Encoding::from_path(Path::new("logs.zip")), Encoding::Zip);
        assert_eq!(Encoding::from_path(Path::new("nc")), Encoding::Plain);
    }

    #[test]
    fn test_plain_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nc.log");
        std::fs::write(&path, CONTENT).unwrap();

        assert_eq!(collect(&LogFile::new(0, path)).unwrap(), expected());
    }

    #[test]
    fn test_gzip_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nc.log.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::default());
        encoder.write_all(CONTENT.as_bytes()).unwrap();
        encoder.finish().unwrap();

        assert_eq!(collect(&LogFile::new(0, path)).unwrap(), expected());
    }

    #[test]
    fn test_lz4_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nc.log.lz4");
        let mut encoder = lz4_flex::frame::FrameEncoder::new(File::create(&path).unwrap());
        encoder.write_all(CONTENT.as_bytes()).unwrap();
        encoder.finish().unwrap();

        assert_eq!(collect(&LogFile::new(0, path)).unwrap(), expected());
    }

    #[test]
    fn test_zip_entries_numbered_continuously() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("a.log", options).unwrap();
        writer.write_all(b"first\nsecond\n").unwrap();
        writer.start_file("b.log", options).unwrap();
        writer.write_all(b"third\n").unwrap();
        writer.finish().unwrap();

        assert_eq!(collect(&LogFile::new(0, path)).unwrap(), expected());
    }

    #[test]
    fn test_corrupt_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.log.gz");
        std::fs::write(&path, b"this is not gzip at all").unwrap();

        let err = collect(&LogFile::new(0, path)).unwrap_err();
        assert!(matches!(err, SourceError::Corrupt { .. }), "got {:?}", err);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nc.log");
        std::fs::write(&path, b"ok\n\xff\xfebad\n").unwrap();

        let lines = collect(&LogFile::new(0, path)).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].1.ends_with("bad"));
    }
}
