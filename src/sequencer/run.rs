//! Spill run file format
//!
//! A run is one sorted slice of the input, written when the in-memory buffer
//! fills up. Items are grouped into frames so a run can be read back one
//! frame at a time during the merge.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ magic: [u8; 4] = "LTRN"                 │
//! ├─────────────────────────────────────────┤
//! │ FRAMES (variable)                       │
//! │   For each frame:                       │
//! │     length: u32                         │
//! │     data: [u8; length]                  │
//! │       lz4(bincode(Vec<T>))              │
//! │     crc: u32 (CRC32 of length + data)   │
//! └─────────────────────────────────────────┘
//! ```

use crate::sequencer::error::{SequencerError, SequencerResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Magic bytes for run file identification
const RUN_MAGIC: [u8; 4] = *b"LTRN";

/// Items per frame unless configured otherwise
pub const DEFAULT_FRAME_ITEMS: usize = 4096;

/// Upper bound on a single compressed frame (64MB)
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// A finished run on disk
#[derive(Debug, Clone)]
pub struct RunFile {
    pub path: PathBuf,
    pub items: u64,
    pub frames: u32,
}

/// Sequential writer for one sorted run
pub struct RunWriter<T> {
    writer: BufWriter<File>,
    path: PathBuf,
    pending: Vec<T>,
    frame_items: usize,
    items: u64,
    frames: u32,
}

impl<T: Serialize> RunWriter<T> {
    pub fn create(path: impl AsRef<Path>, frame_items: usize) -> SequencerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(&RUN_MAGIC)?;

        Ok(Self {
            writer,
            path,
            pending: Vec::with_capacity(frame_items.max(1)),
            frame_items: frame_items.max(1),
            items: 0,
            frames: 0,
        })
    }

    /// Append the next item; items must already be in sorted order
    pub fn push(&mut self, item: T) -> SequencerResult<()> {
        self.pending.push(item);
        self.items += 1;

        if self.pending.len() >= self.frame_items {
            self.write_frame()?;
        }
        Ok(())
    }

    fn write_frame(&mut self) -> SequencerResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let serialized = bincode::serialize(&self.pending)?;
        let data = lz4_flex::compress_prepend_size(&serialized);
        let len = (data.len() as u32).to_le_bytes();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len);
        hasher.update(&data);
        let crc = hasher.finalize();

        self.writer.write_all(&len)?;
        self.writer.write_all(&data)?;
        self.writer.write_all(&crc.to_le_bytes())?;

        self.pending.clear();
        self.frames += 1;
        Ok(())
    }

    /// Flush the last frame and close the file
    pub fn finish(mut self) -> SequencerResult<RunFile> {
        self.write_frame()?;
        self.writer.flush()?;

        Ok(RunFile {
            path: self.path,
            items: self.items,
            frames: self.frames,
        })
    }
}

/// Streaming reader over one run, yielding items in stored order
pub struct RunReader<T> {
    reader: BufReader<File>,
    path: PathBuf,
    buffered: std::vec::IntoIter<T>,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> RunReader<T> {
    pub fn open(path: impl AsRef<Path>) -> SequencerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut magic = [0u8; 4];
        if reader.read_exact(&mut magic).is_err() || magic != RUN_MAGIC {
            return Err(SequencerError::CorruptRun {
                path,
                reason: format!("invalid magic: {:?}", magic),
            });
        }

        Ok(Self {
            reader,
            path,
            buffered: Vec::new().into_iter(),
            _marker: PhantomData,
        })
    }

    fn corrupt(&self, reason: impl Into<String>) -> SequencerError {
        SequencerError::CorruptRun {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Read the next frame, `None` at a clean end of file
    fn read_frame(&mut self) -> SequencerResult<Option<Vec<T>>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_BYTES {
            return Err(self.corrupt(format!("frame length too large: {}", len)));
        }

        let mut data = vec![0u8; len];
        let mut crc_buf = [0u8; 4];
        if self.reader.read_exact(&mut data).is_err()
            || self.reader.read_exact(&mut crc_buf).is_err()
        {
            return Err(self.corrupt("truncated frame"));
        }

        let stored_crc = u32::from_le_bytes(crc_buf);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_buf);
        hasher.update(&data);
        let computed_crc = hasher.finalize();

        if stored_crc != computed_crc {
            return Err(self.corrupt(format!(
                "CRC mismatch: stored={}, computed={}",
                stored_crc, computed_crc
            )));
        }

        let decompressed = lz4_flex::decompress_size_prepended(&data)
            .map_err(|e| SequencerError::Compression(format!("LZ4 decompression failed: {}", e)))?;
        let items: Vec<T> = bincode::deserialize(&decompressed)?;
        Ok(Some(items))
    }
}

impl<T: DeserializeOwned> Iterator for RunReader<T> {
    type Item = SequencerResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffered.next() {
                return Some(Ok(item));
            }

            match self.read_frame() {
                Ok(Some(items)) => self.buffered = items.into_iter(),
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_multiple_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-0000.dat");

        let mut writer = RunWriter::create(&path, 3).unwrap();
        for i in 0..10u64 {
            writer.push((i, format!("item-{}", i))).unwrap();
        }
        let run = writer.finish().unwrap();
        assert_eq!(run.items, 10);
        assert_eq!(run.frames, 4);

        let items: Vec<(u64, String)> = RunReader::open(&path)
            .unwrap()
            .collect::<SequencerResult<_>>()
            .unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items[9], (9, "item-9".to_string()));
    }

    #[test]
    fn test_empty_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        let run = RunWriter::<u64>::create(&path, 8).unwrap().finish().unwrap();
        assert_eq!(run.frames, 0);

        let mut reader = RunReader::<u64>::open(&path).unwrap();
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.dat");
        std::fs::write(&path, b"NOPE").unwrap();

        assert!(matches!(
            RunReader::<u64>::open(&path),
            Err(SequencerError::CorruptRun { .. })
        ));
    }

    #[test]
    fn test_flipped_byte_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.dat");
        let mut writer = RunWriter::create(&path, 100).unwrap();
        for i in 0..50u64 {
            writer.push(i).unwrap();
        }
        writer.finish().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let result: SequencerResult<Vec<u64>> = RunReader::open(&path).unwrap().collect();
        assert!(matches!(result, Err(SequencerError::CorruptRun { .. })));
    }
}
