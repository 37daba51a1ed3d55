//! Stable external sort
//!
//! Items are buffered in memory. Once `spill_threshold` items are buffered the
//! buffer is sorted and written out as a run. `finish` merges all runs with a
//! min-heap; equal items come out in run order, and runs are numbered in push
//! order, so the sort is stable end to end.

use crate::sequencer::error::SequencerResult;
use crate::sequencer::run::{RunFile, RunReader, RunWriter, DEFAULT_FRAME_ITEMS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::PathBuf;
use tempfile::TempDir;

/// Spill-to-disk sorter
pub struct ExternalSorter<T> {
    buffer: Vec<T>,
    spill_threshold: usize,
    frame_items: usize,
    spill_root: Option<PathBuf>,
    spill_dir: Option<TempDir>,
    runs: Vec<RunFile>,
    pushed: u64,
}

impl<T> ExternalSorter<T>
where
    T: Ord + Serialize + DeserializeOwned,
{
    /// Create a sorter that spills every `spill_threshold` items
    ///
    /// Runs are written into a private directory created under `spill_root`,
    /// or under the system temp dir when `None`.
    pub fn new(spill_threshold: usize, spill_root: Option<PathBuf>) -> Self {
        let spill_threshold = spill_threshold.max(1);
        Self {
            buffer: Vec::new(),
            spill_threshold,
            frame_items: DEFAULT_FRAME_ITEMS.min(spill_threshold),
            spill_root,
            spill_dir: None,
            runs: Vec::new(),
            pushed: 0,
        }
    }

    pub fn push(&mut self, item: T) -> SequencerResult<()> {
        self.buffer.push(item);
        self.pushed += 1;

        if self.buffer.len() >= self.spill_threshold {
            self.spill()?;
        }
        Ok(())
    }

    /// Number of items pushed so far
    pub fn len(&self) -> u64 {
        self.pushed
    }

    pub fn is_empty(&self) -> bool {
        self.pushed == 0
    }

    /// Number of runs written to disk so far
    pub fn spilled_runs(&self) -> usize {
        self.runs.len()
    }

    fn spill_dir(&mut self) -> SequencerResult<PathBuf> {
        if let Some(dir) = &self.spill_dir {
            return Ok(dir.path().to_path_buf());
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("lsmtrace-spill-");
        let dir = match &self.spill_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        tracing::debug!("Spilling sort runs to {:?}", dir.path());
        let path = dir.path().to_path_buf();
        self.spill_dir = Some(dir);
        Ok(path)
    }

    fn spill(&mut self) -> SequencerResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let dir = self.spill_dir()?;
        let path = dir.join(format!("run-{:06}.dat", self.runs.len()));

        // stable
        self.buffer.sort();

        let mut writer = RunWriter::create(&path, self.frame_items)?;
        for item in self.buffer.drain(..) {
            writer.push(item)?;
        }
        let run = writer.finish()?;

        tracing::debug!(
            "Wrote sort run {:?} ({} items, {} frames)",
            run.path,
            run.items,
            run.frames
        );
        self.runs.push(run);
        Ok(())
    }

    /// Sort everything pushed and return the items in order
    ///
    /// Spill files live until the returned iterator is dropped.
    pub fn finish(mut self) -> SequencerResult<SortedIter<T>> {
        if self.runs.is_empty() {
            self.buffer.sort();
            return Ok(SortedIter::Memory(std::mem::take(&mut self.buffer).into_iter()));
        }

        self.spill()?;

        let mut readers = Vec::with_capacity(self.runs.len());
        for run in &self.runs {
            readers.push(RunReader::open(&run.path)?);
        }

        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (run, reader) in readers.iter_mut().enumerate() {
            if let Some(item) = reader.next() {
                heap.push(Reverse(HeapEntry { item: item?, run }));
            }
        }

        tracing::debug!("Merging {} sort runs", readers.len());

        Ok(SortedIter::Merge(MergeIter {
            readers,
            heap,
            failed: false,
            _dir: self.spill_dir.take(),
        }))
    }
}

/// Heap slot: the head item of one run
struct HeapEntry<T> {
    item: T,
    run: usize,
}

impl<T: Ord> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for HeapEntry<T> {}

impl<T: Ord> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.item
            .cmp(&other.item)
            .then_with(|| self.run.cmp(&other.run))
    }
}

/// K-way merge over spilled runs
pub struct MergeIter<T> {
    readers: Vec<RunReader<T>>,
    heap: BinaryHeap<Reverse<HeapEntry<T>>>,
    failed: bool,
    _dir: Option<TempDir>,
}

impl<T: Ord + DeserializeOwned> Iterator for MergeIter<T> {
    type Item = SequencerResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let Reverse(HeapEntry { item, run }) = self.heap.pop()?;

        match self.readers[run].next() {
            Some(Ok(next)) => self.heap.push(Reverse(HeapEntry { item: next, run })),
            Some(Err(e)) => {
                self.failed = true;
                return Some(Err(e));
            }
            None => {}
        }

        Some(Ok(item))
    }
}

/// Items in sorted order, from memory or from a merge of runs
pub enum SortedIter<T> {
    Memory(std::vec::IntoIter<T>),
    Merge(MergeIter<T>),
}

impl<T: Ord + DeserializeOwned> Iterator for SortedIter<T> {
    type Item = SequencerResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SortedIter::Memory(items) => items.next().map(Ok),
            SortedIter::Merge(merge) => merge.next(),
        }
    }
}
