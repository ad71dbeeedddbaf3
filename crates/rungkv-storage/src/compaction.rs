//! Compaction - Merging tables down the levels
//!
//! Compaction merges SSTables to bound read amplification, reclaim space
//! from deleted entries (tombstones), and rewrite files that a format
//! migration marked for compaction. Outputs always use the table format the
//! database's current format major version allows, so rewriting a marked
//! file also upgrades its encoding.
//!
//! Picking order: level-0 file count, then level size, then marked files.

use crate::manifest::Manifest;
use crate::sstable::{
    delete_sstable, table_path, SSTableEntry, SSTableMeta, SSTableReader, SSTableWriter, SST_DIR,
};
use crate::version::{FileMetadata, Version, VersionEdit, NUM_LEVELS};
use rungkv_core::{Result, TableFormat};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Compaction configuration
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Maximum number of SSTables at level 0 before triggering compaction
    pub level0_trigger: usize,
    /// Size multiplier between levels (e.g., 10 means level N+1 is 10x larger)
    pub level_multiplier: usize,
    /// Maximum size for level 1 in bytes
    pub level1_max_size: u64,
    /// Maximum number of levels, at most [`NUM_LEVELS`]
    pub max_levels: usize,
    /// Target file size for output SSTables
    pub target_file_size: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            level0_trigger: 4,
            level_multiplier: 10,
            level1_max_size: 10 * 1024 * 1024, // 10MB
            max_levels: NUM_LEVELS,
            target_file_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Statistics for compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Total bytes read during compaction
    pub bytes_read: u64,
    /// Total bytes written during compaction
    pub bytes_written: u64,
    /// Number of compactions performed
    pub compaction_count: u64,
    /// Number of compactions that rewrote marked files
    pub marked_compaction_count: u64,
    /// Number of entries removed (tombstones + overwritten)
    pub entries_removed: u64,
}

/// Why a compaction was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionReason {
    /// Too many files in level 0
    Level0,
    /// A level exceeded its size budget
    LevelSize,
    /// A file was marked for compaction by a format migration
    Marked,
    /// Requested through a manual range compaction
    Manual,
}

impl fmt::Display for CompactionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompactionReason::Level0 => "level0",
            CompactionReason::LevelSize => "level-size",
            CompactionReason::Marked => "marked",
            CompactionReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// A picked compaction
#[derive(Debug, Clone)]
pub struct Compaction {
    /// Why it was picked
    pub reason: CompactionReason,
    /// Level the outputs are written to
    pub output_level: usize,
    /// Input files with their levels
    pub inputs: Vec<(usize, FileMetadata)>,
}

impl Compaction {
    fn new(
        reason: CompactionReason,
        output_level: usize,
        inputs: impl IntoIterator<Item = (usize, FileMetadata)>,
    ) -> Self {
        Self {
            reason,
            output_level,
            inputs: inputs.into_iter().collect(),
        }
    }

    /// Smallest and largest key across the inputs
    pub fn key_range(&self) -> Option<(&[u8], &[u8])> {
        let smallest = self.inputs.iter().map(|(_, f)| f.smallest.as_slice()).min()?;
        let largest = self.inputs.iter().map(|(_, f)| f.largest.as_slice()).max()?;
        Some((smallest, largest))
    }
}

/// Builds the manifest record for a freshly written table
pub fn file_metadata(file_num: u64, meta: &SSTableMeta) -> FileMetadata {
    FileMetadata {
        file_num,
        smallest: meta.min_key.clone(),
        largest: meta.max_key.clone(),
        size: meta.file_size,
        entry_count: meta.entry_count,
        table_format: meta.table_format,
        marked_for_compaction: false,
    }
}

/// Heap entry for the k-way merge
#[derive(Debug)]
struct MergeEntry {
    entry: SSTableEntry,
    source_idx: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.entry.key == other.entry.key && self.source_idx == other.source_idx
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed key order turns the max-heap into a min-heap.
        // Equal keys: the newer source (higher index) pops first.
        match other.entry.key.cmp(&self.entry.key) {
            Ordering::Equal => self.source_idx.cmp(&other.source_idx),
            ord => ord,
        }
    }
}

/// Indices of the files in `files` that must be compacted together with
/// `files[idx]`: neighbours chained to it through shared boundary keys.
fn atomic_unit(files: &[FileMetadata], idx: usize) -> std::ops::Range<usize> {
    let mut start = idx;
    while start > 0 && files[start - 1].largest == files[start].smallest {
        start -= 1;
    }
    let mut end = idx + 1;
    while end < files.len() && files[end - 1].largest == files[end].smallest {
        end += 1;
    }
    start..end
}

/// Compaction worker
pub struct CompactionWorker {
    /// Database directory
    dir: PathBuf,
    /// Configuration
    config: CompactionConfig,
    /// Statistics
    stats: CompactionStats,
}

impl CompactionWorker {
    /// Worker for the database in `dir`
    pub fn new(dir: impl AsRef<Path>, mut config: CompactionConfig) -> Self {
        config.max_levels = config.max_levels.clamp(2, NUM_LEVELS);
        Self {
            dir: dir.as_ref().to_path_buf(),
            config,
            stats: CompactionStats::default(),
        }
    }

    /// Get the configuration in use
    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Get compaction statistics
    pub fn stats(&self) -> &CompactionStats {
        &self.stats
    }

    /// Check if any automatic compaction is due
    pub fn needs_compaction(&self, version: &Version) -> bool {
        self.pick_compaction(version).is_some()
    }

    /// Size budget of `level`
    fn max_size_for_level(&self, level: usize) -> u64 {
        if level == 0 {
            return u64::MAX; // Level 0 is count-based, not size-based
        }

        let mut size = self.config.level1_max_size;
        for _ in 1..level {
            size = size.saturating_mul(self.config.level_multiplier as u64);
        }
        size
    }

    fn bottom_level(&self) -> usize {
        self.config.max_levels - 1
    }

    /// All of L0 plus the overlapping L1 files
    fn level0_compaction(&self, version: &Version, reason: CompactionReason) -> Option<Compaction> {
        let l0 = version.files(0);
        if l0.is_empty() {
            return None;
        }
        let mut inputs: Vec<_> = l0.iter().map(|f| (0, f.clone())).collect();
        let smallest = l0.iter().map(|f| f.smallest.as_slice()).min()?;
        let largest = l0.iter().map(|f| f.largest.as_slice()).max()?;
        inputs.extend(self.expand_overlap(version, 1, smallest, largest));
        Some(Compaction::new(reason, 1, inputs))
    }

    /// Files at `level` overlapping the range, widened to whole atomic units
    fn expand_overlap(
        &self,
        version: &Version,
        level: usize,
        smallest: &[u8],
        largest: &[u8],
    ) -> Vec<(usize, FileMetadata)> {
        let files = version.files(level);
        let first = files.iter().position(|f| f.overlaps(smallest, largest));
        let last = files.iter().rposition(|f| f.overlaps(smallest, largest));
        match (first, last) {
            (Some(first), Some(last)) => {
                let start = atomic_unit(files, first).start;
                let end = atomic_unit(files, last).end;
                files[start..end].iter().map(|f| (level, f.clone())).collect()
            }
            _ => Vec::new(),
        }
    }

    /// One atomic unit at `level` (level >= 1), plus overlapping files from
    /// the next level when `push_down` is set
    fn unit_compaction(
        &self,
        version: &Version,
        level: usize,
        idx: usize,
        push_down: bool,
        reason: CompactionReason,
    ) -> Compaction {
        let files = version.files(level);
        let unit: Vec<_> = files[atomic_unit(files, idx)]
            .iter()
            .map(|f| (level, f.clone()))
            .collect();
        if !push_down {
            return Compaction::new(reason, level, unit);
        }

        let mut compaction = Compaction::new(reason, level + 1, unit);
        let next = compaction.key_range().map(|(smallest, largest)| {
            self.expand_overlap(version, level + 1, smallest, largest)
        });
        compaction.inputs.extend(next.unwrap_or_default());
        compaction
    }

    /// Pick the next automatic compaction, if any
    pub fn pick_compaction(&self, version: &Version) -> Option<Compaction> {
        // Check level 0 first
        if version.files(0).len() >= self.config.level0_trigger {
            return self.level0_compaction(version, CompactionReason::Level0);
        }

        // Check other levels by size
        for level in 1..self.bottom_level() {
            if version.level_size(level) > self.max_size_for_level(level) {
                return Some(self.unit_compaction(
                    version,
                    level,
                    0,
                    true,
                    CompactionReason::LevelSize,
                ));
            }
        }

        // Then files marked by a format migration
        let (level, marked) = version.marked_files().next()?;
        if level == 0 {
            return self.level0_compaction(version, CompactionReason::Marked);
        }
        let idx = version
            .files(level)
            .iter()
            .position(|f| f.file_num == marked.file_num)?;
        Some(self.unit_compaction(version, level, idx, false, CompactionReason::Marked))
    }

    /// Pick a manual compaction of `level` into the next level for the range
    /// `[start, end]` (`None` is unbounded)
    pub fn pick_manual(
        &self,
        version: &Version,
        level: usize,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Option<Compaction> {
        if level >= self.bottom_level() {
            return None;
        }
        let in_range = |f: &FileMetadata| {
            start.map_or(true, |s| f.largest.as_slice() >= s)
                && end.map_or(true, |e| f.smallest.as_slice() <= e)
        };

        if level == 0 {
            // L0 files may overlap, so move all of them or none.
            if !version.files(0).iter().any(in_range) {
                return None;
            }
            return self.level0_compaction(version, CompactionReason::Manual);
        }

        let files = version.files(level);
        let first = files.iter().position(in_range)?;
        let last = files.iter().rposition(in_range)?;
        let start_idx = atomic_unit(files, first).start;
        let end_idx = atomic_unit(files, last).end;

        let mut compaction = Compaction::new(
            CompactionReason::Manual,
            level + 1,
            files[start_idx..end_idx].iter().map(|f| (level, f.clone())),
        );
        let next = compaction.key_range().map(|(smallest, largest)| {
            self.expand_overlap(version, level + 1, smallest, largest)
        });
        compaction.inputs.extend(next.unwrap_or_default());
        Some(compaction)
    }

    /// Deepest level holding data in `[start, end]`
    pub fn deepest_level_with_data(
        &self,
        version: &Version,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Option<usize> {
        (0..NUM_LEVELS).rev().find(|&level| {
            version.files(level).iter().any(|f| {
                start.map_or(true, |s| f.largest.as_slice() >= s)
                    && end.map_or(true, |e| f.smallest.as_slice() <= e)
            })
        })
    }

    /// Run a single automatic compaction, if one is due
    pub fn run_once(&mut self, manifest: &mut Manifest, table_format: TableFormat) -> Result<bool> {
        match self.pick_compaction(manifest.version()) {
            Some(compaction) => {
                self.run(&compaction, manifest, table_format)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Execute `compaction`: merge its inputs, log the edit, delete the inputs
    pub fn run(
        &mut self,
        compaction: &Compaction,
        manifest: &mut Manifest,
        table_format: TableFormat,
    ) -> Result<()> {
        let Some((smallest, largest)) = compaction.key_range() else {
            return Ok(());
        };

        // Tombstones can be dropped when nothing deeper could be shadowed.
        let drop_tombstones = ((compaction.output_level + 1)..NUM_LEVELS).all(|level| {
            manifest
                .version()
                .overlapping_files(level, smallest, largest)
                .is_empty()
        });

        // Oldest first: deeper levels, then lower file numbers.
        let mut inputs: Vec<&(usize, FileMetadata)> = compaction.inputs.iter().collect();
        inputs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.file_num.cmp(&b.1.file_num)));
        let paths: Vec<PathBuf> = inputs
            .iter()
            .map(|(_, f)| table_path(&self.dir, f.file_num))
            .collect();

        let outputs = self.merge_sstables(&paths, manifest, table_format, drop_tombstones)?;

        let mut edit = VersionEdit {
            deleted_files: compaction
                .inputs
                .iter()
                .map(|(level, f)| (*level, f.file_num))
                .collect(),
            ..Default::default()
        };
        for (file_num, meta) in &outputs {
            edit.new_files
                .push((compaction.output_level, file_metadata(*file_num, meta)));
        }
        manifest.log_and_apply(edit)?;

        for path in &paths {
            if let Err(e) = delete_sstable(path) {
                warn!(path = %path.display(), error = %e, "failed to delete compacted table");
            }
        }

        self.stats.compaction_count += 1;
        if compaction.reason == CompactionReason::Marked {
            self.stats.marked_compaction_count += 1;
        }
        info!(
            reason = %compaction.reason,
            inputs = compaction.inputs.len(),
            outputs = outputs.len(),
            output_level = compaction.output_level,
            %table_format,
            "compaction finished"
        );
        Ok(())
    }

    /// Merge tables, oldest first in `inputs`, into new tables numbered from
    /// the manifest
    fn merge_sstables(
        &mut self,
        inputs: &[PathBuf],
        manifest: &mut Manifest,
        table_format: TableFormat,
        drop_tombstones: bool,
    ) -> Result<Vec<(u64, SSTableMeta)>> {
        std::fs::create_dir_all(self.dir.join(SST_DIR))?;

        let mut readers = Vec::with_capacity(inputs.len());
        for path in inputs {
            let reader = SSTableReader::open(path)?;
            self.stats.bytes_read += reader.metadata().file_size;
            readers.push(reader);
        }

        // Initialize merge heap
        let mut heap: BinaryHeap<MergeEntry> = BinaryHeap::new();
        let mut iterators: Vec<_> = readers.iter_mut().map(|r| r.iter()).collect();

        // Seed the heap with each input's first entry
        for (idx, iter) in iterators.iter_mut().enumerate() {
            if let Some(entry) = iter.next_entry()? {
                heap.push(MergeEntry {
                    entry,
                    source_idx: idx,
                });
            }
        }

        let mut outputs: Vec<(u64, SSTableMeta)> = Vec::new();
        let mut current: Option<(u64, SSTableWriter)> = None;
        let mut last_key: Option<Vec<u8>> = None;

        while let Some(merge_entry) = heap.pop() {
            let source_idx = merge_entry.source_idx;
            let entry = merge_entry.entry;

            // Refill from the same input
            if let Some(next) = iterators[source_idx].next_entry()? {
                heap.push(MergeEntry {
                    entry: next,
                    source_idx,
                });
            }

            // Skip duplicate keys (the newest was popped first)
            if last_key.as_deref() == Some(entry.key.as_slice()) {
                self.stats.entries_removed += 1;
                continue;
            }
            last_key = Some(entry.key.clone());

            if drop_tombstones && entry.is_tombstone() {
                self.stats.entries_removed += 1;
                continue;
            }

            // Cut a new output table
            let full = current
                .as_ref()
                .map_or(false, |(_, w)| w.estimated_size() >= self.config.target_file_size);
            if full {
                if let Some((file_num, writer)) = current.take() {
                    let meta = writer.finish()?;
                    self.stats.bytes_written += meta.file_size;
                    outputs.push((file_num, meta));
                }
            }
            if current.is_none() {
                let file_num = manifest.new_file_num();
                let writer = SSTableWriter::new(table_path(&self.dir, file_num), table_format)?;
                current = Some((file_num, writer));
            }

            if let Some((_, writer)) = current.as_mut() {
                writer.add(entry)?;
            }
        }

        // Finish last writer
        if let Some((file_num, writer)) = current {
            let meta = writer.finish()?;
            self.stats.bytes_written += meta.file_size;
            outputs.push((file_num, meta));
        }

        debug!(inputs = inputs.len(), outputs = outputs.len(), "merged tables");
        Ok(outputs)
    }
}
