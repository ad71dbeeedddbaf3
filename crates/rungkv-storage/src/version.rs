//! Version - The LSM file set at a point in time
//!
//! A [`Version`] describes which SSTables are live and at which level. It is
//! never mutated in place: a [`VersionEdit`] is applied to produce the next
//! version, and the manifest records the edits durably.
//!
//! Level 0 is ordered by file number and may overlap. Levels 1 and below are
//! ordered by smallest key and do not overlap, except that two adjacent files
//! may share a boundary key. Such a split key is what
//! [`FormatMajorVersion::SplitUserKeysMarked`](rungkv_core::FormatMajorVersion::SplitUserKeysMarked)
//! marks for compaction.

use rungkv_core::{Error, Result, TableFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Number of levels in the tree
pub const NUM_LEVELS: usize = 7;

/// Per-file metadata stored in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File number; the SSTable lives at `sst/<file_num>.sst`
    pub file_num: u64,
    /// Smallest key in the file
    pub smallest: Vec<u8>,
    /// Largest key in the file
    pub largest: Vec<u8>,
    /// File size in bytes
    pub size: u64,
    /// Number of entries
    pub entry_count: u64,
    /// Encoding the file was written with
    pub table_format: TableFormat,
    /// Set by migrations; cleared when the file is rewritten by compaction
    pub marked_for_compaction: bool,
}

impl FileMetadata {
    /// Returns true if the file's key range intersects `[smallest, largest]`
    pub fn overlaps(&self, smallest: &[u8], largest: &[u8]) -> bool {
        self.smallest.as_slice() <= largest && self.largest.as_slice() >= smallest
    }

    /// Returns true if `key` falls within the file's key range
    pub fn contains(&self, key: &[u8]) -> bool {
        self.smallest.as_slice() <= key && key <= self.largest.as_slice()
    }
}

/// A delta between two versions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEdit {
    /// Files added, with their level
    pub new_files: Vec<(usize, FileMetadata)>,
    /// Files removed, as `(level, file_num)`
    pub deleted_files: Vec<(usize, u64)>,
    /// Files to flag for compaction, as `(level, file_num)`
    pub marked_files: Vec<(usize, u64)>,
    /// Next unused file number
    pub next_file_num: Option<u64>,
    /// Last sequence number persisted in an SSTable
    pub last_sequence: Option<u64>,
}

impl VersionEdit {
    /// Returns true if the edit changes nothing
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty()
            && self.deleted_files.is_empty()
            && self.marked_files.is_empty()
            && self.next_file_num.is_none()
            && self.last_sequence.is_none()
    }
}

/// An immutable snapshot of the LSM file set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    levels: Vec<Vec<FileMetadata>>,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            levels: vec![Vec::new(); NUM_LEVELS],
        }
    }
}

impl Version {
    /// Creates an empty version
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a version from checkpointed levels, validating invariants
    pub fn from_levels(levels: Vec<Vec<FileMetadata>>) -> Result<Self> {
        if levels.len() != NUM_LEVELS {
            return Err(Error::Corruption(format!(
                "version has {} levels, expected {}",
                levels.len(),
                NUM_LEVELS
            )));
        }
        let mut version = Self { levels };
        version.sort_levels();
        version.check_invariants()?;
        Ok(version)
    }

    /// All levels, shallowest first
    pub fn levels(&self) -> &[Vec<FileMetadata>] {
        &self.levels
    }

    /// Files at `level`, in level order
    pub fn files(&self, level: usize) -> &[FileMetadata] {
        self.levels.get(level).map_or(&[], |files| files.as_slice())
    }

    /// Finds a file by number
    pub fn find(&self, file_num: u64) -> Option<(usize, &FileMetadata)> {
        self.levels.iter().enumerate().find_map(|(level, files)| {
            files
                .iter()
                .find(|f| f.file_num == file_num)
                .map(|f| (level, f))
        })
    }

    /// Numbers of every live file
    pub fn file_nums(&self) -> HashSet<u64> {
        self.levels
            .iter()
            .flatten()
            .map(|f| f.file_num)
            .collect()
    }

    /// Number of files at each level
    pub fn level_file_counts(&self) -> Vec<usize> {
        self.levels.iter().map(Vec::len).collect()
    }

    /// Total number of live files
    pub fn file_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Total bytes at `level`
    pub fn level_size(&self, level: usize) -> u64 {
        self.files(level).iter().map(|f| f.size).sum()
    }

    /// Total bytes across all levels
    pub fn total_size(&self) -> u64 {
        self.levels.iter().flatten().map(|f| f.size).sum()
    }

    /// Files flagged for compaction, with their level
    pub fn marked_files(&self) -> impl Iterator<Item = (usize, &FileMetadata)> {
        self.levels.iter().enumerate().flat_map(|(level, files)| {
            files
                .iter()
                .filter(|f| f.marked_for_compaction)
                .map(move |f| (level, f))
        })
    }

    /// Number of files flagged for compaction
    pub fn marked_count(&self) -> usize {
        self.marked_files().count()
    }

    /// Files at `level` whose range intersects `[smallest, largest]`
    pub fn overlapping_files(
        &self,
        level: usize,
        smallest: &[u8],
        largest: &[u8],
    ) -> Vec<&FileMetadata> {
        self.files(level)
            .iter()
            .filter(|f| f.overlaps(smallest, largest))
            .collect()
    }

    /// Files that may hold `key`, newest first
    pub fn files_for_key(&self, key: &[u8]) -> Vec<(usize, &FileMetadata)> {
        let mut result = Vec::new();
        for (level, files) in self.levels.iter().enumerate() {
            let mut candidates: Vec<_> = files.iter().filter(|f| f.contains(key)).collect();
            // Newer files carry higher numbers, within L0 and across a split key.
            candidates.sort_by(|a, b| b.file_num.cmp(&a.file_num));
            result.extend(candidates.into_iter().map(|f| (level, f)));
        }
        result
    }

    /// Applies `edit`, returning the next version.
    ///
    /// Deletions are applied first, then additions, then marks. Fails with
    /// [`Error::Corruption`] if the edit references a missing file, adds a
    /// duplicate, or leaves a level of L1 or below overlapping.
    pub fn apply(&self, edit: &VersionEdit) -> Result<Version> {
        let mut next = self.clone();

        for &(level, file_num) in &edit.deleted_files {
            let files = next.level_mut(level)?;
            let pos = files
                .iter()
                .position(|f| f.file_num == file_num)
                .ok_or_else(|| {
                    Error::Corruption(format!(
                        "edit deletes missing file {:06} at L{}",
                        file_num, level
                    ))
                })?;
            files.remove(pos);
        }

        for (level, file) in &edit.new_files {
            if next.find(file.file_num).is_some() {
                return Err(Error::Corruption(format!(
                    "edit adds duplicate file {:06}",
                    file.file_num
                )));
            }
            if file.smallest > file.largest {
                return Err(Error::Corruption(format!(
                    "file {:06} has inverted key range",
                    file.file_num
                )));
            }
            next.level_mut(*level)?.push(file.clone());
        }

        for &(level, file_num) in &edit.marked_files {
            let file = next
                .level_mut(level)?
                .iter_mut()
                .find(|f| f.file_num == file_num)
                .ok_or_else(|| {
                    Error::Corruption(format!(
                        "edit marks missing file {:06} at L{}",
                        file_num, level
                    ))
                })?;
            file.marked_for_compaction = true;
        }

        next.sort_levels();
        next.check_invariants()?;
        Ok(next)
    }

    fn level_mut(&mut self, level: usize) -> Result<&mut Vec<FileMetadata>> {
        self.levels
            .get_mut(level)
            .ok_or_else(|| Error::Corruption(format!("edit references invalid level {}", level)))
    }

    fn sort_levels(&mut self) {
        for (level, files) in self.levels.iter_mut().enumerate() {
            if level == 0 {
                files.sort_by_key(|f| f.file_num);
            } else {
                files.sort_by(|a, b| {
                    a.smallest
                        .cmp(&b.smallest)
                        .then_with(|| a.largest.cmp(&b.largest))
                });
            }
        }
    }

    fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (level, files) in self.levels.iter().enumerate() {
            for file in files {
                if !seen.insert(file.file_num) {
                    return Err(Error::Corruption(format!(
                        "file {:06} appears more than once",
                        file.file_num
                    )));
                }
            }
            if level == 0 {
                continue;
            }
            for pair in files.windows(2) {
                // Equal boundaries are a split key, not an overlap.
                if pair[0].largest > pair[1].smallest {
                    return Err(Error::Corruption(format!(
                        "L{} files {:06} and {:06} overlap",
                        level, pair[0].file_num, pair[1].file_num
                    )));
                }
            }
        }
        Ok(())
    }

    /// Human-readable dump of the file set
    pub fn debug_string(&self) -> String {
        let mut out = String::new();
        for (level, files) in self.levels.iter().enumerate() {
            if files.is_empty() {
                continue;
            }
            let _ = writeln!(out, "L{}:", level);
            for f in files {
                let _ = writeln!(
                    out,
                    "  {:06}:[{}-{}] size={} entries={} format={}{}",
                    f.file_num,
                    f.smallest.escape_ascii(),
                    f.largest.escape_ascii(),
                    f.size,
                    f.entry_count,
                    f.table_format,
                    if f.marked_for_compaction { " marked" } else { "" }
                );
            }
        }
        if out.is_empty() {
            out.push_str("(empty)\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(num: u64, smallest: &str, largest: &str) -> FileMetadata {
        FileMetadata {
            file_num: num,
            smallest: smallest.as_bytes().to_vec(),
            largest: largest.as_bytes().to_vec(),
            size: 100,
            entry_count: 2,
            table_format: TableFormat::V1,
            marked_for_compaction: false,
        }
    }

    fn add(files: Vec<(usize, FileMetadata)>) -> VersionEdit {
        VersionEdit {
            new_files: files,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_orders_levels() {
        let v = Version::new()
            .apply(&add(vec![
                (0, file(7, "a", "z")),
                (0, file(3, "b", "c")),
                (1, file(5, "m", "p")),
                (1, file(4, "a", "f")),
            ]))
            .unwrap();

        let l0: Vec<_> = v.files(0).iter().map(|f| f.file_num).collect();
        let l1: Vec<_> = v.files(1).iter().map(|f| f.file_num).collect();
        assert_eq!(l0, vec![3, 7]);
        assert_eq!(l1, vec![4, 5]);
        assert_eq!(v.file_count(), 4);
        assert_eq!(v.total_size(), 400);
        assert_eq!(v.level_file_counts(), vec![2, 2, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_apply_rejects_overlap_below_l0() {
        let v = Version::new()
            .apply(&add(vec![(1, file(1, "a", "f"))]))
            .unwrap();
        let err = v.apply(&add(vec![(1, file(2, "e", "k"))])).unwrap_err();
        assert!(err.is_corruption());

        // L0 may overlap.
        assert!(v.apply(&add(vec![(0, file(2, "e", "k"))])).is_ok());
    }

    #[test]
    fn test_shared_boundary_is_allowed() {
        let v = Version::new()
            .apply(&add(vec![(2, file(1, "a", "f")), (2, file(2, "f", "k"))]))
            .unwrap();
        assert_eq!(v.files(2).len(), 2);
        assert_eq!(v.files_for_key(b"f").len(), 2);
        assert_eq!(v.files_for_key(b"f")[0].1.file_num, 2);
    }

    #[test]
    fn test_apply_rejects_missing_files() {
        let v = Version::new()
            .apply(&add(vec![(0, file(1, "a", "b"))]))
            .unwrap();

        let delete = VersionEdit {
            deleted_files: vec![(0, 9)],
            ..Default::default()
        };
        assert!(v.apply(&delete).unwrap_err().is_corruption());

        let mark = VersionEdit {
            marked_files: vec![(1, 1)],
            ..Default::default()
        };
        assert!(v.apply(&mark).unwrap_err().is_corruption());

        assert!(v
            .apply(&add(vec![(3, file(1, "x", "y"))]))
            .unwrap_err()
            .is_corruption());
        assert!(v
            .apply(&add(vec![(NUM_LEVELS, file(2, "x", "y"))]))
            .unwrap_err()
            .is_corruption());
    }

    #[test]
    fn test_mark_and_replace() {
        let v = Version::new()
            .apply(&add(vec![(1, file(1, "a", "f"))]))
            .unwrap();
        let v = v
            .apply(&VersionEdit {
                marked_files: vec![(1, 1)],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(v.marked_count(), 1);

        let v = v
            .apply(&VersionEdit {
                deleted_files: vec![(1, 1)],
                new_files: vec![(1, file(2, "a", "f"))],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(v.marked_count(), 0);
        assert!(v.find(1).is_none());
        assert_eq!(v.find(2).map(|(level, _)| level), Some(1));
    }

    #[test]
    fn test_debug_string() {
        assert_eq!(Version::new().debug_string(), "(empty)\n");

        let mut marked = file(12, "k1", "k9");
        marked.marked_for_compaction = true;
        marked.table_format = TableFormat::V2;
        let v = Version::new()
            .apply(&add(vec![(0, file(5, "a", "c")), (3, marked)]))
            .unwrap();

        assert_eq!(
            v.debug_string(),
            "L0:\n  000005:[a-c] size=100 entries=2 format=V1\n\
             L3:\n  000012:[k1-k9] size=100 entries=2 format=V2 marked\n"
        );
    }

    #[test]
    fn test_from_levels_validates() {
        assert!(Version::from_levels(vec![Vec::new(); 3]).is_err());

        let mut levels = vec![Vec::new(); NUM_LEVELS];
        levels[1] = vec![file(1, "a", "m"), file(2, "c", "z")];
        assert!(Version::from_levels(levels).is_err());
    }
}
