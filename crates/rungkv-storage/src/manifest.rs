//! Manifest - Durable log of version edits
//!
//! The manifest records the LSM file set. Each manifest file starts with a
//! checkpoint of the whole [`Version`] and is followed by the
//! [`VersionEdit`]s applied since. Replaying the file rebuilds the version.
//!
//! ## File naming
//!
//! Databases created before
//! [`FormatMajorVersion::VersionedManifestMarker`](rungkv_core::FormatMajorVersion::VersionedManifestMarker)
//! keep a single `MANIFEST` file that is rewritten in place (through
//! `MANIFEST.tmp`). Afterwards every checkpoint goes to a fresh
//! `MANIFEST-NNNNNN` file and the `CURRENT` marker is moved to name it.
//!
//! ## Record framing
//!
//! ```text
//! +-------------+---------------+---------------+------------------+
//! | magic (u32) | len (u32 LE)  | crc32 (u32 LE)| bincode record   | ...
//! +-------------+---------------+---------------+------------------+
//! ```
//!
//! A record that is cut short or fails its checksum ends replay; it can only
//! be the tail of an append interrupted by a crash, so it is truncated away.

use crate::marker::{sync_dir, Marker, MANIFEST_MARKER};
use crate::version::{FileMetadata, Version, VersionEdit};
use rungkv_core::format_version::magic;
use rungkv_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Legacy manifest file name
const LEGACY_MANIFEST: &str = "MANIFEST";
/// Temporary name used while rewriting the legacy manifest
const LEGACY_MANIFEST_TMP: &str = "MANIFEST.tmp";
/// Prefix of numbered manifest files
const VERSIONED_PREFIX: &str = "MANIFEST-";

/// Record header: length + CRC
const RECORD_HEADER_SIZE: usize = 8;

/// Edits logged before the manifest is checkpointed into a fresh file
const DEFAULT_CHECKPOINT_THRESHOLD: usize = 100;

/// File name of the numbered manifest `file_num`
pub fn versioned_manifest_name(file_num: u64) -> String {
    format!("{}{:06}", VERSIONED_PREFIX, file_num)
}

fn parse_versioned_manifest_name(name: &str) -> Option<u64> {
    name.strip_prefix(VERSIONED_PREFIX)?.parse().ok()
}

/// Full state written at the start of every manifest file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestSnapshot {
    revision: u32,
    next_file_num: u64,
    last_sequence: u64,
    levels: Vec<Vec<FileMetadata>>,
}

/// Record type for manifest entries
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ManifestRecord {
    /// Checkpoint of the whole version
    Snapshot(ManifestSnapshot),
    /// Incremental change
    Edit(VersionEdit),
}

/// Result of replaying a manifest file
struct Replayed {
    version: Version,
    revision: u32,
    next_file_num: u64,
    last_sequence: u64,
    edits: usize,
    valid_len: u64,
}

/// Manifest manager - owns the current version and its durable log
pub struct Manifest {
    /// Database directory
    dir: PathBuf,
    /// `CURRENT` marker; unset while the manifest uses legacy naming
    marker: Marker,
    /// Number of the live `MANIFEST-NNNNNN`, `None` for the legacy file
    current_file_num: Option<u64>,
    /// Append handle on the live manifest file
    writer: BufWriter<File>,
    version: Version,
    revision: u32,
    next_file_num: u64,
    last_sequence: u64,
    edits_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl Manifest {
    /// Create a new, empty manifest in `dir`.
    ///
    /// `versioned` selects numbered files behind the `CURRENT` marker;
    /// otherwise the legacy single-file layout is used. Any manifest files
    /// left by an interrupted creation are discarded.
    pub fn create(dir: impl AsRef<Path>, versioned: bool, revision: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        remove_manifest_files(&dir)?;

        let (marker, _) = Marker::locate(&dir, MANIFEST_MARKER)?;
        let legacy_path = dir.join(LEGACY_MANIFEST);
        // Placeholder handle; replaced by the first checkpoint below.
        let writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&legacy_path)?,
        );

        let mut manifest = Self {
            dir,
            marker,
            current_file_num: None,
            writer,
            version: Version::new(),
            revision,
            next_file_num: 1,
            last_sequence: 0,
            edits_since_checkpoint: 0,
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
        };

        if versioned {
            let file_num = manifest.new_file_num();
            manifest.install_versioned(file_num)?;
            remove_if_exists(&legacy_path)?;
            sync_dir(&manifest.dir)?;
        } else {
            manifest.rotate()?;
        }

        info!(
            dir = %manifest.dir.display(),
            versioned,
            revision,
            "created manifest"
        );
        Ok(manifest)
    }

    /// Whether `dir` holds a manifest in either layout
    pub fn exists(dir: impl AsRef<Path>) -> bool {
        let dir = dir.as_ref();
        dir.join(MANIFEST_MARKER).exists() || dir.join(LEGACY_MANIFEST).exists()
    }

    /// Open the existing manifest in `dir`.
    ///
    /// The `CURRENT` marker wins when present; a legacy `MANIFEST` left
    /// beside it by an interrupted conversion is removed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        remove_if_exists(&dir.join(LEGACY_MANIFEST_TMP))?;

        let (marker, current) = Marker::locate(&dir, MANIFEST_MARKER)?;
        let legacy_path = dir.join(LEGACY_MANIFEST);

        let (path, current_file_num) = match current {
            Some(name) => {
                let file_num = parse_versioned_manifest_name(&name).ok_or_else(|| {
                    Error::Corruption(format!("manifest marker names invalid file {:?}", name))
                })?;
                (dir.join(&name), Some(file_num))
            }
            None if legacy_path.exists() => (legacy_path.clone(), None),
            None => {
                return Err(Error::Corruption(format!(
                    "no manifest found in {}",
                    dir.display()
                )))
            }
        };

        let replayed = replay(&path)?;
        let file_len = fs::metadata(&path)?.len();
        if file_len > replayed.valid_len {
            warn!(
                manifest = %path.display(),
                valid = replayed.valid_len,
                len = file_len,
                "truncating torn manifest tail"
            );
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(replayed.valid_len)?;
            file.sync_all()?;
        }

        if let Some(file_num) = current_file_num {
            if legacy_path.exists() {
                debug!("removing legacy manifest superseded by {}", MANIFEST_MARKER);
                fs::remove_file(&legacy_path)?;
            }
            remove_obsolete_manifests(&dir, file_num)?;
        }

        debug!(
            manifest = %path.display(),
            edits = replayed.edits,
            files = replayed.version.file_count(),
            revision = replayed.revision,
            "replayed manifest"
        );

        Ok(Self {
            writer: open_append(&path)?,
            dir,
            marker,
            current_file_num,
            version: replayed.version,
            revision: replayed.revision,
            next_file_num: replayed.next_file_num,
            last_sequence: replayed.last_sequence,
            edits_since_checkpoint: replayed.edits,
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
        })
    }

    /// The current version
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Manifest revision of the live checkpoint
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Whether the manifest uses numbered files behind the `CURRENT` marker
    pub fn is_versioned(&self) -> bool {
        self.current_file_num.is_some()
    }

    /// File name of the live manifest
    pub fn file_name(&self) -> String {
        match self.current_file_num {
            Some(file_num) => versioned_manifest_name(file_num),
            None => LEGACY_MANIFEST.to_string(),
        }
    }

    /// Last sequence number recorded by an edit
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Next file number that will be handed out
    pub fn next_file_num(&self) -> u64 {
        self.next_file_num
    }

    /// Allocate a file number. It becomes durable with the next logged edit.
    pub fn new_file_num(&mut self) -> u64 {
        let file_num = self.next_file_num;
        self.next_file_num += 1;
        file_num
    }

    /// Set how many edits are logged before the manifest is checkpointed
    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }

    /// Validate `edit` against the current version, log it durably, then
    /// install the resulting version.
    ///
    /// An edit that does not apply cleanly is rejected before anything is
    /// written.
    pub fn log_and_apply(&mut self, mut edit: VersionEdit) -> Result<()> {
        let next_file_num = edit
            .next_file_num
            .unwrap_or(self.next_file_num)
            .max(self.next_file_num);
        edit.next_file_num = Some(next_file_num);
        let last_sequence = edit.last_sequence;

        let next = self.version.apply(&edit)?;
        self.write_record(&ManifestRecord::Edit(edit))?;

        self.version = next;
        self.next_file_num = next_file_num;
        if let Some(sequence) = last_sequence {
            self.last_sequence = self.last_sequence.max(sequence);
        }
        self.edits_since_checkpoint += 1;

        if self.edits_since_checkpoint >= self.checkpoint_threshold {
            self.rotate()?;
        }
        Ok(())
    }

    fn write_record(&mut self, record: &ManifestRecord) -> Result<()> {
        let encoded = encode_record(record)?;
        self.writer.write_all(&encoded)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn snapshot(&self) -> ManifestSnapshot {
        ManifestSnapshot {
            revision: self.revision,
            next_file_num: self.next_file_num,
            last_sequence: self.last_sequence,
            levels: self.version.levels().to_vec(),
        }
    }

    /// Rewrite the manifest as a fresh checkpoint.
    ///
    /// Legacy manifests are replaced in place; versioned manifests move to a
    /// newly numbered file and the `CURRENT` marker follows.
    pub fn rotate(&mut self) -> Result<()> {
        if self.is_versioned() {
            let file_num = self.new_file_num();
            self.install_versioned(file_num)?;
        } else {
            let tmp = self.dir.join(LEGACY_MANIFEST_TMP);
            let path = self.dir.join(LEGACY_MANIFEST);
            write_checkpoint(&tmp, &self.snapshot())?;
            fs::rename(&tmp, &path)?;
            sync_dir(&self.dir)?;
            self.writer = open_append(&path)?;
            debug!("rewrote legacy manifest");
        }
        self.edits_since_checkpoint = 0;
        Ok(())
    }

    /// Change the revision stamped on checkpoints and write one immediately.
    pub fn set_revision(&mut self, revision: u32) -> Result<()> {
        let previous = self.revision;
        self.revision = revision;
        if let Err(e) = self.rotate() {
            self.revision = previous;
            return Err(e);
        }
        info!(revision, manifest = %self.file_name(), "manifest revision set");
        Ok(())
    }

    /// Switch from the legacy single file to numbered files behind the
    /// `CURRENT` marker. Does nothing if already versioned.
    pub fn convert_to_versioned(&mut self) -> Result<()> {
        if self.is_versioned() {
            return Ok(());
        }

        let file_num = self.new_file_num();
        self.install_versioned(file_num)?;
        self.edits_since_checkpoint = 0;

        remove_if_exists(&self.dir.join(LEGACY_MANIFEST))?;
        sync_dir(&self.dir)?;

        info!(manifest = %self.file_name(), "converted manifest to versioned naming");
        Ok(())
    }

    /// Write a checkpoint to `MANIFEST-<file_num>`, point `CURRENT` at it and
    /// drop older numbered files.
    fn install_versioned(&mut self, file_num: u64) -> Result<()> {
        let name = versioned_manifest_name(file_num);
        let path = self.dir.join(&name);
        write_checkpoint(&path, &self.snapshot())?;
        sync_dir(&self.dir)?;

        self.marker.move_to(&name)?;
        self.writer = open_append(&path)?;
        self.current_file_num = Some(file_num);

        remove_obsolete_manifests(&self.dir, file_num)?;
        debug!(manifest = %name, "installed manifest checkpoint");
        Ok(())
    }
}

fn encode_record(record: &ManifestRecord) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record).map_err(|e| Error::Serialization(e.to_string()))?;
    let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn write_checkpoint(path: &Path, snapshot: &ManifestSnapshot) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(&magic::MANIFEST.to_le_bytes())?;
    file.write_all(&encode_record(&ManifestRecord::Snapshot(snapshot.clone()))?)?;
    file.sync_all()?;
    Ok(())
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(OpenOptions::new().append(true).open(path)?))
}

fn replay(path: &Path) -> Result<Replayed> {
    let data = fs::read(path)?;
    if data.len() < 4 || data[..4] != magic::MANIFEST.to_le_bytes() {
        return Err(Error::Corruption(format!(
            "manifest {} has invalid magic number",
            path.display()
        )));
    }

    let mut offset = 4;
    let mut replayed: Option<Replayed> = None;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < RECORD_HEADER_SIZE {
            warn!(manifest = %path.display(), offset, "manifest ends in a partial record header");
            break;
        }
        let header = &data[offset..offset + RECORD_HEADER_SIZE];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if remaining - RECORD_HEADER_SIZE < len {
            warn!(manifest = %path.display(), offset, "manifest ends in a partial record");
            break;
        }
        let payload = &data[offset + RECORD_HEADER_SIZE..offset + RECORD_HEADER_SIZE + len];
        if crc32fast::hash(payload) != crc {
            warn!(manifest = %path.display(), offset, "manifest record checksum mismatch");
            break;
        }

        let record: ManifestRecord =
            bincode::deserialize(payload).map_err(|e| Error::Serialization(e.to_string()))?;
        match record {
            ManifestRecord::Snapshot(snapshot) => {
                if replayed.is_some() {
                    return Err(Error::Corruption(format!(
                        "manifest {} has a second checkpoint at offset {}",
                        path.display(),
                        offset
                    )));
                }
                replayed = Some(Replayed {
                    version: Version::from_levels(snapshot.levels)?,
                    revision: snapshot.revision,
                    next_file_num: snapshot.next_file_num,
                    last_sequence: snapshot.last_sequence,
                    edits: 0,
                    valid_len: 0,
                });
            }
            ManifestRecord::Edit(edit) => {
                let state = replayed.as_mut().ok_or_else(|| {
                    Error::Corruption(format!(
                        "manifest {} does not start with a checkpoint",
                        path.display()
                    ))
                })?;
                state.version = state.version.apply(&edit)?;
                if let Some(n) = edit.next_file_num {
                    state.next_file_num = state.next_file_num.max(n);
                }
                if let Some(s) = edit.last_sequence {
                    state.last_sequence = state.last_sequence.max(s);
                }
                state.edits += 1;
            }
        }

        offset += RECORD_HEADER_SIZE + len;
        if let Some(state) = replayed.as_mut() {
            state.valid_len = offset as u64;
        }
    }

    replayed.ok_or_else(|| {
        Error::Corruption(format!("manifest {} has no checkpoint", path.display()))
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Remove every numbered manifest other than `keep`
fn remove_obsolete_manifests(dir: &Path, keep: u64) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(file_num) = name.to_str().and_then(parse_versioned_manifest_name) else {
            continue;
        };
        if file_num != keep {
            debug!(manifest = ?name, "removing obsolete manifest");
            remove_if_exists(&entry.path())?;
        }
    }
    Ok(())
}

/// Remove all manifest state, including the `CURRENT` marker
fn remove_manifest_files(dir: &Path) -> Result<()> {
    for name in [LEGACY_MANIFEST, LEGACY_MANIFEST_TMP, MANIFEST_MARKER] {
        remove_if_exists(&dir.join(name))?;
    }
    remove_obsolete_manifests(dir, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rungkv_core::format_version::{MANIFEST_REVISION_LEGACY, MANIFEST_REVISION_VERSIONED};
    use rungkv_core::TableFormat;
    use tempfile::tempdir;

    fn file(num: u64, smallest: &str, largest: &str) -> FileMetadata {
        FileMetadata {
            file_num: num,
            smallest: smallest.as_bytes().to_vec(),
            largest: largest.as_bytes().to_vec(),
            size: 64,
            entry_count: 1,
            table_format: TableFormat::V1,
            marked_for_compaction: false,
        }
    }

    fn add_file(manifest: &mut Manifest, level: usize, smallest: &str, largest: &str) -> u64 {
        let num = manifest.new_file_num();
        manifest
            .log_and_apply(VersionEdit {
                new_files: vec![(level, file(num, smallest, largest))],
                ..Default::default()
            })
            .unwrap();
        num
    }

    #[test]
    fn test_legacy_create_and_reopen() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::create(dir.path(), false, MANIFEST_REVISION_LEGACY).unwrap();
        assert!(!manifest.is_versioned());
        assert_eq!(manifest.file_name(), "MANIFEST");
        drop(manifest);

        assert!(dir.path().join("MANIFEST").exists());
        assert!(!dir.path().join("CURRENT").exists());

        let manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.version().file_count(), 0);
        assert_eq!(manifest.revision(), MANIFEST_REVISION_LEGACY);
    }

    #[test]
    fn test_edits_survive_reopen() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), true, MANIFEST_REVISION_LEGACY).unwrap();
        let a = add_file(&mut manifest, 0, "a", "c");
        add_file(&mut manifest, 1, "d", "f");
        manifest
            .log_and_apply(VersionEdit {
                marked_files: vec![(0, a)],
                last_sequence: Some(42),
                ..Default::default()
            })
            .unwrap();
        let expected = manifest.version().clone();
        let next = manifest.next_file_num();
        drop(manifest);

        let manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.version(), &expected);
        assert_eq!(manifest.version().marked_count(), 1);
        assert_eq!(manifest.last_sequence(), 42);
        assert_eq!(manifest.next_file_num(), next);
    }

    #[test]
    fn test_invalid_edit_is_not_logged() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), false, MANIFEST_REVISION_LEGACY).unwrap();
        add_file(&mut manifest, 1, "a", "f");

        let err = manifest
            .log_and_apply(VersionEdit {
                new_files: vec![(1, file(99, "c", "k"))],
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.is_corruption());
        drop(manifest);

        let manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.version().file_count(), 1);
    }

    #[test]
    fn test_convert_to_versioned() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), false, MANIFEST_REVISION_LEGACY).unwrap();
        add_file(&mut manifest, 0, "a", "b");

        manifest.convert_to_versioned().unwrap();
        assert!(manifest.is_versioned());
        let name = manifest.file_name();
        assert!(name.starts_with("MANIFEST-"));
        assert!(!dir.path().join("MANIFEST").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("CURRENT")).unwrap(),
            format!("{}\n", name)
        );

        // Idempotent
        manifest.convert_to_versioned().unwrap();
        assert_eq!(manifest.file_name(), name);

        add_file(&mut manifest, 0, "c", "d");
        drop(manifest);

        let manifest = Manifest::open(dir.path()).unwrap();
        assert!(manifest.is_versioned());
        assert_eq!(manifest.version().files(0).len(), 2);
    }

    #[test]
    fn test_current_marker_wins_over_leftover_legacy_file() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), false, MANIFEST_REVISION_LEGACY).unwrap();
        let stale = fs::read(dir.path().join("MANIFEST")).unwrap();
        add_file(&mut manifest, 0, "a", "b");
        manifest.convert_to_versioned().unwrap();
        drop(manifest);

        // Crash after the marker moved but before the legacy file was removed.
        fs::write(dir.path().join("MANIFEST"), &stale).unwrap();

        let manifest = Manifest::open(dir.path()).unwrap();
        assert!(manifest.is_versioned());
        assert_eq!(manifest.version().file_count(), 1);
        assert!(!dir.path().join("MANIFEST").exists());
    }

    #[test]
    fn test_rotate_versioned_moves_marker() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), true, MANIFEST_REVISION_LEGACY).unwrap();
        add_file(&mut manifest, 0, "a", "b");
        let before = manifest.file_name();

        manifest.set_revision(MANIFEST_REVISION_VERSIONED).unwrap();
        let after = manifest.file_name();
        assert_ne!(before, after);
        assert!(!dir.path().join(&before).exists());
        assert!(dir.path().join(&after).exists());
        drop(manifest);

        let manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.revision(), MANIFEST_REVISION_VERSIONED);
        assert_eq!(manifest.file_name(), after);
        assert_eq!(manifest.version().file_count(), 1);
    }

    #[test]
    fn test_checkpoint_threshold_rotates() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), true, MANIFEST_REVISION_LEGACY).unwrap();
        manifest.set_checkpoint_threshold(2);
        let first = manifest.file_name();

        add_file(&mut manifest, 0, "a", "b");
        assert_eq!(manifest.file_name(), first);
        add_file(&mut manifest, 0, "c", "d");
        assert_ne!(manifest.file_name(), first);
        drop(manifest);

        assert_eq!(Manifest::open(dir.path()).unwrap().version().file_count(), 2);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), false, MANIFEST_REVISION_LEGACY).unwrap();
        add_file(&mut manifest, 0, "a", "b");
        drop(manifest);

        let path = dir.path().join("MANIFEST");
        let intact = fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            // A record header promising more bytes than were written.
            f.write_all(&200u32.to_le_bytes()).unwrap();
            f.write_all(&[0u8; 4]).unwrap();
            f.write_all(b"partial").unwrap();
        }

        let mut manifest = Manifest::open(dir.path()).unwrap();
        assert_eq!(manifest.version().file_count(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);

        add_file(&mut manifest, 0, "c", "d");
        drop(manifest);
        assert_eq!(Manifest::open(dir.path()).unwrap().version().file_count(), 2);
    }

    #[test]
    fn test_missing_manifest_is_corruption() {
        let dir = tempdir().unwrap();
        assert!(Manifest::open(dir.path()).err().unwrap().is_corruption());
    }

    #[test]
    fn test_create_discards_stale_state() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::create(dir.path(), true, MANIFEST_REVISION_LEGACY).unwrap();
        add_file(&mut manifest, 0, "a", "b");
        drop(manifest);

        let manifest = Manifest::create(dir.path(), false, MANIFEST_REVISION_LEGACY).unwrap();
        drop(manifest);
        assert!(!dir.path().join("CURRENT").exists());
        let manifest = Manifest::open(dir.path()).unwrap();
        assert!(!manifest.is_versioned());
        assert_eq!(manifest.version().file_count(), 0);
    }
}
