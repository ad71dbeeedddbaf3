//! Db - Database handle and format-version orchestration
//!
//! [`Db::open`] reads the format marker, creates the database if it has none,
//! and ratchets to [`Options::target_format_version`] before returning.
//! [`Db::ratchet_format_major_version`] moves an open database forward one
//! version at a time: each step runs its migration under the database lock,
//! moves the marker, and only then publishes the new version to readers.
//!
//! There is no write-ahead log. Writes live in the memtable until
//! [`Db::flush`] or [`Db::close`].

use crate::compaction::{file_metadata, CompactionConfig, CompactionStats, CompactionWorker};
use crate::manifest::Manifest;
use crate::marker::{Marker, FORMAT_VERSION_MARKER};
use crate::memtable::Memtable;
use crate::migration::{self, migration_for, MigrationContext};
use crate::sstable::{parse_table_file_name, table_path, SSTableReader, SSTableWriter, SST_DIR};
use crate::version::VersionEdit;
use parking_lot::Mutex;
use rungkv_core::{Error, FormatMajorVersion, Result, TableFormat};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// Default memtable flush threshold (4MB)
pub const DEFAULT_MEMTABLE_SIZE: u64 = 4 * 1024 * 1024;

/// Database options
#[derive(Debug, Clone)]
pub struct Options {
    /// Identity used in error messages; empty for unnamed databases
    pub name: String,
    /// Format major version a new database is created at
    pub initial_format_version: FormatMajorVersion,
    /// Version to ratchet to at open; ignored if the database is already newer
    pub target_format_version: Option<FormatMajorVersion>,
    /// Maximum memtable size before flushing
    pub memtable_size: u64,
    /// Compaction configuration
    pub compaction: CompactionConfig,
    /// Skip compactions after flushes
    pub disable_automatic_compactions: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            name: String::new(),
            initial_format_version: FormatMajorVersion::MOST_COMPATIBLE,
            target_format_version: None,
            memtable_size: DEFAULT_MEMTABLE_SIZE,
            compaction: CompactionConfig::default(),
            disable_automatic_compactions: false,
        }
    }
}

impl Options {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database identity
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the version a new database is created at
    pub fn with_initial_format_version(mut self, version: FormatMajorVersion) -> Self {
        self.initial_format_version = version;
        self
    }

    /// Set the version to ratchet to at open
    pub fn with_target_format_version(mut self, version: FormatMajorVersion) -> Self {
        self.target_format_version = Some(version);
        self
    }

    /// Create new databases at `version` and ratchet existing ones up to it
    pub fn with_format_major_version(self, version: FormatMajorVersion) -> Self {
        self.with_initial_format_version(version)
            .with_target_format_version(version)
    }

    /// Set the memtable flush threshold
    pub fn with_memtable_size(mut self, bytes: u64) -> Self {
        self.memtable_size = bytes;
        self
    }

    /// Set the compaction configuration
    pub fn with_compaction(mut self, compaction: CompactionConfig) -> Self {
        self.compaction = compaction;
        self
    }

    /// Disable compactions after flushes
    pub fn with_disable_automatic_compactions(mut self, disable: bool) -> Self {
        self.disable_automatic_compactions = disable;
        self
    }
}

/// Point-in-time database metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Current format major version
    pub format_major_version: FormatMajorVersion,
    /// Number of files at each level
    pub level_file_counts: Vec<usize>,
    /// Files flagged for compaction
    pub marked_files: usize,
    /// Live files per table format
    pub table_formats: BTreeMap<TableFormat, usize>,
    /// Total bytes across all levels
    pub total_size: u64,
    /// Current memtable size in bytes
    pub memtable_size: u64,
    /// Number of entries in memtable
    pub memtable_entries: usize,
    /// Compaction statistics
    pub compaction: CompactionStats,
}

/// Everything guarded by the database mutex
struct DbState {
    memtable: Memtable,
    manifest: Manifest,
    format_marker: Marker,
    compactor: CompactionWorker,
    closed: bool,
}

impl DbState {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

/// An open database
pub struct Db {
    dir: PathBuf,
    name: String,
    memtable_size: u64,
    /// Mutation lock: memtable, manifest, format marker
    state: Mutex<DbState>,
    /// Serializes whole ratchets
    ratchet_lock: Mutex<()>,
    /// Published format major version; never decreases
    format_version: AtomicU8,
    disable_automatic_compactions: AtomicBool,
}

/// Parse the format marker's contents
fn parse_format_marker(name: &str, raw: &str) -> Result<FormatMajorVersion> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(FormatMajorVersion::from_ordinal)
        .ok_or_else(|| Error::FormatVersionTooNew {
            name: name.to_string(),
            version: raw.trim().to_string(),
        })
}

impl Db {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        migration::ensure_registry_verified();

        let dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let (mut format_marker, persisted) = Marker::locate(&dir, FORMAT_VERSION_MARKER)?;
        fs::create_dir_all(dir.join(SST_DIR))?;
        let (manifest, current) = match persisted {
            Some(raw) => {
                let current = parse_format_marker(&options.name, &raw)?;
                (Manifest::open(&dir)?, current)
            }
            None => match Self::recover_unmarked(&dir)? {
                Some(manifest) => {
                    let floor = FormatMajorVersion::MOST_COMPATIBLE;
                    Self::write_format_marker(&mut format_marker, floor)?;
                    warn!(
                        dir = %dir.display(),
                        files = manifest.version().file_count(),
                        version = %floor,
                        "format marker missing; assuming the most compatible version"
                    );
                    (manifest, floor)
                }
                None => {
                    let initial = options.initial_format_version;
                    let manifest = Manifest::create(
                        &dir,
                        initial >= FormatMajorVersion::VersionedManifestMarker,
                        initial.manifest_revision(),
                    )?;
                    Self::write_format_marker(&mut format_marker, initial)?;
                    info!(
                        dir = %dir.display(),
                        version = %initial,
                        name = initial.name(),
                        "created database"
                    );
                    (manifest, initial)
                }
            },
        };

        let memtable = Memtable::with_sequence(manifest.last_sequence());
        let compactor = CompactionWorker::new(&dir, options.compaction.clone());

        let db = Self {
            dir,
            name: options.name.clone(),
            memtable_size: options.memtable_size,
            state: Mutex::new(DbState {
                memtable,
                manifest,
                format_marker,
                compactor,
                closed: false,
            }),
            ratchet_lock: Mutex::new(()),
            format_version: AtomicU8::new(current as u8),
            disable_automatic_compactions: AtomicBool::new(options.disable_automatic_compactions),
        };
        db.remove_obsolete_tables()?;

        info!(
            dir = %db.dir.display(),
            version = %current,
            name = current.name(),
            "opened database"
        );

        match options.target_format_version {
            Some(target) if target > current => db.ratchet_format_major_version(target)?,
            Some(target) if target < current => debug!(
                target = %target,
                current = %current,
                "ignoring target format major version below the persisted one"
            ),
            _ => {}
        }

        Ok(db)
    }

    /// Decide what an unmarked directory holds.
    ///
    /// A manifest that references files belongs to a database whose marker
    /// was lost; it is returned so the caller can adopt it. `None` means
    /// nothing worth keeping: no manifest, or one left by an interrupted
    /// creation. Tables without a usable manifest are an error.
    fn recover_unmarked(dir: &Path) -> Result<Option<Manifest>> {
        let has_tables = fs::read_dir(dir.join(SST_DIR))?
            .filter_map(|entry| entry.ok())
            .any(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(parse_table_file_name)
                    .is_some()
            });

        if !Manifest::exists(dir) {
            if has_tables {
                return Err(Error::Corruption(format!(
                    "{} holds tables but no manifest or format marker",
                    dir.display()
                )));
            }
            return Ok(None);
        }

        match Manifest::open(dir) {
            Ok(manifest) if manifest.version().file_count() > 0 => Ok(Some(manifest)),
            Ok(_) => {
                debug!(dir = %dir.display(), "discarding manifest of an interrupted creation");
                Ok(None)
            }
            Err(e) if has_tables => Err(e),
            Err(e) => {
                debug!(
                    dir = %dir.display(),
                    error = %e,
                    "discarding unreadable manifest of an interrupted creation"
                );
                Ok(None)
            }
        }
    }

    fn write_format_marker(marker: &mut Marker, version: FormatMajorVersion) -> Result<()> {
        marker
            .move_to(&version.ordinal().to_string())
            .map_err(|source| Error::MarkerIo { version, source })
    }

    /// Database directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Database identity from [`Options::name`]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current format major version
    pub fn format_major_version(&self) -> FormatMajorVersion {
        let ordinal = self.format_version.load(Ordering::Acquire);
        // Only valid ordinals are ever stored.
        FormatMajorVersion::from_ordinal(ordinal as u64).unwrap_or(FormatMajorVersion::NEWEST)
    }

    /// Advance the format major version to `target`, running every
    /// intermediate migration in order.
    ///
    /// Ratcheting to the current version is a no-op; ratcheting backwards
    /// fails with [`Error::InvalidRatchetTarget`]. If a migration fails the
    /// marker still names the last version whose migration completed.
    ///
    /// Steps that request compaction rewrite every marked file before the next
    /// step runs, even with automatic compactions disabled. If that rewrite
    /// fails the error is [`Error::MigrationFailed`] for the step, the marker
    /// and [`Db::format_major_version`] already name it, and later steps are
    /// not run.
    pub fn ratchet_format_major_version(&self, target: FormatMajorVersion) -> Result<()> {
        let _ratchet = self.ratchet_lock.lock();

        let current = self.format_major_version();
        if target < current {
            return Err(Error::InvalidRatchetTarget { current, target });
        }
        if target == current {
            return Ok(());
        }

        for version in current.steps_to(target) {
            let compaction_requested = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                state.check_open()?;

                let migration = migration_for(version);
                info!(
                    version = %version,
                    migration = migration.name,
                    "running format major version migration"
                );
                let mut ctx = MigrationContext::new(&mut state.manifest);
                (migration.run)(version, &mut ctx).map_err(|e| Error::MigrationFailed {
                    version,
                    source: Box::new(e),
                })?;
                let requested = ctx.compaction_requested();

                Self::write_format_marker(&mut state.format_marker, version)?;
                self.format_version.store(version as u8, Ordering::Release);
                requested
            };

            // The marker has already moved; files left marked are picked up
            // by the next compaction.
            if compaction_requested {
                let compacted = self.compact_marked().map_err(|e| Error::MigrationFailed {
                    version,
                    source: Box::new(e),
                })?;
                debug!(version = %version, compacted, "compacted marked files");
            }
        }

        info!(from = %current, to = %target, "ratcheted format major version");
        Ok(())
    }

    /// Insert or update a key-value pair
    #[doc(alias = "put")]
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        let set_with_delete = self.format_major_version() >= FormatMajorVersion::SetWithDelete;
        state
            .memtable
            .put(key.to_vec(), value.to_vec(), set_with_delete);
        self.maybe_flush(&mut state)
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        state.memtable.delete(key.to_vec());
        self.maybe_flush(&mut state)
    }

    /// Retrieve a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        state.check_open()?;

        if let Some(entry) = state.memtable.get(key) {
            return Ok(entry.value().map(<[u8]>::to_vec));
        }

        for (_, file) in state.manifest.version().files_for_key(key) {
            let mut reader = SSTableReader::open(table_path(&self.dir, file.file_num))?;
            if let Some(entry) = reader.get(key)? {
                if entry.is_tombstone() {
                    return Ok(None);
                }
                return Ok(Some(entry.value));
            }
        }

        Ok(None)
    }

    /// Live key-value pairs with keys in `[start, end)`, in key order.
    /// `None` leaves that side unbounded.
    pub fn scan(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let state = self.state.lock();
        state.check_open()?;

        let in_range = |key: &[u8]| {
            start.map_or(true, |s| key >= s) && end.map_or(true, |e| key < e)
        };

        // Apply oldest to newest so newer entries overwrite.
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        let version = state.manifest.version();
        for level in (0..version.levels().len()).rev() {
            let mut files: Vec<_> = version.files(level).iter().collect();
            files.sort_by_key(|f| f.file_num);
            for file in files {
                if start.map_or(false, |s| file.largest.as_slice() < s)
                    || end.map_or(false, |e| file.smallest.as_slice() >= e)
                {
                    continue;
                }
                let mut reader = SSTableReader::open(table_path(&self.dir, file.file_num))?;
                let mut iter = reader.iter();
                while let Some(entry) = iter.next_entry()? {
                    if !in_range(entry.key.as_slice()) {
                        continue;
                    }
                    let value = if entry.is_tombstone() {
                        None
                    } else {
                        Some(entry.value)
                    };
                    merged.insert(entry.key, value);
                }
            }
        }
        for (key, entry) in state.memtable.range(start, end) {
            merged.insert(key.clone(), entry.value().map(<[u8]>::to_vec));
        }

        Ok(merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }

    /// Flush the memtable to a level-0 SSTable
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        self.flush_locked(&mut state)?;
        self.maybe_compact(&mut state)
    }

    fn maybe_flush(&self, state: &mut DbState) -> Result<()> {
        if state.memtable.size_bytes() >= self.memtable_size {
            self.flush_locked(state)?;
            self.maybe_compact(state)?;
        }
        Ok(())
    }

    fn flush_locked(&self, state: &mut DbState) -> Result<()> {
        if state.memtable.is_empty() {
            return Ok(());
        }

        let table_format = self.format_major_version().max_table_format();
        let file_num = state.manifest.new_file_num();
        let sequence = state.memtable.sequence();
        let entries = state
            .memtable
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()));
        let meta =
            SSTableWriter::from_memtable(table_path(&self.dir, file_num), table_format, entries)?;

        state.manifest.log_and_apply(VersionEdit {
            new_files: vec![(0, file_metadata(file_num, &meta))],
            last_sequence: Some(sequence),
            ..Default::default()
        })?;
        state.memtable = Memtable::with_sequence(sequence);

        info!(
            file_num,
            entries = meta.entry_count,
            size = meta.file_size,
            %table_format,
            "flushed memtable"
        );
        Ok(())
    }

    /// Run automatic compactions until none is due
    fn maybe_compact(&self, state: &mut DbState) -> Result<()> {
        if self.disable_automatic_compactions.load(Ordering::Relaxed) {
            return Ok(());
        }
        let table_format = self.format_major_version().max_table_format();
        while state.compactor.run_once(&mut state.manifest, table_format)? {}
        Ok(())
    }

    /// Compact the key range `[start, end]` down to the deepest level holding
    /// data in it. Flushes the memtable first.
    pub fn compact(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.check_open()?;
        self.flush_locked(state)?;

        let deepest = state
            .compactor
            .deepest_level_with_data(state.manifest.version(), start, end);
        let Some(deepest) = deepest else {
            return Ok(());
        };

        let table_format = self.format_major_version().max_table_format();
        for level in 0..deepest.max(1) {
            let picked = state
                .compactor
                .pick_manual(state.manifest.version(), level, start, end);
            if let Some(compaction) = picked {
                state
                    .compactor
                    .run(&compaction, &mut state.manifest, table_format)?;
            }
        }
        Ok(())
    }

    /// Run compactions until nothing is due, including every file marked by a
    /// migration. Returns the number of compactions run.
    pub fn compact_to_quiescence(&self) -> Result<usize> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.check_open()?;

        let table_format = self.format_major_version().max_table_format();
        let mut count = 0;
        while state
            .compactor
            .run_once(&mut state.manifest, table_format)?
        {
            count += 1;
        }
        Ok(count)
    }

    /// Compact until no file is marked
    fn compact_marked(&self) -> Result<usize> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.check_open()?;

        let table_format = self.format_major_version().max_table_format();
        let mut count = 0;
        while state.manifest.version().marked_count() > 0
            && state
                .compactor
                .run_once(&mut state.manifest, table_format)?
        {
            count += 1;
        }
        Ok(count)
    }

    /// Turn compactions after flushes on or off
    pub fn set_disable_automatic_compactions(&self, disable: bool) {
        self.disable_automatic_compactions
            .store(disable, Ordering::Relaxed);
    }

    /// Current metrics
    pub fn metrics(&self) -> Metrics {
        let state = self.state.lock();
        let version = state.manifest.version();

        let mut table_formats = BTreeMap::new();
        for file in version.levels().iter().flatten() {
            *table_formats.entry(file.table_format).or_insert(0) += 1;
        }

        Metrics {
            format_major_version: self.format_major_version(),
            level_file_counts: version.level_file_counts(),
            marked_files: version.marked_count(),
            table_formats,
            total_size: version.total_size(),
            memtable_size: state.memtable.size_bytes(),
            memtable_entries: state.memtable.len(),
            compaction: state.compactor.stats().clone(),
        }
    }

    /// Human-readable dump of the LSM levels
    pub fn lsm_debug_string(&self) -> String {
        self.state.lock().manifest.version().debug_string()
    }

    /// Flush the memtable and close the database. Later operations fail with
    /// [`Error::Closed`]; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        self.flush_locked(&mut state)?;
        state.closed = true;
        info!(dir = %self.dir.display(), "closed database");
        Ok(())
    }

    /// Remove SSTables the manifest does not reference
    fn remove_obsolete_tables(&self) -> Result<()> {
        let state = self.state.lock();
        let live = state.manifest.version().file_nums();

        for entry in fs::read_dir(self.dir.join(SST_DIR))? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(file_num) = name.to_str().and_then(parse_table_file_name) else {
                continue;
            };
            if live.contains(&file_num) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(file_num, "removed obsolete table"),
                Err(e) => warn!(file_num, error = %e, "failed to remove obsolete table"),
            }
        }
        Ok(())
    }
}
