//! Migrations - One upgrade step per format major version
//!
//! Entering a format major version runs exactly one [`Migration`]. Migrations
//! only change persisted state: they rewrite the manifest or flag files for
//! compaction. Rewriting flagged files is left to the compaction worker.
//!
//! The registry is a fixed-size array indexed by `ordinal - 1`, checked once
//! per process by [`verify_registry`].

use crate::manifest::Manifest;
use crate::version::VersionEdit;
use rungkv_core::format_version::{table_format_bound_count, MANIFEST_REVISION_VERSIONED};
use rungkv_core::{FormatMajorVersion, Result};
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Signature of a migration: the version being entered and the state it may
/// touch.
pub type MigrationFn = fn(FormatMajorVersion, &mut MigrationContext<'_>) -> Result<()>;

/// A named upgrade step
pub struct Migration {
    /// Version this migration enters
    pub version: FormatMajorVersion,
    /// Name used in logs
    pub name: &'static str,
    /// The step itself
    pub run: MigrationFn,
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// State handed to a running migration
pub struct MigrationContext<'a> {
    manifest: &'a mut Manifest,
    compaction_requested: bool,
}

impl<'a> MigrationContext<'a> {
    /// Wrap the database's manifest
    pub fn new(manifest: &'a mut Manifest) -> Self {
        Self {
            manifest,
            compaction_requested: false,
        }
    }

    /// The manifest being migrated
    pub fn manifest(&mut self) -> &mut Manifest {
        self.manifest
    }

    /// Ask for marked files to be compacted once the step commits
    pub fn request_compaction(&mut self) {
        self.compaction_requested = true;
    }

    /// Whether [`request_compaction`](Self::request_compaction) was called
    pub fn compaction_requested(&self) -> bool {
        self.compaction_requested
    }
}

/// Every migration, indexed by `ordinal - 1`
pub static MIGRATIONS: [Migration; FormatMajorVersion::COUNT] = [
    Migration {
        version: FormatMajorVersion::MostCompatible,
        name: "most-compatible",
        run: no_op,
    },
    Migration {
        version: FormatMajorVersion::VersionedManifestMarker,
        name: "versioned-manifest-marker",
        run: versioned_manifest_marker,
    },
    Migration {
        version: FormatMajorVersion::Versioned,
        name: "versioned",
        run: versioned,
    },
    Migration {
        version: FormatMajorVersion::SetWithDelete,
        name: "set-with-delete",
        run: no_op,
    },
    Migration {
        version: FormatMajorVersion::BlockPropertyCollector,
        name: "block-property-collector",
        run: no_op,
    },
    Migration {
        version: FormatMajorVersion::SplitUserKeysMarked,
        name: "split-user-keys-marked",
        run: split_user_keys_marked,
    },
    Migration {
        version: FormatMajorVersion::MarkedCompacted,
        name: "marked-compacted",
        run: marked_compacted,
    },
    Migration {
        version: FormatMajorVersion::RangeKeys,
        name: "range-keys",
        run: no_op,
    },
];

/// The migration that enters `version`
pub fn migration_for(version: FormatMajorVersion) -> &'static Migration {
    &MIGRATIONS[(version.ordinal() - 1) as usize]
}

/// Check that every version has a migration aligned to its ordinal and a
/// table-format bound, and that bounds never decrease.
///
/// # Panics
///
/// Panics on any mismatch; the registry is fixed at build time.
pub fn verify_registry() {
    assert_eq!(
        MIGRATIONS.len(),
        FormatMajorVersion::ALL.len(),
        "migration registry size mismatch"
    );
    assert_eq!(
        table_format_bound_count(),
        FormatMajorVersion::COUNT,
        "table format bound registry size mismatch"
    );
    for (idx, version) in FormatMajorVersion::ALL.iter().enumerate() {
        assert_eq!(
            version.ordinal(),
            idx as u64 + 1,
            "format major version {} out of sequence",
            version.name()
        );
        assert_eq!(
            MIGRATIONS[idx].version,
            *version,
            "migration slot {} holds {} instead of {}",
            idx,
            MIGRATIONS[idx].version.name(),
            version.name()
        );
    }
    for pair in FormatMajorVersion::ALL.windows(2) {
        assert!(
            pair[0].max_table_format() <= pair[1].max_table_format(),
            "table format bound decreases from {} to {}",
            pair[0],
            pair[1]
        );
    }
}

/// Run [`verify_registry`] once per process
pub(crate) fn ensure_registry_verified() {
    static VERIFIED: OnceLock<()> = OnceLock::new();
    VERIFIED.get_or_init(verify_registry);
}

fn no_op(version: FormatMajorVersion, _ctx: &mut MigrationContext<'_>) -> Result<()> {
    debug!(version = %version, "no state change required");
    Ok(())
}

fn versioned_manifest_marker(
    _version: FormatMajorVersion,
    ctx: &mut MigrationContext<'_>,
) -> Result<()> {
    ctx.manifest().convert_to_versioned()
}

fn versioned(_version: FormatMajorVersion, ctx: &mut MigrationContext<'_>) -> Result<()> {
    let manifest = ctx.manifest();
    // Entering Versioned always follows VersionedManifestMarker.
    manifest.convert_to_versioned()?;
    manifest.set_revision(MANIFEST_REVISION_VERSIONED)
}

fn split_user_keys_marked(
    version: FormatMajorVersion,
    ctx: &mut MigrationContext<'_>,
) -> Result<()> {
    mark_files_needing_rewrite(version, ctx.manifest())?;
    Ok(())
}

fn marked_compacted(version: FormatMajorVersion, ctx: &mut MigrationContext<'_>) -> Result<()> {
    mark_files_needing_rewrite(version, ctx.manifest())?;
    if ctx.manifest.version().marked_count() > 0 {
        ctx.request_compaction();
    }
    Ok(())
}

/// Flag every file that splits a user key with a same-level neighbour, or
/// whose table format is older than `version` allows. Returns how many files
/// were newly flagged.
pub fn mark_files_needing_rewrite(
    version: FormatMajorVersion,
    manifest: &mut Manifest,
) -> Result<usize> {
    let bound = version.max_table_format();
    let mut edit = VersionEdit::default();

    for (level, files) in manifest.version().levels().iter().enumerate() {
        for (idx, file) in files.iter().enumerate() {
            if file.marked_for_compaction {
                continue;
            }
            let outdated = file.table_format < bound;
            let split = level > 0
                && ((idx > 0 && files[idx - 1].largest == file.smallest)
                    || files
                        .get(idx + 1)
                        .map_or(false, |next| file.largest == next.smallest));
            if outdated || split {
                edit.marked_files.push((level, file.file_num));
            }
        }
    }

    let marked = edit.marked_files.len();
    if marked > 0 {
        manifest.log_and_apply(edit)?;
    }
    info!(
        version = %version,
        marked,
        total_marked = manifest.version().marked_count(),
        "marked files for compaction"
    );
    Ok(marked)
}
