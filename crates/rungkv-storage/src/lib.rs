//! # RungKV Storage Engine
//!
//! LSM-tree based persistent storage engine for RungKV, with format major
//! version gating and migration.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of RungKV.**
//!
//! Users should depend on the main [`rungkv`](https://crates.io/crates/rungkv) crate
//! instead, which provides the stable public API. This crate's API may change
//! without notice between minor versions.
//!
//! ```toml
//! # In your Cargo.toml - use the main crate, not this one:
//! [dependencies]
//! rungkv = "0.3"
//! ```
//!
//! ---
//!
//! This crate provides the storage engine for RungKV:
//!
//! - **Marker**: Crash-safe pointers recording the format major version and
//!   the live manifest
//! - **Memtable**: In-memory write buffer using BTreeMap for sorted order
//! - **SSTable**: Immutable on-disk sorted tables, encoded per `TableFormat`
//! - **Version / Manifest**: The LSM file set and its durable edit log
//! - **Compaction**: Merging down the levels and rewriting marked files
//! - **Migration**: One upgrade step per format major version
//! - **Db**: Open, ratchet, read and write
//!
//! ## Architecture
//!
//! ```text
//! Writes → Memtable (memory) → SSTable (disk, format from current version)
//!              ↓                    ↓
//!         Flush when full    Compact to lower levels
//!
//! Ratchet: migration → move FORMAT_VERSION marker → publish version
//! ```

#![warn(missing_docs)]

pub mod compaction;
pub mod db;
pub mod manifest;
pub mod marker;
pub mod memtable;
pub mod migration;
pub mod sstable;
pub mod version;

pub use compaction::{CompactionConfig, CompactionReason, CompactionStats, CompactionWorker};
pub use db::{Db, Metrics, Options};
pub use manifest::Manifest;
pub use marker::{Marker, FORMAT_VERSION_MARKER, MANIFEST_MARKER};
pub use memtable::{Memtable, MemtableEntry};
pub use migration::{migration_for, verify_registry, Migration, MigrationContext, MIGRATIONS};
pub use sstable::{SSTableEntry, SSTableMeta, SSTableReader, SSTableWriter, TableProperties};
pub use version::{FileMetadata, Version, VersionEdit, NUM_LEVELS};
