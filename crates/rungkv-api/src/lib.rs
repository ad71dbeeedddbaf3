//! # RungKV
//!
//! An embedded LSM key-value engine whose on-disk format only ever moves
//! forward, one format major version at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rungkv::{Db, FormatMajorVersion, Options};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create a database at the most compatible format
//!     let db = Db::open("./my_database", Options::new())?;
//!
//!     db.set(b"user:1:name", b"Alice")?;
//!     if let Some(name) = db.get(b"user:1:name")? {
//!         println!("Name: {}", String::from_utf8_lossy(&name));
//!     }
//!
//!     // Opt in to newer on-disk features. This cannot be undone.
//!     db.ratchet_format_major_version(FormatMajorVersion::NEWEST)?;
//!     assert_eq!(db.format_major_version(), FormatMajorVersion::NEWEST);
//!
//!     db.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Upgrading at Open
//!
//! ```rust,no_run
//! use rungkv::{Db, FormatMajorVersion, Options};
//!
//! // Databases older than Versioned are migrated before open returns;
//! // newer ones are left alone.
//! let options = Options::new()
//!     .with_name("orders")
//!     .with_target_format_version(FormatMajorVersion::Versioned);
//! let db = Db::open("./orders", options)?;
//! assert!(db.format_major_version() >= FormatMajorVersion::Versioned);
//! # Ok::<(), rungkv::Error>(())
//! ```
//!
//! ## Format Major Versions
//!
//! | ordinal | version | table format |
//! |---|---|---|
//! | 001 | `MostCompatible` | V1 |
//! | 002 | `VersionedManifestMarker` | V1 |
//! | 003 | `Versioned` | V1 |
//! | 004 | `SetWithDelete` | V1 |
//! | 005 | `BlockPropertyCollector` | V2 |
//! | 006 | `SplitUserKeysMarked` | V2 |
//! | 007 | `MarkedCompacted` | V2 |
//! | 008 | `RangeKeys` | V3 |
//!
//! A build refuses to open a database whose format marker names a version it
//! does not know.

pub mod logging;

// Core types
pub use rungkv_core::format_version::{table_format_bound, FormatMajorVersion, TableFormat};
pub use rungkv_core::{Error, Result};

// Database
pub use rungkv_storage::{Db, Metrics, Options, FORMAT_VERSION_MARKER};

// Storage components
pub use rungkv_storage::{
    migration_for, verify_registry, CompactionConfig, CompactionReason, CompactionStats,
    FileMetadata, Migration, Version, NUM_LEVELS,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
