//! Error types for RungKV.

use crate::format_version::FormatMajorVersion;
use thiserror::Error;

/// The main error type for RungKV operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// On-disk data failed validation
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The database handle has already been closed
    #[error("database is closed")]
    Closed,

    /// An ordinal outside the range of format major versions known to this build
    #[error("unsupported format major version {0}")]
    UnsupportedVersion(u64),

    /// The persisted format marker names a version this build does not know.
    ///
    /// The message text is relied on by operator tooling; keep it stable.
    #[error("database \"{name}\" written in format major version {version}")]
    FormatVersionTooNew {
        /// Database identity (empty for unnamed databases)
        name: String,
        /// Raw marker contents
        version: String,
    },

    /// A ratchet was asked to move the format major version backwards
    #[error("cannot ratchet format major version from {current} down to {target}")]
    InvalidRatchetTarget {
        /// Version currently persisted
        current: FormatMajorVersion,
        /// Requested version
        target: FormatMajorVersion,
    },

    /// A migration step failed; the marker still names the previous version
    #[error("migration to format major version {version} ({}) failed: {source}", .version.name())]
    MigrationFailed {
        /// Version whose migration failed
        version: FormatMajorVersion,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The migration succeeded but the format marker could not be persisted
    #[error("failed to persist format major version {version}: {source}")]
    MarkerIo {
        /// Version that was being recorded
        version: FormatMajorVersion,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns true if the error is one of the format-version rejections
    /// surfaced by open or ratchet.
    pub fn is_format_version_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedVersion(_)
                | Error::FormatVersionTooNew { .. }
                | Error::InvalidRatchetTarget { .. }
        )
    }

    /// Returns true if the error indicates on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

/// A specialized `Result` type for RungKV operations.
pub type Result<T> = std::result::Result<T, Error>;
