//! # RungKV Core
//!
//! Core types shared by the RungKV crates: the error type and the
//! format-major-version registry.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format_version;

pub use error::{Error, Result};
pub use format_version::{table_format_bound, FormatMajorVersion, TableFormat};
