//! Format major versions and table formats.
//!
//! A database's format major version decides which on-disk encodings it may
//! produce. Versions form a strict total order from
//! [`FormatMajorVersion::MOST_COMPATIBLE`] to [`FormatMajorVersion::NEWEST`];
//! a database only ever moves forward through them (see the ratchet in
//! `rungkv-storage`). Every version maps to the newest [`TableFormat`] that
//! newly written tables may use.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Magic numbers for file validation
pub mod magic {
    /// SSTable magic: "RGST" (RunG SsTable)
    pub const SSTABLE: u64 = 0x5247_5354_0000_0001;

    /// Manifest magic: "RGMF" (RunG ManiFest)
    pub const MANIFEST: u32 = 0x5247_4D46;
}

/// Manifest revision written before [`FormatMajorVersion::Versioned`].
pub const MANIFEST_REVISION_LEGACY: u32 = 1;

/// Manifest revision written from [`FormatMajorVersion::Versioned`] onwards.
pub const MANIFEST_REVISION_VERSIONED: u32 = 2;

/// The set of on-disk capabilities a database is allowed to use.
///
/// The discriminant is the ordinal persisted in the format marker and must
/// never be reused or renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FormatMajorVersion {
    /// Oldest format; every build can read and write it.
    MostCompatible = 1,
    /// Manifest files are numbered and located through a `CURRENT` marker.
    VersionedManifestMarker = 2,
    /// Manifest checkpoints carry the versioned manifest revision.
    Versioned = 3,
    /// The write path may emit `SetWithDelete` entries.
    SetWithDelete = 4,
    /// New tables carry table properties and per-block properties.
    BlockPropertyCollector = 5,
    /// Files that split a user key across a level boundary, or that use an
    /// outdated table format, are marked for compaction.
    SplitUserKeysMarked = 6,
    /// Every file still marked for compaction has been requested for rewrite.
    MarkedCompacted = 7,
    /// New tables use the range-key table format.
    RangeKeys = 8,
}

impl FormatMajorVersion {
    /// Number of format major versions known to this build.
    pub const COUNT: usize = 8;

    /// The floor: the version new databases are created at by default.
    pub const MOST_COMPATIBLE: Self = Self::MostCompatible;

    /// The ceiling known to this build.
    pub const NEWEST: Self = Self::RangeKeys;

    /// All versions in ascending order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::MostCompatible,
        Self::VersionedManifestMarker,
        Self::Versioned,
        Self::SetWithDelete,
        Self::BlockPropertyCollector,
        Self::SplitUserKeysMarked,
        Self::MarkedCompacted,
        Self::RangeKeys,
    ];

    /// The numeric ordinal persisted in the format marker.
    pub const fn ordinal(self) -> u64 {
        self as u64
    }

    /// Looks up a version by ordinal.
    pub fn from_ordinal(ordinal: u64) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.ordinal() == ordinal)
    }

    /// Returns the next newer version, or `None` at [`Self::NEWEST`].
    pub fn next(self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// Symbolic name, used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::MostCompatible => "MostCompatible",
            Self::VersionedManifestMarker => "VersionedManifestMarker",
            Self::Versioned => "Versioned",
            Self::SetWithDelete => "SetWithDelete",
            Self::BlockPropertyCollector => "BlockPropertyCollector",
            Self::SplitUserKeysMarked => "SplitUserKeysMarked",
            Self::MarkedCompacted => "MarkedCompacted",
            Self::RangeKeys => "RangeKeys",
        }
    }

    /// Versions strictly newer than `self`, up to and including `target`.
    pub fn steps_to(self, target: Self) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |v| *v > self && *v <= target)
    }

    /// The newest table format that tables written at this version may use.
    pub fn max_table_format(self) -> TableFormat {
        table_format_bound(self.ordinal())
    }

    /// Manifest revision written by databases at this version.
    pub fn manifest_revision(self) -> u32 {
        if self >= Self::Versioned {
            MANIFEST_REVISION_VERSIONED
        } else {
            MANIFEST_REVISION_LEGACY
        }
    }
}

impl Default for FormatMajorVersion {
    fn default() -> Self {
        Self::MOST_COMPATIBLE
    }
}

impl fmt::Display for FormatMajorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.ordinal())
    }
}

impl TryFrom<u64> for FormatMajorVersion {
    type Error = Error;

    fn try_from(ordinal: u64) -> Result<Self> {
        Self::from_ordinal(ordinal).ok_or(Error::UnsupportedVersion(ordinal))
    }
}

impl FromStr for FormatMajorVersion {
    type Err = Error;

    /// Accepts either the decimal ordinal (`"3"`, `"003"`) or the symbolic
    /// name (`"Versioned"`, case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(ordinal) = s.parse::<u64>() {
            return Self::try_from(ordinal);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::InvalidOperation(format!("unknown format major version {:?}", s))
            })
    }
}

/// Physical table encodings, in the order they were introduced.
///
/// Readers accept every format; writers are capped by
/// [`FormatMajorVersion::max_table_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TableFormat {
    /// Data blocks, index and footer.
    V1 = 1,
    /// Adds table properties and per-block last-key properties.
    V2 = 2,
    /// Adds a checksum over the index block.
    V3 = 3,
}

impl TableFormat {
    /// Newest table format known to this build.
    pub const NEWEST: Self = Self::V3;

    /// Numeric tag stored in table footers.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decodes a footer tag.
    pub fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// Whether tables of this format carry a properties block.
    pub fn has_properties(self) -> bool {
        self >= Self::V2
    }

    /// Whether tables of this format checksum their index block.
    pub fn has_index_checksum(self) -> bool {
        self >= Self::V3
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.as_u32())
    }
}

/// Table-format bound for each format major version, indexed by `ordinal - 1`.
const TABLE_FORMAT_BOUNDS: [TableFormat; FormatMajorVersion::COUNT] = [
    TableFormat::V1, // MostCompatible
    TableFormat::V1, // VersionedManifestMarker
    TableFormat::V1, // Versioned
    TableFormat::V1, // SetWithDelete
    TableFormat::V2, // BlockPropertyCollector
    TableFormat::V2, // SplitUserKeysMarked
    TableFormat::V2, // MarkedCompacted
    TableFormat::V3, // RangeKeys
];

/// Table-format bound for a raw ordinal.
///
/// # Panics
///
/// Panics if `ordinal` is not a format major version known to this build.
/// Callers must validate ordinals first.
pub fn table_format_bound(ordinal: u64) -> TableFormat {
    assert!(
        (FormatMajorVersion::MOST_COMPATIBLE.ordinal()..=FormatMajorVersion::NEWEST.ordinal())
            .contains(&ordinal),
        "format major version {} has no table format bound",
        ordinal
    );
    TABLE_FORMAT_BOUNDS[(ordinal - 1) as usize]
}

/// Number of entries in the table-format bound table.
pub fn table_format_bound_count() -> usize {
    TABLE_FORMAT_BOUNDS.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_ordinals() {
        for pair in FormatMajorVersion::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].ordinal() + 1, pair[1].ordinal());
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(FormatMajorVersion::NEWEST.next(), None);
        assert_eq!(FormatMajorVersion::default(), FormatMajorVersion::MostCompatible);
    }

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(FormatMajorVersion::Versioned.to_string(), "003");
        assert_eq!(FormatMajorVersion::RangeKeys.to_string(), "008");
        assert_eq!(FormatMajorVersion::Versioned.name(), "Versioned");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "3".parse::<FormatMajorVersion>().unwrap(),
            FormatMajorVersion::Versioned
        );
        assert_eq!(
            "005".parse::<FormatMajorVersion>().unwrap(),
            FormatMajorVersion::BlockPropertyCollector
        );
        assert_eq!(
            "rangekeys".parse::<FormatMajorVersion>().unwrap(),
            FormatMajorVersion::RangeKeys
        );
        assert!(matches!(
            "999999".parse::<FormatMajorVersion>(),
            Err(Error::UnsupportedVersion(999999))
        ));
        assert!(matches!(
            "0".parse::<FormatMajorVersion>(),
            Err(Error::UnsupportedVersion(0))
        ));
        assert!("garbage".parse::<FormatMajorVersion>().is_err());
    }

    #[test]
    fn test_steps_to() {
        let steps: Vec<_> = FormatMajorVersion::Versioned
            .steps_to(FormatMajorVersion::BlockPropertyCollector)
            .collect();
        assert_eq!(
            steps,
            vec![
                FormatMajorVersion::SetWithDelete,
                FormatMajorVersion::BlockPropertyCollector
            ]
        );
        assert_eq!(
            FormatMajorVersion::RangeKeys
                .steps_to(FormatMajorVersion::RangeKeys)
                .count(),
            0
        );
    }

    #[test]
    fn test_table_format_bound_is_total_and_monotonic() {
        assert_eq!(table_format_bound_count(), FormatMajorVersion::COUNT);
        for pair in FormatMajorVersion::ALL.windows(2) {
            assert!(pair[0].max_table_format() <= pair[1].max_table_format());
        }
        assert_eq!(
            FormatMajorVersion::NEWEST.max_table_format(),
            TableFormat::NEWEST
        );
    }

    #[test]
    #[should_panic(expected = "has no table format bound")]
    fn test_table_format_bound_out_of_range_panics() {
        table_format_bound(FormatMajorVersion::NEWEST.ordinal() + 1);
    }

    #[test]
    fn test_table_format_tags() {
        for format in [TableFormat::V1, TableFormat::V2, TableFormat::V3] {
            assert_eq!(TableFormat::from_u32(format.as_u32()), Some(format));
        }
        assert_eq!(TableFormat::from_u32(0), None);
        assert!(!TableFormat::V1.has_properties());
        assert!(TableFormat::V2.has_properties());
        assert!(!TableFormat::V2.has_index_checksum());
        assert!(TableFormat::V3.has_index_checksum());
    }

    #[test]
    fn test_manifest_revision() {
        assert_eq!(
            FormatMajorVersion::VersionedManifestMarker.manifest_revision(),
            MANIFEST_REVISION_LEGACY
        );
        assert_eq!(
            FormatMajorVersion::Versioned.manifest_revision(),
            MANIFEST_REVISION_VERSIONED
        );
    }
}
