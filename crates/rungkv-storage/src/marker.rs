//! Marker - Durable, atomically swapped pointers
//!
//! A marker is a tiny file under a stable name whose contents identify the
//! current generation of some piece of state. The database keeps two of them:
//! the format marker (the current format major version) and, once the
//! manifest is versioned, the manifest marker (the live manifest file name).
//!
//! ## Update protocol
//!
//! ```text
//! write <name>.tmp → fsync → rename <name>.tmp → <name> → fsync dir
//! ```
//!
//! The rename is atomic, so a reader observes either the old or the new value
//! after a crash, never a torn one.

use rungkv_core::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the marker recording the format major version.
pub const FORMAT_VERSION_MARKER: &str = "FORMAT_VERSION";

/// Name of the marker recording the live manifest file.
pub const MANIFEST_MARKER: &str = "CURRENT";

const TMP_SUFFIX: &str = ".tmp";

/// A located marker.
#[derive(Debug)]
pub struct Marker {
    dir: PathBuf,
    name: String,
    value: Option<String>,
}

impl Marker {
    /// Locate the marker `name` in `dir`, returning it with its current value
    /// (`None` if the marker has never been written).
    ///
    /// A leftover temporary file from an interrupted move is removed.
    pub fn locate(dir: impl AsRef<Path>, name: &str) -> Result<(Self, Option<String>)> {
        let dir = dir.as_ref().to_path_buf();
        let tmp = dir.join(format!("{}{}", name, TMP_SUFFIX));
        match fs::remove_file(&tmp) {
            Ok(()) => debug!(marker = name, "removed stale marker temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let value = match fs::read_to_string(dir.join(name)) {
            Ok(contents) => Some(contents.trim_end_matches('\n').to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let marker = Self {
            dir,
            name: name.to_string(),
            value: value.clone(),
        };
        Ok((marker, value))
    }

    /// Current value, as of the last `locate` or `move_to`.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Path of the stable marker file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Atomically repoint the marker at `value`.
    ///
    /// On error the marker keeps its previous value both on disk and in memory.
    pub fn move_to(&mut self, value: &str) -> io::Result<()> {
        if value.is_empty() || value.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid marker value {:?}", value),
            ));
        }

        let tmp = self.dir.join(format!("{}{}", self.name, TMP_SUFFIX));
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.path())?;
        sync_dir(&self.dir)?;

        debug!(marker = %self.name, value, "moved marker");
        self.value = Some(value.to_string());
        Ok(())
    }
}

/// Make directory entry changes (creates, renames, removals) durable.
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
