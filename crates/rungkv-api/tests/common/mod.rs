// Common test utilities for RungKV integration tests

use rungkv::{Db, FormatMajorVersion, Options, FORMAT_VERSION_MARKER};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture that owns a temporary database directory
pub struct DbTestFixture {
    #[allow(dead_code)]
    pub temp_dir: TempDir,
    pub db_path: PathBuf,
}

impl DbTestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("db");
        Self { temp_dir, db_path }
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Open with automatic compactions off so tests control the LSM shape
    pub fn open(&self, options: Options) -> Db {
        Db::open(&self.db_path, options.with_disable_automatic_compactions(true))
            .expect("Failed to open database")
    }

    /// Create a database at `version` holding a few flushed tables
    #[allow(dead_code)]
    pub fn create_at(&self, version: FormatMajorVersion) -> Db {
        let db = self.open(Options::new().with_initial_format_version(version));
        populate(&db, "seed", 3);
        db
    }

    /// Copy the database directory to a fresh fixture
    #[allow(dead_code)]
    pub fn fork(&self) -> DbTestFixture {
        let fork = DbTestFixture::new();
        copy_dir(&self.db_path, &fork.db_path);
        fork
    }

    #[allow(dead_code)]
    pub fn read_marker(&self) -> String {
        fs::read_to_string(self.db_path.join(FORMAT_VERSION_MARKER))
            .expect("Failed to read format marker")
    }

    #[allow(dead_code)]
    pub fn write_marker(&self, contents: &str) {
        fs::write(self.db_path.join(FORMAT_VERSION_MARKER), contents)
            .expect("Failed to write format marker");
    }
}

impl Default for DbTestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively copy a directory tree
pub fn copy_dir(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).expect("Failed to create copy target");
    for entry in fs::read_dir(src).expect("Failed to read source dir") {
        let entry = entry.expect("Failed to read dir entry");
        let target = dst.join(entry.file_name());
        if entry.file_type().expect("Failed to stat entry").is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).expect("Failed to copy file");
        }
    }
}

/// Write `tables` flushed tables of keys `<prefix>:<table>:<n>`
#[allow(dead_code)]
pub fn populate(db: &Db, prefix: &str, tables: usize) {
    for table in 0..tables {
        for n in 0..10 {
            let key = format!("{}:{}:{:02}", prefix, table, n);
            let value = format!("value-{}-{}", table, n);
            db.set(key.as_bytes(), value.as_bytes())
                .expect("Failed to set");
        }
        db.flush().expect("Failed to flush");
    }
}

/// Set, flush, delete, compact and scan under `prefix`, asserting the
/// results along the way
#[allow(dead_code)]
pub fn exercise(db: &Db, prefix: &str) {
    let start = format!("{}:", prefix);
    let end = format!("{};", prefix);

    for n in 0..5 {
        let key = format!("{}:{}", prefix, n);
        db.set(key.as_bytes(), b"v").expect("Failed to set");
    }
    db.flush().expect("Failed to flush");

    let deleted = format!("{}:2", prefix);
    db.delete(deleted.as_bytes()).expect("Failed to delete");
    db.compact(Some(start.as_bytes()), Some(end.as_bytes()))
        .expect("Failed to compact");

    assert_eq!(db.get(deleted.as_bytes()).expect("Failed to get"), None);
    let rows = db
        .scan(Some(start.as_bytes()), Some(end.as_bytes()))
        .expect("Failed to scan");
    let keys: Vec<String> = rows
        .into_iter()
        .map(|(k, _)| String::from_utf8(k).expect("non-utf8 key"))
        .collect();
    assert_eq!(
        keys,
        vec![
            format!("{}:0", prefix),
            format!("{}:1", prefix),
            format!("{}:3", prefix),
            format!("{}:4", prefix),
        ]
    );
}

/// Assert the seed data written by [`DbTestFixture::create_at`] is intact
#[allow(dead_code)]
pub fn assert_seeded(db: &Db) {
    let rows = db
        .scan(Some(&b"seed:"[..]), Some(&b"seed;"[..]))
        .expect("Failed to scan");
    assert_eq!(rows.len(), 30);
    assert_eq!(
        db.get(b"seed:1:07").expect("Failed to get"),
        Some(b"value-1-7".to_vec())
    );
}
