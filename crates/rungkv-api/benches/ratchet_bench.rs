use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rungkv::{Db, FormatMajorVersion, Options};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn copy_dir(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).unwrap();
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// A closed database at `version` with `tables` flushed tables
fn template(version: FormatMajorVersion, tables: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let db = Db::open(
        dir.path(),
        Options::new()
            .with_initial_format_version(version)
            .with_disable_automatic_compactions(true),
    )
    .unwrap();
    for table in 0..tables {
        for n in 0..1000 {
            let key = format!("key:{:02}:{:04}", table, n);
            db.set(key.as_bytes(), b"benchmark value").unwrap();
        }
        db.flush().unwrap();
    }
    db.close().unwrap();
    dir
}

fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");

    let newest = template(FormatMajorVersion::NEWEST, 4);
    group.bench_function("at_newest", |b| {
        b.iter(|| Db::open(newest.path(), Options::new()).unwrap());
    });

    let oldest = template(FormatMajorVersion::MostCompatible, 4);
    group.bench_function("upgrade_to_newest", |b| {
        b.iter_batched(
            || {
                let copy = TempDir::new().unwrap();
                copy_dir(oldest.path(), copy.path());
                copy
            },
            |copy| {
                let db = Db::open(
                    copy.path(),
                    Options::new().with_target_format_version(FormatMajorVersion::NEWEST),
                )
                .unwrap();
                (db, copy)
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

fn bench_ratchet(c: &mut Criterion) {
    let mut group = c.benchmark_group("ratchet");

    let oldest = template(FormatMajorVersion::MostCompatible, 4);
    for target in [
        FormatMajorVersion::Versioned,
        FormatMajorVersion::SplitUserKeysMarked,
        FormatMajorVersion::MarkedCompacted,
    ] {
        group.bench_function(target.name(), |b| {
            b.iter_batched(
                || {
                    let copy = TempDir::new().unwrap();
                    copy_dir(oldest.path(), copy.path());
                    let db = Db::open(copy.path(), Options::new()).unwrap();
                    (db, copy)
                },
                |(db, copy)| {
                    db.ratchet_format_major_version(target).unwrap();
                    (db, copy)
                },
                BatchSize::PerIteration,
            );
        });
    }

    let newest = template(FormatMajorVersion::NEWEST, 1);
    let db = Db::open(newest.path(), Options::new()).unwrap();
    group.bench_function("no_op", |b| {
        b.iter(|| db.ratchet_format_major_version(FormatMajorVersion::NEWEST).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_open, bench_ratchet);
criterion_main!(benches);
