// End to end backup tests.

use adump::cache::{self, DirInfo};
use adump::dump;
use adump::pool::{ChunkSource, SqlPool};
use adump::restore;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const FS_UUID: &str = "2c2a7696-b8b2-4f94-a1b4-a1bcd3033913";

fn build_tree(base: &Path) {
    fs::create_dir(base).unwrap();
    fs::write(base.join("a.txt"), b"alpha file, short and sweet\n").unwrap();
    fs::set_permissions(base.join("a.txt"), fs::Permissions::from_mode(0o640)).unwrap();

    // Something that spans several chunks.
    let mut big = Vec::new();
    for i in 0..100_000u32 {
        big.extend_from_slice(format!("line {}\n", i).as_bytes());
    }
    fs::write(base.join("b.bin"), &big).unwrap();

    fs::create_dir(base.join("sub")).unwrap();
    fs::write(base.join("sub").join("c.txt"), b"nested\n").unwrap();

    symlink("a.txt", base.join("ln")).unwrap();
}

fn fresh_pool(base: &Path) -> SqlPool {
    let path = base.join("pool");
    SqlPool::create(&path).unwrap();
    SqlPool::open(&path).unwrap()
}

#[test]
fn incremental() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    build_tree(&src);

    let pool = fresh_pool(tmp.path());

    // Distinct properties per run keep the backup roots distinct even
    // when two runs land in the same millisecond.
    let seq = |n: u32| {
        let mut props = BTreeMap::new();
        props.insert("seq".to_owned(), n.to_string());
        props
    };

    // First backup reads everything.
    let s1 = dump::run(&pool, &src, FS_UUID, &seq(1)).unwrap();
    assert_eq!(s1.files_read, 3);
    assert_eq!(s1.files_reused, 0);

    // An unchanged tree is satisfied from the cache: no file is
    // opened, so no blob chunk can be emitted.
    let s2 = dump::run(&pool, &src, FS_UUID, &seq(2)).unwrap();
    assert_eq!(s2.files_read, 0);
    assert_eq!(s2.files_reused, 3);
    assert!(s2.bytes_reused > 0);

    // Touch one file; exactly that file is re-read.
    thread::sleep(Duration::from_millis(20));
    fs::write(src.join("a.txt"), b"alpha file, changed\n").unwrap();

    let s3 = dump::run(&pool, &src, FS_UUID, &seq(3)).unwrap();
    assert_eq!(s3.files_read, 1);
    assert_eq!(s3.files_reused, 2);

    assert_eq!(pool.backups().unwrap().len(), 3);
}

#[test]
fn restore_matches() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    build_tree(&src);

    let pool = fresh_pool(tmp.path());
    let mut props = BTreeMap::new();
    props.insert("host".to_owned(), "testbox".to_owned());

    let summary = dump::run(&pool, &src, FS_UUID, &props).unwrap();

    let dest = tmp.path().join("dest");
    restore::run(&pool, &summary.root, &dest).unwrap();

    assert_eq!(fs::read(dest.join("a.txt")).unwrap(),
               fs::read(src.join("a.txt")).unwrap());
    assert_eq!(fs::read(dest.join("b.bin")).unwrap(),
               fs::read(src.join("b.bin")).unwrap());
    assert_eq!(fs::read(dest.join("sub").join("c.txt")).unwrap(),
               fs::read(src.join("sub").join("c.txt")).unwrap());

    // Mode and mtime round-trip.
    let mode = fs::metadata(dest.join("a.txt")).unwrap().mode() & 0o7777;
    assert_eq!(mode, 0o640);
    assert_eq!(fs::metadata(dest.join("b.bin")).unwrap().mtime(),
               fs::metadata(src.join("b.bin")).unwrap().mtime());

    // The symlink came back as a symlink.
    let target = fs::read_link(dest.join("ln")).unwrap();
    assert_eq!(target, Path::new("a.txt"));
}

#[test]
fn cache_regeneration() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    build_tree(&src);

    let pool = fresh_pool(tmp.path());
    let props = BTreeMap::new();

    let s1 = dump::run(&pool, &src, FS_UUID, &props).unwrap();
    assert_eq!(s1.files_read, 3);

    // Lose the cached entries for the root directory.
    let root_ino = fs::metadata(&src).unwrap().ino();
    {
        let cache = pool.cache(FS_UUID).unwrap();
        cache.update_dir(&DirInfo::new(root_ino)).unwrap();
    }

    // The two files directly under the root now have to be re-read.
    let s2 = dump::run(&pool, &src, FS_UUID, &props).unwrap();
    assert_eq!(s2.files_read, 2);
    assert_eq!(s2.files_reused, 1);

    // Wipe again, then rebuild the cache from the backup itself.
    {
        let cache = pool.cache(FS_UUID).unwrap();
        cache.update_dir(&DirInfo::new(root_ino)).unwrap();
    }
    cache::regenerate(&pool, &s2.root).unwrap();

    let s3 = dump::run(&pool, &src, FS_UUID, &props).unwrap();
    assert_eq!(s3.files_read, 0);
    assert_eq!(s3.files_reused, 3);
}
