// The ctime cache.

//! Tracking file ctimes between backups.
//!
//! Stat information alone can tell us a file is unchanged: if the
//! inode's ctime matches what we recorded last time, the previously
//! written data OID can be reused without reading the file at all.
//! The cache lives in the pool's own database, keyed by filesystem and
//! parent directory inode, and each entry carries a random expiration
//! a few weeks out so that the pool's old data eventually stops being
//! pinned by entries for files that keep changing back.
//!
//! All timestamps are signed 64-bit nanoseconds since the epoch.

use crate::pool::SqlPool;
use crate::store::walk::{walk, Visit, VisitResult, Visitor};
use crate::store::PropertyMap;
use crate::Oid;
use crate::Result;
use rand::Rng;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

const WEEK: i64 = 7 * 24 * 3600 * 1_000_000_000;

pub struct Cache<'a> {
    conn: &'a Connection,

    fsid: i64,

    /// The time expiration dates are based on.  For backups this is
    /// the start of the backup; regeneration bases it on the date of
    /// the backup being rescanned, which may expire entries as they
    /// are written.
    pub base_time: i64,

    // The time the cache was opened.  Entries that expire before this
    // are discarded on read.
    now: i64,
}

/// Cached information for a given directory.
pub struct DirInfo {
    /// The inode of the directory itself.
    pub ino: u64,

    /// A mapping from file inode number to information about that
    /// file.
    pub files: HashMap<u64, FileInfo>,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    /// The inode number of this file.
    pub ino: u64,

    /// The file's ctime.
    pub ctime: i64,

    /// The OID of the file contents.
    pub data: Oid,

    /// When this entry stops being trusted.
    pub expire: i64,
}

impl DirInfo {
    pub fn new(ino: u64) -> DirInfo {
        DirInfo {
            ino,
            files: HashMap::new(),
        }
    }
}

impl<'a> Cache<'a> {
    /// Open the cache for one filesystem, creating its row on first
    /// use.  The connection's open transaction carries all of the
    /// cache's writes.
    pub(crate) fn new(conn: &'a Connection, fs_uuid: &str) -> Result<Cache<'a>> {
        conn.execute("INSERT OR IGNORE INTO filesystems (uuid) VALUES (?)", [fs_uuid])?;

        let fsid: i64 = conn.query_row("SELECT fsid FROM filesystems WHERE uuid = ?",
                                       [fs_uuid],
                                       |row| row.get(0))?;

        let now = wall_clock();
        Ok(Cache {
            conn,
            fsid,
            base_time: now,
            now,
        })
    }

    /// Replace the cache information for a given directory.
    pub fn update_dir(&self, di: &DirInfo) -> Result<()> {
        self.conn
            .execute("INSERT OR IGNORE INTO ctime_dirs (fsid, pino) VALUES (?, ?)",
                     params![self.fsid, di.ino as i64])?;

        let pkey: i64 = self.conn
            .query_row("SELECT pkey FROM ctime_dirs WHERE fsid = ? AND pino = ?",
                       params![self.fsid, di.ino as i64],
                       |row| row.get(0))?;

        // Remove any existing entries.
        self.conn.execute("DELETE FROM ctime_cache WHERE pkey = ?", [pkey])?;

        // Insert all of the files.
        let mut stmt = self.conn
            .prepare("INSERT INTO ctime_cache (pkey, ino, expire, ctime, oid)
                      VALUES (?, ?, ?, ?, ?)")?;

        for fi in di.files.values() {
            stmt.execute(params![pkey, fi.ino as i64, fi.expire, fi.ctime, &fi.data.0[..]])?;
        }

        Ok(())
    }

    /// Read the cache data for a given directory.  Expired entries are
    /// discarded.
    pub fn get_dir(&self, ino: u64) -> Result<DirInfo> {
        let mut dir = DirInfo::new(ino);

        let mut stmt = self.conn
            .prepare("SELECT ino, ctime, expire, oid
                      FROM ctime_cache JOIN ctime_dirs USING (pkey)
                      WHERE fsid = ? AND pino = ?")?;
        let mut rows = stmt.query(params![self.fsid, ino as i64])?;

        while let Some(row) = rows.next()? {
            let ino: i64 = row.get(0)?;
            let ctime: i64 = row.get(1)?;
            let expire: i64 = row.get(2)?;
            let data: Vec<u8> = row.get(3)?;

            if expire < self.now {
                continue;
            }

            let file = FileInfo {
                ino: ino as u64,
                ctime,
                data: Oid::from_raw(&data),
                expire,
            };
            dir.files.insert(file.ino, file);
        }

        Ok(dir)
    }

    /// Set an expire time for the given file info, a random time 2-6
    /// weeks past the base time.
    pub fn set_expire(&self, fi: &mut FileInfo) {
        let age = rand::thread_rng().gen_range(2 * WEEK..6 * WEEK);
        fi.expire = self.base_time + age;
    }
}

fn wall_clock() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i64,
        // Pre-1970 clocks get everything expired, which is safe.
        Err(_) => 0,
    }
}

/// Rebuild the ctime cache from an existing backup, for a pool whose
/// cache tables have been lost or damaged.  Expirations are based on
/// the date of the backup itself.
pub fn regenerate(pool: &SqlPool, backup: &Oid) -> Result<()> {
    let mut state = Regen {
        pool,
        cache: None,
        dirs: Vec::new(),
    };

    walk(pool, backup, &mut state)
}

struct Regen<'a> {
    pool: &'a SqlPool,
    cache: Option<Cache<'a>>,
    dirs: Vec<DirInfo>,
}

impl<'a> Visitor for Regen<'a> {
    fn back(&mut self, _root: &Oid, date: i64, props: &BTreeMap<String, String>) -> VisitResult {
        let uuid = match props.get("fsuuid") {
            Some(uuid) => uuid,
            None => {
                return Err(crate::Error::BadProperties("backup has no fsuuid property"
                    .to_owned()))
            }
        };

        let mut cache = self.pool.cache(uuid)?;
        // Base the cache time on the time of the backup, not the
        // current time.
        cache.base_time = date;
        self.cache = Some(cache);

        Ok(Visit::Continue)
    }

    fn enter(&mut self, props: &PropertyMap) -> VisitResult {
        let ino = props.get_u64("ino")?;
        self.dirs.push(DirInfo::new(ino));
        Ok(Visit::Continue)
    }

    fn leave(&mut self, _props: &PropertyMap) -> Result<()> {
        let info = match self.dirs.pop() {
            Some(info) => info,
            None => unreachable!(),
        };

        match self.cache {
            Some(ref cache) => cache.update_dir(&info),
            None => unreachable!(),
        }
    }

    fn open(&mut self, props: &PropertyMap) -> VisitResult {
        let mut fi = FileInfo {
            ino: props.get_u64("ino")?,
            ctime: props.get_time("ctime")?,
            data: props.get_oid("data")?,
            expire: 0,
        };

        if let Some(ref cache) = self.cache {
            cache.set_expire(&mut fi);
        }
        if let Some(cwd) = self.dirs.last_mut() {
            cwd.files.insert(fi.ino, fi);
        }

        // There is no need to look at the file data itself.
        Ok(Visit::Prune)
    }
}
