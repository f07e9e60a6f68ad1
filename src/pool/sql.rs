// SQLite-backed pools.

use crate::cache::Cache;
use crate::pool::schema::{Schema, SchemaCompat};
use crate::pool::{ChunkSink, ChunkSource};
use crate::Chunk;
use crate::Error;
use crate::Kind;
use crate::Oid;
use crate::Result;
use rusqlite::{params, Connection};
use std::fs;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// Payloads larger than this are kept in the blobs directory instead of
// the database itself.
const FILE_LIMIT: usize = 100_000;

/// A chunk store backed by an SQLite database, with the larger
/// payloads spilled into a sidecar directory of content-named files.
///
/// The pool keeps a transaction open at all times; nothing inserted is
/// durable until [`ChunkSink::flush`] commits it.  Dropping or closing
/// the pool discards unflushed work.
pub struct SqlPool {
    conn: Connection,
    uuid: Uuid,
    path: PathBuf,
}

impl SqlPool {
    /// Construct a fresh new pool under the given name.  The name must
    /// be usable as a fresh directory.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        fs::create_dir(path)?;
        fs::create_dir(&path.join("blobs"))?;
        let mut conn = Connection::open(&path.join("data.db"))?;
        POOL_SCHEMA.set(&mut conn)?;

        // Give the new pool a stable identity.
        conn.execute("INSERT INTO props (key, value) VALUES ('uuid', ?)",
                     [&Uuid::new_v4().hyphenated().to_string()])?;
        Ok(())
    }

    /// Open an existing pool, leaving it inside a fresh transaction.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SqlPool> {
        let path = path.as_ref();
        let db_path = path.join("data.db");
        match fs::metadata(&db_path) {
            Ok(ref meta) if meta.is_file() => (),
            _ => return Err(Error::PoolNotFound(path.to_path_buf())),
        }

        let conn = Connection::open(&db_path)?;
        let _inabilities = POOL_SCHEMA.check(&conn)?;

        let uuid: String = conn.query_row("SELECT value FROM props WHERE key = 'uuid'",
                                          [],
                                          |row| row.get(0))?;
        let uuid = Uuid::parse_str(&uuid)?;

        conn.execute_batch("BEGIN")?;

        Ok(SqlPool {
            conn,
            uuid,
            path: path.to_path_buf(),
        })
    }

    /// Close the pool.  Anything not flushed is discarded.
    pub fn close(self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        match self.conn.close() {
            Ok(()) => Ok(()),
            Err((_, err)) => Err(Error::Sql(err)),
        }
    }

    /// A ctime cache operating inside this pool's transaction.
    pub fn cache(&self, fs_uuid: &str) -> Result<Cache<'_>> {
        Cache::new(&self.conn, fs_uuid)
    }

    // Generate the paths to the directory and filename for storing an
    // out-of-band payload.
    fn get_paths(&self, oid: &Oid) -> (PathBuf, PathBuf) {
        let oid_text = oid.to_hex();
        let dir_text = &oid_text[0..2];
        let name_text = &oid_text[2..];

        let blobs = self.path.join("blobs");
        let dir = blobs.join(dir_text);
        let name = dir.join(name_text);

        (dir, name)
    }

    fn read_payload(&self, oid: &Oid, zsize: usize) -> Result<Vec<u8>> {
        let (_, fname) = self.get_paths(oid);
        let mut fd = fs::File::open(&fname)?;
        let mut result = Vec::new();
        fd.read_to_end(&mut result)?;
        if result.len() != zsize {
            return Err(Error::LengthMismatch);
        }
        Ok(result)
    }

    fn write_payload(&self, oid: &Oid, payload: &[u8]) -> Result<()> {
        let (dir, name) = self.get_paths(oid);

        // Just try writing the file first; create the fanout directory
        // only when that fails.
        let mut fd = match fs::File::create(&name) {
            Ok(fd) => fd,
            Err(_) => {
                fs::create_dir(&dir)?;
                fs::File::create(&name)?
            }
        };

        fd.write_all(payload)?;
        Ok(())
    }
}

impl ChunkSource for SqlPool {
    fn search(&self, key: &Oid) -> Result<Chunk> {
        let mut stmt = self.conn
            .prepare("SELECT kind, size, zsize, data FROM blobs WHERE oid = ?")?;
        let mut rows = stmt.query(params![&key.0[..]])?;
        let row = match rows.next()? {
            None => return Err(Error::MissingChunk),
            Some(row) => row,
        };

        let kind: String = row.get(0)?;
        let kind = Kind::new(&kind)?;
        let size: i64 = row.get(1)?;
        let zsize: i64 = row.get(2)?;
        let data: Option<Vec<u8>> = row.get(3)?;

        if size == 0 {
            return Ok(Chunk::new_plain_with_oid(kind, *key, vec![]));
        }

        let payload = match data {
            Some(data) => data,
            None => self.read_payload(key, zsize as usize)?,
        };

        if size == zsize {
            Ok(Chunk::new_plain_with_oid(kind, *key, payload))
        } else {
            Ok(Chunk::new_compressed(kind, *key, payload, size as u32))
        }
    }

    fn contains(&self, key: &Oid) -> Result<bool> {
        let count: i64 = self.conn
            .query_row("SELECT COUNT(*) FROM blobs WHERE oid = ?",
                       params![&key.0[..]],
                       |row| row.get(0))?;
        Ok(count > 0)
    }

    fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    fn backups(&self) -> Result<Vec<Oid>> {
        let mut stmt = self.conn.prepare("SELECT oid FROM blobs WHERE kind = 'back'")?;
        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let oid: Vec<u8> = row.get(0)?;
            result.push(Oid::from_raw(&oid));
        }

        Ok(result)
    }
}

impl ChunkSink for SqlPool {
    fn insert(&self, chunk: &Chunk) -> Result<()> {
        if self.contains(chunk.oid())? {
            return Ok(());
        }

        // Store whichever form is smaller.
        let payload = match chunk.zdata() {
            Some(zdata) => zdata,
            None => chunk.data()?,
        };

        let result = if payload.len() > FILE_LIMIT {
            self.write_payload(chunk.oid(), payload)?;
            self.conn.execute("INSERT INTO blobs (oid, kind, size, zsize)
                               VALUES (?, ?, ?, ?)",
                              params![&chunk.oid().0[..],
                                      &chunk.kind().to_string(),
                                      chunk.data_len() as i64,
                                      payload.len() as i64])
        } else {
            self.conn.execute("INSERT INTO blobs (oid, kind, size, zsize, data)
                               VALUES (?, ?, ?, ?, ?)",
                              params![&chunk.oid().0[..],
                                      &chunk.kind().to_string(),
                                      chunk.data_len() as i64,
                                      payload.len() as i64,
                                      payload])
        };

        match result {
            Ok(_) => Ok(()),
            // The contains() check above should have caught this; a
            // constraint violation here means the invariants are gone.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateInsert)
            }
            Err(e) => Err(Error::Sql(e)),
        }
    }

    fn flush(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT; BEGIN")?;
        Ok(())
    }
}

#[derive(PartialEq, Eq, Clone)]
pub enum PoolInabilities {
    NoFilesystems,
    NoCTimeCache,
}

static POOL_SCHEMA: Schema<'static, PoolInabilities> = Schema {
    version: "1:2014-03-18",
    schema: &[r#"PRAGMA PAGE_SIZE=8192"#,
              r#"CREATE TABLE blobs (
                id INTEGER PRIMARY KEY,
                oid BLOB UNIQUE NOT NULL,
                kind TEXT,
                size INTEGER,
                zsize INTEGER,
                data BLOB)"#,
              r#"CREATE INDEX blobs_oid ON blobs(oid)"#,
              r#"CREATE INDEX blobs_backs ON blobs(kind) WHERE kind = 'back'"#,
              r#"CREATE TABLE props (
                key TEXT PRIMARY KEY,
                value TEXT)"#,
              r#"CREATE TABLE filesystems (
                fsid INTEGER PRIMARY KEY,
                uuid TEXT UNIQUE)"#,
              r#"CREATE TABLE ctime_dirs (
                pkey INTEGER PRIMARY KEY,
                fsid INTEGER REFERENCES filesystems (fsid) NOT NULL,
                pino INTEGER NOT NULL,
                UNIQUE (fsid, pino))"#,
              r#"CREATE TABLE ctime_cache (
                pkey INTEGER REFERENCES ctime_dirs (pkey) NOT NULL,
                ino INTEGER NOT NULL,
                expire INTEGER NOT NULL,
                ctime INTEGER NOT NULL,
                oid BLOB NOT NULL,
                PRIMARY KEY (pkey, ino))"#],
    compats: &[SchemaCompat {
        version: "1:2014-03-13",
        inabilities: &[PoolInabilities::NoFilesystems, PoolInabilities::NoCTimeCache],
    }],
};

#[cfg(test)]
mod test {
    use super::*;
    use crate::pool::{ChunkSink, ChunkSource};
    use crate::testutil::{boundary_sizes, make_kinded_random_chunk, make_random_chunk,
                          make_uncompressible_chunk};
    use crate::Kind;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn simple_create() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pool");

        SqlPool::create(&path).unwrap();
        let pool = SqlPool::open(&path).unwrap();
        let mut all = HashMap::new();

        for i in boundary_sizes() {
            let ch = make_random_chunk(i, i);
            pool.insert(&ch).unwrap();
            if all.insert(*ch.oid(), ch).is_some() {
                panic!("Duplicate chunk in test");
            }
        }

        // Repeat this with uncompressible data.
        for i in boundary_sizes() {
            if i < 16 {
                continue;
            }
            let ch = make_uncompressible_chunk(i, i);
            pool.insert(&ch).unwrap();
            if all.insert(*ch.oid(), ch).is_some() {
                panic!("Duplicate chunk in test");
            }
        }

        pool.flush().unwrap();

        // Verify all of them.
        for (key, c1) in all.iter() {
            let c2 = pool.search(key).unwrap();
            assert_eq!(c1.kind(), c2.kind());
            assert_eq!(c1.oid(), c2.oid());
            assert_eq!(c1.data().unwrap(), c2.data().unwrap());
        }
    }

    #[test]
    fn not_a_pool() {
        let tmp = TempDir::new().unwrap();
        match SqlPool::open(&tmp.path().join("nothing")) {
            Err(Error::PoolNotFound(_)) => (),
            _ => panic!("Opening nothing should fail"),
        }
    }

    #[test]
    fn reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pool");

        SqlPool::create(&path).unwrap();
        let ch = make_random_chunk(1024, 7);

        let first_uuid = {
            let pool = SqlPool::open(&path).unwrap();
            pool.insert(&ch).unwrap();
            pool.flush().unwrap();
            let id = *pool.uuid();
            pool.close().unwrap();
            id
        };

        let pool = SqlPool::open(&path).unwrap();
        assert_eq!(pool.uuid(), &first_uuid);
        assert!(pool.contains(ch.oid()).unwrap());
        let c2 = pool.search(ch.oid()).unwrap();
        assert_eq!(ch.data().unwrap(), c2.data().unwrap());
    }

    #[test]
    fn unflushed_discard() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pool");

        SqlPool::create(&path).unwrap();
        let ch = make_random_chunk(512, 3);
        {
            let pool = SqlPool::open(&path).unwrap();
            pool.insert(&ch).unwrap();
            assert!(pool.contains(ch.oid()).unwrap());
            pool.close().unwrap();
        }

        let pool = SqlPool::open(&path).unwrap();
        assert!(!pool.contains(ch.oid()).unwrap());
    }

    #[test]
    fn empty_chunk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pool");

        SqlPool::create(&path).unwrap();
        let pool = SqlPool::open(&path).unwrap();

        let ch = Chunk::new_plain(Kind::new("blob").unwrap(), vec![]);
        pool.insert(&ch).unwrap();
        pool.flush().unwrap();

        let c2 = pool.search(ch.oid()).unwrap();
        assert_eq!(c2.data_len(), 0);
        assert_eq!(c2.data().unwrap(), &[] as &[u8]);
        assert_eq!(c2.oid(), ch.oid());
    }

    #[test]
    fn sidecar() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pool");

        SqlPool::create(&path).unwrap();
        let ch = make_uncompressible_chunk(200_000, 42);
        {
            let pool = SqlPool::open(&path).unwrap();
            pool.insert(&ch).unwrap();

            // The payload must land as a file under blobs/<byte0>.
            let text = ch.oid().to_hex();
            let blob = path.join("blobs").join(&text[0..2]).join(&text[2..]);
            assert!(blob.is_file());
            assert_eq!(blob.metadata().unwrap().len(), 200_000);

            // Reinsert: still present, and no other file appears.
            pool.insert(&ch).unwrap();
            assert!(pool.contains(ch.oid()).unwrap());
            let count = walk_files(&path.join("blobs"));
            assert_eq!(count, 1);

            pool.flush().unwrap();
            pool.close().unwrap();
        }

        let pool = SqlPool::open(&path).unwrap();
        let c2 = pool.search(ch.oid()).unwrap();
        assert_eq!(ch.data().unwrap(), c2.data().unwrap());
    }

    fn walk_files(dir: &Path) -> usize {
        let mut count = 0;
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                count += walk_files(&entry.path());
            } else {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn backups() {
        use std::collections::HashSet;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pool");

        SqlPool::create(&path).unwrap();
        let pool = SqlPool::open(&path).unwrap();
        let mut oids = HashSet::new();

        for i in 0..1000 {
            let ch = make_kinded_random_chunk(Kind::new("back").unwrap(), 64, i);
            pool.insert(&ch).unwrap();
            oids.insert(*ch.oid());
        }
        pool.flush().unwrap();

        for id in pool.backups().unwrap() {
            assert!(oids.remove(&id));
        }

        assert_eq!(oids.len(), 0);
    }
}
