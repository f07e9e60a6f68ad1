// Storage pools.

//! A pool is a place that chunks can be stored.

use crate::Chunk;
use crate::Error;
use crate::Oid;
use crate::Result;
use std::fs;
use std::path::Path;
use uuid::Uuid;

pub use self::ram::RamPool;
pub use self::sql::SqlPool;

pub mod index;
pub mod ram;
pub mod schema;
pub mod seg;
pub mod sql;

/// A source of chunks.  This is similar to a `Map`, except that the
/// values aren't kept in memory, so we have to return real items
/// rather than references to them.
pub trait ChunkSource {
    /// Return the chunk with the given key.
    fn search(&self, key: &Oid) -> Result<Chunk>;

    /// Is this key present in the store?
    fn contains(&self, key: &Oid) -> Result<bool>;

    /// Return the Uuid associated with this pool.
    fn uuid(&self) -> &Uuid;

    /// Return the set of backup roots stored in this pool, in no
    /// particular order.
    fn backups(&self) -> Result<Vec<Oid>>;
}

/// Something that chunks can be written to.  All sinks are also
/// sources.
pub trait ChunkSink: ChunkSource {
    /// Add the chunk to the store.  Inserting a chunk that is already
    /// present is a no-op.
    fn insert(&self, chunk: &Chunk) -> Result<()>;

    /// Make everything inserted so far durable.
    fn flush(&self) -> Result<()>;
}

/// Open the pool at the given directory.
pub fn open<P: AsRef<Path>>(path: P) -> Result<SqlPool> {
    let path = path.as_ref();
    match fs::metadata(&path.join("data.db")) {
        Ok(ref meta) if meta.is_file() => (),
        _ => return Err(Error::PoolNotFound(path.to_path_buf())),
    }

    SqlPool::open(path)
}
