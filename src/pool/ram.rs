// RAM pools.

use crate::pool::{ChunkSink, ChunkSource};
use crate::Chunk;
use crate::Error;
use crate::Kind;
use crate::Oid;
use crate::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use uuid::Uuid;

/// An in-memory pool, mostly useful for testing the layers above the
/// chunk store.
pub struct RamPool {
    uuid: Uuid,
    chunks: RefCell<HashMap<Oid, Stashed>>,
}

struct Stashed {
    kind: Kind,
    data: Vec<u8>,
}

impl Stashed {
    fn to_chunk(&self, oid: &Oid) -> Chunk {
        Chunk::new_plain_with_oid(self.kind, *oid, self.data.clone())
    }
}

impl RamPool {
    pub fn new() -> RamPool {
        RamPool {
            uuid: Uuid::new_v4(),
            chunks: RefCell::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.borrow().is_empty()
    }
}

impl Default for RamPool {
    fn default() -> RamPool {
        RamPool::new()
    }
}

impl ChunkSource for RamPool {
    fn search(&self, key: &Oid) -> Result<Chunk> {
        self.chunks
            .borrow()
            .get(key)
            .map(|x| x.to_chunk(key))
            .ok_or(Error::MissingChunk)
    }

    fn contains(&self, key: &Oid) -> Result<bool> {
        Ok(self.chunks.borrow().contains_key(key))
    }

    fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    fn backups(&self) -> Result<Vec<Oid>> {
        let back = Kind::new("back")?;
        Ok(self.chunks
            .borrow()
            .iter()
            .filter(|&(_, stash)| stash.kind == back)
            .map(|(oid, _)| *oid)
            .collect())
    }
}

impl ChunkSink for RamPool {
    fn insert(&self, chunk: &Chunk) -> Result<()> {
        let payload = Stashed {
            kind: chunk.kind(),
            data: chunk.data()?.to_vec(),
        };
        self.chunks.borrow_mut().entry(*chunk.oid()).or_insert(payload);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
