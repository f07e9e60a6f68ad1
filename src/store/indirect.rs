// Indirect block management.

//! Items that span more than a single chunk are written as multiple
//! chunks, with indirect chunks naming all of them.  The indirect
//! chunks work somewhat like a Merkle tree (which, because of the
//! hash-addressed storage, can also be used to find the data).
//!
//! Level 0 accumulates the OIDs of the leaves; when a level fills, it
//! is emitted as a chunk of kind `<prefix><level>` and its own OID is
//! pushed into the level above.

use crate::oid::OID_LEN;
use crate::pool::ChunkSink;
use crate::Chunk;
use crate::Kind;
use crate::Oid;
use crate::Result;
use log::trace;
use std::mem;

pub struct IndirectWriter<'a> {
    sink: &'a dyn ChunkSink,

    // Three character prefix for the indirect block kinds, "ind" for
    // file data and "dir" for directories.
    prefix: String,

    // Byte limit for each indirect block.
    limit: usize,

    // One buffer of concatenated OIDs per level; index 0 is the leaf
    // level.
    tree: Vec<Vec<u8>>,
}

impl<'a> IndirectWriter<'a> {
    pub fn new<'b>(sink: &'b dyn ChunkSink, prefix: &str, limit: usize) -> IndirectWriter<'b> {
        if prefix.as_bytes().len() != 3 {
            panic!("prefix must be 3 bytes");
        }

        IndirectWriter {
            sink,
            prefix: prefix.to_owned(),
            limit: (limit / OID_LEN) * OID_LEN,
            tree: Vec::new(),
        }
    }

    /// Record the given OID.  It will be added to a level 0 indirect
    /// block.
    pub fn add(&mut self, oid: &Oid) -> Result<()> {
        self.push(oid, 0)
    }

    /// Collapse all pending levels and return the single OID naming
    /// everything added.  With nothing added, an empty `null` chunk is
    /// written and its OID returned.
    pub fn finalize(&mut self) -> Result<Oid> {
        if self.tree.is_empty() {
            let ch = Chunk::new_plain(Kind::new("null")?, vec![]);
            self.sink.insert(&ch)?;
            return Ok(*ch.oid());
        }

        // Flush out all of the levels.  It is important to re-check the
        // length each time, since the tree can grow as it is purged.
        let mut level = 0;
        while level < self.tree.len() {
            self.room(level, true)?;
            level += 1;
        }

        let top = &self.tree[self.tree.len() - 1];
        Ok(Oid::from_raw(&top[0..OID_LEN]))
    }

    fn push(&mut self, oid: &Oid, level: usize) -> Result<()> {
        trace!("add: {} (level={})", oid.to_hex(), level);
        self.room(level, false)?;
        self.tree[level].extend_from_slice(&oid.0);
        Ok(())
    }

    // Ensure there is room to add an OID at the given level.  If
    // `purge` is set, flush down to a single node (two for the top
    // level, which must not collapse to a lone indirect block).
    fn room(&mut self, level: usize, purge: bool) -> Result<()> {
        if level >= self.tree.len() {
            self.tree.push(Vec::with_capacity(self.limit));
        }

        let llimit = if purge {
            if level == self.tree.len() - 1 {
                2 * OID_LEN
            } else {
                OID_LEN
            }
        } else {
            self.limit
        };

        if self.tree[level].len() >= llimit {
            let buf = mem::replace(&mut self.tree[level], Vec::with_capacity(self.limit));
            let kind = Kind::new(&format!("{}{}", self.prefix, level))?;
            let ch = Chunk::new_plain(kind, buf);
            trace!("emit {}: {}", kind, ch.oid().to_hex());
            self.sink.insert(&ch)?;

            let id = *ch.oid();
            self.push(&id, level + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::oid::OID_LEN;
    use crate::pool::{ChunkSink, ChunkSource, RamPool};
    use crate::store::walk::{walk, Visitor};
    use crate::Chunk;
    use crate::Kind;
    use crate::Oid;
    use crate::Result;

    // Generate a chunk containing integer data.
    fn integer_chunk(index: u32) -> Chunk {
        Chunk::new_plain(Kind::new("blob").unwrap(), format!("{}", index).into_bytes())
    }

    struct InOrder {
        next: u32,
    }

    impl Visitor for InOrder {
        fn blob(&mut self, chunk: &Chunk) -> Result<()> {
            self.next += 1;
            assert_eq!(chunk.oid(), integer_chunk(self.next).oid());
            Ok(())
        }
    }

    #[test]
    fn indirect() {
        let pool = RamPool::new();
        let mut ind = IndirectWriter::new(&pool, "ind", OID_LEN * 5);

        for i in 1..500 {
            let ch = integer_chunk(i);
            pool.insert(&ch).unwrap();
            ind.add(ch.oid()).unwrap();
        }
        let top = ind.finalize().unwrap();

        // Walk the result, making sure every blob appears, in order.
        let mut visit = InOrder { next: 0 };
        walk(&pool, &top, &mut visit).unwrap();
        assert_eq!(visit.next, 499);
    }

    #[test]
    fn single() {
        // One entry collapses to the entry itself, with no indirect
        // blocks at all.
        let pool = RamPool::new();
        let mut ind = IndirectWriter::new(&pool, "ind", OID_LEN * 5);

        let ch = integer_chunk(1);
        pool.insert(&ch).unwrap();
        ind.add(ch.oid()).unwrap();
        let top = ind.finalize().unwrap();
        assert_eq!(&top, ch.oid());
    }

    #[test]
    fn empty() {
        let pool = RamPool::new();
        let mut ind = IndirectWriter::new(&pool, "ind", OID_LEN * 5);
        let top = ind.finalize().unwrap();

        let ch = pool.search(&top).unwrap();
        assert_eq!(ch.kind(), Kind::new("null").unwrap());
        assert_eq!(ch.data_len(), 0);
    }

    #[test]
    fn levels_deep() {
        // Force several levels of indirection and spot-check the root
        // kind.
        let pool = RamPool::new();
        let mut ind = IndirectWriter::new(&pool, "ind", OID_LEN * 2);

        let mut oids: Vec<Oid> = Vec::new();
        for i in 1..50 {
            let ch = integer_chunk(i);
            pool.insert(&ch).unwrap();
            oids.push(*ch.oid());
            ind.add(ch.oid()).unwrap();
        }
        let top = ind.finalize().unwrap();
        let root = pool.search(&top).unwrap();
        let root_kind = root.kind().to_string();
        assert!(root_kind.starts_with("ind"));
        assert!(root_kind.as_bytes()[3] > b'0');

        let mut visit = InOrder { next: 0 };
        walk(&pool, &top, &mut visit).unwrap();
        assert_eq!(visit.next, 49);
    }
}
