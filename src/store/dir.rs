// Directory writer.

use crate::oid::OID_LEN;
use crate::pool::ChunkSink;
use crate::store::indirect::IndirectWriter;
use crate::Chunk;
use crate::Kind;
use crate::Oid;
use crate::Result;
use std::mem;

/// Streams the `(name, oid)` entries of a directory into `dir ` chunks
/// (note the trailing space in the kind), which are linked together by
/// a `dir`-prefixed indirect tree.
pub struct DirWriter<'a> {
    sink: &'a dyn ChunkSink,
    ind: IndirectWriter<'a>,
    limit: usize,

    current: Vec<u8>,
}

impl<'a> DirWriter<'a> {
    /// Build a writer for the contents of one directory.  The limit is
    /// the maximum number of bytes in a given directory chunk.
    pub fn new(sink: &'a dyn ChunkSink, limit: usize) -> DirWriter<'a> {
        DirWriter {
            sink,
            ind: IndirectWriter::new(sink, "dir", limit),
            limit,
            current: Vec::with_capacity(limit),
        }
    }

    /// Append an entry.  Entries must be added in the order they should
    /// appear in the backup.
    pub fn add(&mut self, name: &str, child: &Oid) -> Result<()> {
        let name = name.as_bytes();
        let entry_len = 2 + name.len() + OID_LEN;

        if self.current.len() + entry_len > self.limit {
            self.ship()?;
        }

        self.current.push((name.len() >> 8) as u8);
        self.current.push(name.len() as u8);
        self.current.extend_from_slice(name);
        self.current.extend_from_slice(&child.0);
        Ok(())
    }

    /// Ship the final partial block and return the root OID of the
    /// directory stream.
    pub fn finalize(mut self) -> Result<Oid> {
        self.ship()?;
        self.ind.finalize()
    }

    fn ship(&mut self) -> Result<()> {
        if self.current.is_empty() {
            return Ok(());
        }

        let buf = mem::replace(&mut self.current, Vec::with_capacity(self.limit));
        let ch = Chunk::new_plain(Kind::new("dir ")?, buf);
        self.sink.insert(&ch)?;
        self.ind.add(ch.oid())
    }
}
