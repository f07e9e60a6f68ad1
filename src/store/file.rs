// File data storage.

use crate::pool::ChunkSink;
use crate::store::indirect::IndirectWriter;
use crate::Chunk;
use crate::Kind;
use crate::Oid;
use crate::Result;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Writes a stream of file data into the pool as `blob` chunks linked
/// by an `ind` indirect tree.
pub struct DataWrite<'a> {
    sink: &'a dyn ChunkSink,
    limit: usize,
}

impl<'a> DataWrite<'a> {
    pub fn new(sink: &dyn ChunkSink) -> DataWrite {
        DataWrite::new_limit(sink, 256 * 1024)
    }

    pub fn new_limit(sink: &dyn ChunkSink, limit: usize) -> DataWrite {
        DataWrite { sink, limit }
    }

    /// Write all of the contents of `source` to the pool, returning
    /// the OID naming the data.
    pub fn write(&mut self, source: &mut dyn Read) -> Result<Oid> {
        let mut ind = IndirectWriter::new(self.sink, "ind", self.limit);
        loop {
            let buf = self.fill(source)?;
            if buf.is_empty() {
                break;
            }

            let ch = Chunk::new_plain(Kind::new("blob")?, buf);
            self.sink.insert(&ch)?;
            ind.add(ch.oid())?;
        }

        ind.finalize()
    }

    // Return a buffer filled with data.  Note that this will
    // potentially discard data on error.
    fn fill(&mut self, source: &mut dyn Read) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.limit];
        let mut len = 0;

        loop {
            if len == buf.len() {
                break;
            }

            match source.read(&mut buf[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(From::from(e)),
            }
        }

        buf.truncate(len);
        Ok(buf)
    }
}

/// Store a named file's contents, returning the OID of the data tree.
pub fn write_file<P: AsRef<Path>>(sink: &dyn ChunkSink, name: P) -> Result<Oid> {
    let name = name.as_ref();
    let mut file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOATIME)
        .open(name)
    {
        Ok(fd) => fd,
        // O_NOATIME is only permitted for the file's owner (or root);
        // fall back to a plain open.
        Err(_) => File::open(name)?,
    };

    DataWrite::new(sink).write(&mut file)
}
