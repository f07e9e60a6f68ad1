// Backup chunks.

use crate::kind::Kind;
use crate::oid::Oid;
use crate::zlib;
use crate::Error;
use crate::Result;
use once_cell::sync::OnceCell;

/// A `Chunk` is a single unit of backup.  It has a 'kind', which is a
/// 4-byte identifier, and 0 or more bytes of data, and is identified by
/// the SHA-1 hash of the kind followed by the data.  A chunk holds its
/// payload in either compressed or uncompressed form; the other form is
/// computed on demand, at most once, and kept.
pub struct Chunk {
    kind: Kind,
    oid: Oid,
    data_len: u32,

    // At least one of these is populated at construction.  The inner
    // None in `zdata` records that compression has been tried and did
    // not help.
    data: OnceCell<Vec<u8>>,
    zdata: OnceCell<Option<Vec<u8>>>,
}

impl Chunk {
    /// Construct a new chunk out of some uncompressed data.
    pub fn new_plain(kind: Kind, data: Vec<u8>) -> Chunk {
        let oid = Oid::from_data(kind, &data[..]);
        Chunk::new_plain_with_oid(kind, oid, data)
    }

    /// Construct a chunk from uncompressed data whose OID is already
    /// known (pool reads, framing reads).  The hash is not recomputed.
    pub fn new_plain_with_oid(kind: Kind, oid: Oid, data: Vec<u8>) -> Chunk {
        let dlen = data.len();
        assert!(dlen <= 0x7fffffff);
        let cell = OnceCell::new();
        let _ = cell.set(data);
        Chunk {
            kind,
            oid,
            data_len: dlen as u32,
            data: cell,
            zdata: OnceCell::new(),
        }
    }

    /// Construct a new chunk out of the compressed representation.  The
    /// `data_len` must match the size of `zdata` when it is inflated,
    /// and the `oid` must match the hash of the uncompressed chunk.
    pub fn new_compressed(kind: Kind, oid: Oid, zdata: Vec<u8>, data_len: u32) -> Chunk {
        let cell = OnceCell::new();
        let _ = cell.set(Some(zdata));
        Chunk {
            kind,
            oid,
            data_len,
            data: OnceCell::new(),
            zdata: cell,
        }
    }

    /// Return the kind associated with this chunk.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Return the Oid identifying this chunk.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Return the length of the uncompressed data.
    pub fn data_len(&self) -> u32 {
        self.data_len
    }

    /// Return a view of the uncompressed data, inflating it on first
    /// access.  Fails if the stored compressed payload is corrupt or
    /// inflates to the wrong length.
    pub fn data(&self) -> Result<&[u8]> {
        let data = self.data.get_or_try_init(|| {
            let zdata = match self.zdata.get() {
                Some(Some(zdata)) => zdata,
                _ => panic!("Improperly constructed chunk"),
            };
            let buf = zlib::inflate(&zdata[..], self.data_len as usize)?;
            if buf.len() != self.data_len as usize {
                return Err(Error::LengthMismatch);
            }
            Ok(buf)
        })?;
        Ok(&data[..])
    }

    /// Return a view of the compressed data within this chunk, if that
    /// results in a smaller block of data.  The compressor runs at most
    /// once, no matter how often this is called.
    pub fn zdata(&self) -> Option<&[u8]> {
        let zdata = self.zdata.get_or_init(|| {
            let data = match self.data.get() {
                Some(data) => data,
                None => panic!("Improperly constructed chunk"),
            };
            zlib::deflate(&data[..])
        });
        zdata.as_deref()
    }

    /// Move the uncompressed data out of the chunk.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.data()?;
        match self.data.into_inner() {
            Some(data) => Ok(data),
            None => unreachable!(),
        }
    }
}
