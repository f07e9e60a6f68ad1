// Chunk framing.

//! Reading and writing chunks as framed records.
//!
//! Each chunk is written with a header:
//!
//! ```text
//!  offset  length  field
//!       0      16  chunk-magic
//!      16       4  payload length, the amount stored in the file
//!      20       4  uncompressed length, or -1 for not compressed
//!      24       4  kind
//!      28      20  sha1 of kind + uncompressed-data
//!      48    plen  payload
//!             0-15 padding
//! ```
//!
//! The numbers are always represented in little endian, and the whole
//! chunk is padded to a multiple of 16 bytes.

use crate::Chunk;
use crate::Error;
use crate::Kind;
use crate::Oid;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{ErrorKind, Read, Write};

pub const CHUNK_MAGIC: &[u8; 16] = b"adump-pool-v1.1\n";

pub const HEADER_LEN: usize = 48;

/// The number of padding bytes that follow a payload of the given
/// size.
pub fn pad_len(payload_len: u32) -> u32 {
    15 & payload_len.wrapping_neg()
}

pub trait ChunkWrite {
    /// Write the chunk, and its padding, returning the total number of
    /// bytes written.
    fn write_chunk(&mut self, chunk: &Chunk) -> Result<u32>;
}

impl<T: Write> ChunkWrite for T {
    fn write_chunk(&mut self, chunk: &Chunk) -> Result<u32> {
        let (clen, ulen, payload) = match chunk.zdata() {
            Some(zdata) => (zdata.len() as u32, chunk.data_len(), zdata),
            None => (chunk.data_len(), 0xFFFF_FFFF, chunk.data()?),
        };

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.write_all(CHUNK_MAGIC)?;
        header.write_u32::<LittleEndian>(clen)?;
        header.write_u32::<LittleEndian>(ulen)?;
        header.write_all(&chunk.kind().bytes())?;
        header.write_all(&chunk.oid().0)?;

        self.write_all(&header)?;
        self.write_all(payload)?;

        let pad = pad_len(clen);
        if pad > 0 {
            self.write_all(&vec![0u8; pad as usize])?;
        }
        Ok(HEADER_LEN as u32 + clen + pad)
    }
}

/// The decoded fixed-size header that precedes every chunk payload.
pub struct ChunkHeader {
    pub kind: Kind,
    pub oid: Oid,
    /// Bytes of payload stored in the stream.
    pub payload_len: u32,
    /// Uncompressed length, or `0xFFFF_FFFF` when the payload is
    /// stored uncompressed.
    pub data_len: u32,
}

/// Read and validate one chunk header.
pub fn read_header<R: Read + ?Sized>(rd: &mut R) -> Result<ChunkHeader> {
    let mut header = [0u8; HEADER_LEN];
    read_fully(rd, &mut header)?;

    let mut header = &header[..];

    let mut magic = [0u8; 16];
    header.read_exact(&mut magic)?;
    if &magic != CHUNK_MAGIC {
        return Err(Error::BadMagic);
    }
    let payload_len = header.read_u32::<LittleEndian>()?;
    let data_len = header.read_u32::<LittleEndian>()?;

    let mut kind = [0u8; 4];
    header.read_exact(&mut kind)?;
    let kind = String::from_utf8(kind.to_vec())?;
    let kind = Kind::new(&kind)?;

    let mut oid = [0u8; 20];
    header.read_exact(&mut oid)?;
    let oid = Oid::from_raw(&oid);

    Ok(ChunkHeader {
        kind,
        oid,
        payload_len,
        data_len,
    })
}

pub trait ChunkRead {
    /// Read a chunk from the stream.  The padding is left unconsumed;
    /// the returned count tells the caller how many pad bytes to
    /// discard to reach the next chunk.
    fn read_chunk(&mut self) -> Result<(Chunk, u32)>;
}

impl<T: Read> ChunkRead for T {
    fn read_chunk(&mut self) -> Result<(Chunk, u32)> {
        let header = read_header(self)?;

        let mut payload = vec![0u8; header.payload_len as usize];
        if header.payload_len > 0 {
            read_fully(self, &mut payload)?;
        }

        let chunk = if header.data_len == 0xFFFF_FFFF {
            // The OID comes from the header; it is not recomputed.
            Chunk::new_plain_with_oid(header.kind, header.oid, payload)
        } else {
            Chunk::new_compressed(header.kind, header.oid, payload, header.data_len)
        };

        Ok((chunk, pad_len(header.payload_len)))
    }
}

// Like read_exact, but truncation is a ShortRead, not a raw I/O error.
fn read_fully<R: Read + ?Sized>(rd: &mut R, buf: &mut [u8]) -> Result<()> {
    match rd.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::ShortRead),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Discard the padding after a chunk from a sequential reader.
pub fn skip_pad<R: Read>(rd: &mut R, pad: u32) -> Result<()> {
    if pad > 0 {
        let mut buf = [0u8; 16];
        read_fully(rd, &mut buf[..pad as usize])?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{self, boundary_sizes};
    use std::io::Cursor;

    #[test]
    fn test_framing() {
        for size in boundary_sizes() {
            let ch = testutil::make_random_chunk(size, size);

            let mut buf = Vec::new();
            let total = buf.write_chunk(&ch).unwrap();
            assert_eq!(total as usize, buf.len());
            assert_eq!(buf.len() % 16, 0);

            let mut rd = Cursor::new(&buf[..]);
            let (ch2, pad) = rd.read_chunk().unwrap();
            assert_eq!(ch.kind(), ch2.kind());
            assert_eq!(ch.oid(), ch2.oid());
            assert_eq!(ch.data_len(), ch2.data_len());
            assert_eq!(ch.data().unwrap(), ch2.data().unwrap());

            // The pad should be exactly what remains, and all zeros.
            let rest = &buf[rd.position() as usize..];
            assert_eq!(rest.len(), pad as usize);
            assert!(rest.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_stream() {
        let mut buf = Vec::new();
        for size in boundary_sizes() {
            let ch = testutil::make_random_chunk(size, size);
            buf.write_chunk(&ch).unwrap();
        }

        let mut rd = Cursor::new(&buf[..]);
        for size in boundary_sizes() {
            let ch1 = testutil::make_random_chunk(size, size);
            let (ch2, pad) = rd.read_chunk().unwrap();
            skip_pad(&mut rd, pad).unwrap();
            assert_eq!(ch1.oid(), ch2.oid());
            assert_eq!(ch1.kind(), ch2.kind());
            assert_eq!(ch1.data_len(), ch2.data_len());
            assert_eq!(ch1.data().unwrap(), ch2.data().unwrap());
        }
        assert_eq!(rd.position() as usize, buf.len());
    }

    #[test]
    fn test_bad_magic() {
        let ch = testutil::make_random_chunk(128, 1);
        let mut buf = Vec::new();
        buf.write_chunk(&ch).unwrap();
        buf[0] ^= 0xff;

        match Cursor::new(&buf[..]).read_chunk() {
            Err(Error::BadMagic) => (),
            _ => panic!("Corrupt magic should not read"),
        }
    }

    #[test]
    fn test_truncated() {
        let ch = testutil::make_random_chunk(4096, 2);
        let mut buf = Vec::new();
        buf.write_chunk(&ch).unwrap();
        buf.truncate(60);

        match Cursor::new(&buf[..]).read_chunk() {
            Err(Error::ShortRead) => (),
            _ => panic!("Truncated chunk should not read"),
        }
    }
}
