// Legacy segment files.

//! The older pool format stores chunks end-to-end in append-only
//! `.data` segment files, each with a sidecar `.idx` index.  This
//! module gives read access to such a segment: it loads the index,
//! regenerating it by scanning the chunk headers when it is missing or
//! does not match the segment length, and reads chunks back by OID.

use crate::chunkio::{self, pad_len, ChunkRead};
use crate::pool::index::{FileIndex, Index, IndexInfo, IndexUpdate, RamIndex};
use crate::Chunk;
use crate::Error;
use crate::Oid;
use crate::Result;
use log::info;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub struct SegmentFile {
    data_path: PathBuf,
    index: FileIndex,
}

impl SegmentFile {
    /// Open the segment at `<base>.data`, with its index at
    /// `<base>.idx`.
    pub fn open<P: AsRef<Path>>(data_path: P) -> Result<SegmentFile> {
        let data_path = data_path.as_ref().to_path_buf();
        let index_path = data_path.with_extension("idx");

        let meta = std::fs::metadata(&data_path)?;
        if meta.len() > 0x7fff_ffff {
            return Err(Error::InvalidIndex("segment file larger than 2 GiB".to_owned()));
        }
        let size = meta.len() as u32;

        let index = match FileIndex::load(&index_path, size) {
            Ok(index) => index,
            Err(Error::Io(_)) | Err(Error::InvalidIndex(_)) => {
                info!("Regenerating index for {:?}", data_path);
                regenerate(&data_path, &index_path, size)?
            }
            Err(e) => return Err(e),
        };

        Ok(SegmentFile { data_path, index })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key(&self, key: &Oid) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &Oid) -> Option<IndexInfo> {
        self.index.get(key)
    }

    /// Read the chunk with the given OID out of the segment.
    pub fn read(&self, key: &Oid) -> Result<Chunk> {
        let info = match self.index.get(key) {
            Some(info) => info,
            None => return Err(Error::MissingChunk),
        };

        let mut fd = File::open(&self.data_path)?;
        fd.seek(SeekFrom::Start(info.offset as u64))?;
        let (chunk, _pad) = fd.read_chunk()?;
        Ok(chunk)
    }
}

// Scan the chunk headers of the segment, rebuilding and rewriting the
// index.  Only the headers are decoded; the payloads are skipped.
fn regenerate(data_path: &Path, index_path: &Path, size: u32) -> Result<FileIndex> {
    let fd = File::open(data_path)?;
    let mut rd = BufReader::new(fd);

    let mut ri = RamIndex::new();
    let mut pos: u32 = 0;
    while pos < size {
        let header = match chunkio::read_header(&mut rd) {
            Ok(header) => header,
            // A clean EOF means a truncated final chunk; everything
            // before it is still indexed.
            Err(Error::ShortRead) => break,
            Err(e) => return Err(e),
        };

        ri.insert(header.oid, pos, header.kind);

        let skip = header.payload_len + pad_len(header.payload_len);
        rd.seek_relative(skip as i64)?;
        pos += chunkio::HEADER_LEN as u32 + skip;
    }

    FileIndex::save(index_path, size, &ri)?;
    FileIndex::load(index_path, size)
}
