// File-based indices.

//! A FileIndex is the on-disk mapping of OIDs to their offset (and
//! kind) within one segment file.
//!
//! ```text
//!  field      layout
//!  magic      "ldumpidx", 8 bytes
//!  version    4 bytes LE; 4 current, 2 legacy
//!  pool size  4 bytes LE, must equal the segment file length
//!  top        256 x 4 bytes LE; top[b] counts OIDs with first byte <= b
//!  oids       N x 20 bytes, sorted ascending
//!  offsets    N x 4 bytes LE, parallel to oids
//!  kinds (v4) 4 bytes LE kind count, the kind tags, N x 1 byte table
//!             indices
//! ```

use crate::Error;
use crate::Kind;
use crate::Oid;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use super::{Index, IndexInfo, IterItem};

const INDEX_MAGIC: &[u8; 8] = b"ldumpidx";

pub struct FileIndex {
    top: Vec<u32>,
    offsets: Vec<u32>,
    oids: Vec<Oid>,
    kind_names: Vec<Kind>,
    // Parallel to `oids`; empty for a version 2 file, which carries no
    // kind table.
    kinds: Vec<u8>,
}

impl FileIndex {
    /// Try loading the given named index file, returning it if it is
    /// valid and matches the segment size.
    pub fn load<P: AsRef<Path>>(path: P, size: u32) -> Result<FileIndex> {
        let f = File::open(path)?;
        let mut rd = BufReader::new(f);

        let mut magic = [0u8; 8];
        rd.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            return Err(Error::InvalidIndex("bad magic".to_owned()));
        }

        let version = rd.read_u32::<LittleEndian>()?;
        if version != 2 && version != 4 {
            return Err(Error::InvalidIndex(format!("unsupported version {}", version)));
        }

        let file_size = rd.read_u32::<LittleEndian>()?;
        if file_size != size {
            // The index describes a different segment length; the
            // caller should regenerate it.
            return Err(Error::InvalidIndex("index size mismatch".to_owned()));
        }

        let mut top = Vec::with_capacity(256);
        for _ in 0..256 {
            top.push(rd.read_u32::<LittleEndian>()?);
        }

        let count = match top.last() {
            Some(&n) => n as usize,
            None => unreachable!(),
        };

        let mut oid_buf = [0u8; 20];
        let mut oids = Vec::with_capacity(count);
        for _ in 0..count {
            rd.read_exact(&mut oid_buf)?;
            oids.push(Oid::from_raw(&oid_buf));
        }

        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(rd.read_u32::<LittleEndian>()?);
        }

        let (kind_names, kinds) = if version >= 4 {
            let kind_count = rd.read_u32::<LittleEndian>()? as usize;
            let mut kind_names = Vec::with_capacity(kind_count);
            for _ in 0..kind_count {
                let mut kind_buf = [0u8; 4];
                rd.read_exact(&mut kind_buf)?;
                let text = String::from_utf8(kind_buf.to_vec())?;
                kind_names.push(Kind::new(&text)?);
            }

            let mut kinds = vec![0u8; count];
            rd.read_exact(&mut kinds)?;

            for &k in &kinds {
                if k as usize >= kind_names.len() {
                    return Err(Error::InvalidIndex("kind index out of range".to_owned()));
                }
            }

            (kind_names, kinds)
        } else {
            (vec![], vec![])
        };

        Ok(FileIndex {
            top,
            offsets,
            oids,
            kind_names,
            kinds,
        })
    }

    /// Construct an empty index, that contains no values.
    pub fn empty() -> FileIndex {
        FileIndex {
            top: vec![0; 256],
            offsets: vec![],
            oids: vec![],
            kind_names: vec![],
            kinds: vec![],
        }
    }

    /// Save an index from something that can be iterated over.  The
    /// write goes through a `.tmp` file and an atomic rename, so a
    /// half-written index is never left under the real name.
    pub fn save<'a, P: AsRef<Path>, I>(path: P, size: u32, index: I) -> Result<()>
        where I: IntoIterator<Item = IterItem<'a>>
    {
        let mut nodes: Vec<IterItem<'a>> = index.into_iter().collect();
        nodes.sort_by_key(|n| n.oid);
        let nodes = nodes;

        let tmp_name = tmpify(path.as_ref())?;
        {
            let ofd = File::create(&tmp_name)?;
            let mut ofd = BufWriter::new(ofd);

            ofd.write_all(INDEX_MAGIC)?;
            ofd.write_u32::<LittleEndian>(4)?;
            ofd.write_u32::<LittleEndian>(size)?;

            // Write the top-level index.
            let top = compute_top(&nodes);
            for elt in top {
                ofd.write_u32::<LittleEndian>(elt)?;
            }

            // Write out the hashes themselves.
            for n in &nodes {
                ofd.write_all(&n.oid.0)?;
            }

            // Write out the offset table.
            for n in &nodes {
                ofd.write_u32::<LittleEndian>(n.offset)?;
            }

            // Compute the kind map.
            let mut kinds = vec![];
            let mut kind_map = BTreeMap::new();
            for n in &nodes {
                let kind = match n.kind {
                    Some(kind) => kind,
                    None => {
                        return Err(Error::InvalidIndex("entry without a kind".to_owned()));
                    }
                };
                if !kind_map.contains_key(&kind) {
                    kind_map.insert(kind, kinds.len());
                    kinds.push(kind);
                }
            }

            // Write out the kind map itself.
            ofd.write_u32::<LittleEndian>(kinds.len() as u32)?;
            for &k in &kinds {
                ofd.write_all(&k.bytes())?;
            }

            // Then write out the values.
            let mut buf = Vec::with_capacity(nodes.len());
            for n in &nodes {
                match n.kind {
                    Some(kind) => buf.push(kind_map[&kind] as u8),
                    None => unreachable!(),
                }
            }
            ofd.write_all(&buf)?;
        }

        fs::rename(tmp_name, path.as_ref())?;

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    // Scan this index for a given hash.
    fn find(&self, key: &Oid) -> Option<usize> {
        let first_byte = key.0[0] as usize;

        let low = if first_byte > 0 {
            self.top[first_byte - 1] as usize
        } else {
            0
        };
        let high = self.top[first_byte] as usize;
        match self.oids[low..high].binary_search(key) {
            Ok(index) => Some(index + low),
            Err(_) => None,
        }
    }

    fn kind_of(&self, num: usize) -> Option<Kind> {
        if self.kinds.is_empty() {
            None
        } else {
            Some(self.kind_names[self.kinds[num] as usize])
        }
    }

    pub fn iter(&self) -> Iter {
        self.into_iter()
    }
}

impl Index for FileIndex {
    fn contains_key(&self, key: &Oid) -> bool {
        self.find(key).is_some()
    }

    fn get(&self, key: &Oid) -> Option<IndexInfo> {
        self.find(key).map(|num| IndexInfo {
            offset: self.offsets[num],
            kind: self.kind_of(num),
        })
    }
}

impl<'a> IntoIterator for &'a FileIndex {
    type Item = IterItem<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter {
            parent: self,
            pos: 0,
        }
    }
}

pub struct Iter<'a> {
    parent: &'a FileIndex,
    pos: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = IterItem<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.parent.len() {
            None
        } else {
            let pos = self.pos;
            self.pos = pos + 1;

            Some(IterItem {
                oid: &self.parent.oids[pos],
                kind: self.parent.kind_of(pos),
                offset: self.parent.offsets[pos],
            })
        }
    }
}

fn compute_top(nodes: &[IterItem]) -> Vec<u32> {
    let mut top = Vec::with_capacity(256);

    let mut iter = nodes.iter().enumerate().peekable();
    for first in 0..256 {
        // Scan until we hit a value that is too large.
        loop {
            match iter.peek() {
                None => break,
                Some(&(_, key)) => {
                    if key.oid.0[0] as usize > first {
                        break;
                    }
                    iter.next();
                }
            }
        }
        let index = match iter.peek() {
            None => nodes.len(),
            Some(&(n, _)) => n,
        };
        top.push(index as u32);
    }
    top
}

// Given a filename, generate another with a ".tmp" suffix, if
// possible.
fn tmpify(path: &Path) -> Result<PathBuf> {
    let base = path.file_name()
        .ok_or_else(|| Error::PathError(format!("path does not have a filename {:?}", path)))?;

    let base = base.to_str()
        .ok_or_else(|| Error::PathError(format!("path isn't valid UTF-8 {:?}", path)))?;

    let tmp = format!("{}.tmp", base);
    Ok(path.with_file_name(&tmp))
}
