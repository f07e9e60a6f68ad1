// Segment file indices.

//! OID lookup tables for the legacy append-only segment files.  A
//! `RamIndex` accumulates entries as chunks are written; `FileIndex`
//! is the sorted on-disk form; `IndexPair` layers fresh RAM entries
//! over a loaded file so a segment can keep growing.

use crate::Kind;
use crate::Oid;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter::Chain;

pub use self::file_index::FileIndex;

pub mod file_index;

/// A lookup index over the chunks of one segment file.
pub trait Index {
    fn contains_key(&self, key: &Oid) -> bool;
    fn get(&self, key: &Oid) -> Option<IndexInfo>;
}

pub trait IndexUpdate {
    /// Like a map insert, but panics if the key is already present.
    fn insert(&mut self, key: Oid, offset: u32, kind: Kind);
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub offset: u32,
    /// Version 2 index files carry no kind information.
    pub kind: Option<Kind>,
}

/// In-memory index.
pub struct RamIndex(pub BTreeMap<Oid, IndexInfo>);

impl RamIndex {
    pub fn new() -> RamIndex {
        RamIndex(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RamIndex {
    fn default() -> RamIndex {
        RamIndex::new()
    }
}

impl Index for RamIndex {
    fn contains_key(&self, key: &Oid) -> bool {
        self.0.contains_key(key)
    }

    fn get(&self, key: &Oid) -> Option<IndexInfo> {
        self.0.get(key).cloned()
    }
}

impl IndexUpdate for RamIndex {
    fn insert(&mut self, key: Oid, offset: u32, kind: Kind) {
        match self.0.insert(key,
                            IndexInfo {
                                offset,
                                kind: Some(kind),
                            }) {
            None => (),
            Some(_) => panic!("Duplicate key inserted into index"),
        }
    }
}

pub struct IterItem<'a> {
    pub oid: &'a Oid,
    pub kind: Option<Kind>,
    pub offset: u32,
}

impl<'a> IntoIterator for &'a RamIndex {
    type Item = IterItem<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.0.iter())
    }
}

pub struct Iter<'a>(btree_map::Iter<'a, Oid, IndexInfo>);

impl<'a> Iterator for Iter<'a> {
    type Item = IterItem<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(oid, info)| IterItem {
            oid,
            kind: info.kind,
            offset: info.offset,
        })
    }
}

/// An IndexPair combines a possibly loaded index with a RAM index
/// allowing for update.  The whole pair can then be written to a new
/// index file, and loaded later.
pub struct IndexPair {
    file: FileIndex,
    ram: RamIndex,
}

impl IndexPair {
    pub fn load<P: AsRef<std::path::Path>>(path: P, size: u32) -> crate::Result<IndexPair> {
        Ok(IndexPair {
            file: FileIndex::load(path, size)?,
            ram: RamIndex::new(),
        })
    }

    pub fn empty() -> IndexPair {
        IndexPair {
            file: FileIndex::empty(),
            ram: RamIndex::new(),
        }
    }
}

impl Index for IndexPair {
    fn contains_key(&self, key: &Oid) -> bool {
        self.ram.contains_key(key) || self.file.contains_key(key)
    }

    fn get(&self, key: &Oid) -> Option<IndexInfo> {
        self.ram.get(key).or_else(|| self.file.get(key))
    }
}

impl IndexUpdate for IndexPair {
    fn insert(&mut self, key: Oid, offset: u32, kind: Kind) {
        self.ram.insert(key, offset, kind);
    }
}

impl<'a> IntoIterator for &'a IndexPair {
    type Item = IterItem<'a>;
    type IntoIter = Chain<file_index::Iter<'a>, Iter<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.file.iter().chain(&self.ram)
    }
}
