// Backup tree traversal.

//! Walking a backup tree.
//!
//! [`walk`] reads a chunk from the pool, dispatches on its kind, and
//! recursively descends, invoking the callbacks of a [`Visitor`].  Any
//! of the descent-starting callbacks may return [`Visit::Prune`] to
//! skip the children of the current chunk; the matching `leave`/`close`
//! callback still fires so that visitor state stays balanced.

use crate::pool::ChunkSource;
use crate::store::props::PropertyMap;
use crate::Chunk;
use crate::Error;
use crate::Oid;
use crate::Result;
use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What a visitor callback wants done with the children of the current
/// chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Prune,
}

pub type VisitResult = Result<Visit>;

/// The callbacks invoked during a walk.  Everything defaults to a
/// no-op; implementations override what they care about.
pub trait Visitor {
    /// Called with the OID of every chunk about to be visited, before
    /// it is read from the pool.  Prune skips the chunk entirely.
    fn early_visit(&mut self, _oid: &Oid) -> VisitResult {
        Ok(Visit::Continue)
    }

    /// Called with every chunk read during the walk, before it is
    /// dispatched.
    fn chunk(&mut self, _chunk: &Chunk) -> VisitResult {
        Ok(Visit::Continue)
    }

    /// A backup root.  `date` is the time the backup was taken, in
    /// nanoseconds since the epoch; `props` holds the remaining
    /// properties, including `hash` and `fsuuid`.
    fn back(&mut self, _root: &Oid, _date: i64, _props: &BTreeMap<String, String>) -> VisitResult {
        Ok(Visit::Continue)
    }

    /// Entering a directory node.  Pruning skips the children, but
    /// `leave` is still called.
    fn enter(&mut self, _props: &PropertyMap) -> VisitResult {
        Ok(Visit::Continue)
    }

    fn leave(&mut self, _props: &PropertyMap) -> Result<()> {
        Ok(())
    }

    /// Opening a regular file node.  Pruning skips the data, but
    /// `close` is still called.
    fn open(&mut self, _props: &PropertyMap) -> VisitResult {
        Ok(Visit::Continue)
    }

    fn close(&mut self, _props: &PropertyMap) -> Result<()> {
        Ok(())
    }

    /// Any other filesystem node (symlink, device, fifo, socket).
    fn node(&mut self, _props: &PropertyMap) -> Result<()> {
        Ok(())
    }

    /// A piece of file data.
    fn blob(&mut self, _chunk: &Chunk) -> Result<()> {
        Ok(())
    }

    /// Path maintenance, called around each directory entry.
    fn push_path(&mut self, _name: &str) {}
    fn pop_path(&mut self) {}
}

/// Tracks the name components of the walk, for visitors that need to
/// know where they are.
pub struct PathTracker {
    parts: Vec<String>,
}

impl PathTracker {
    pub fn new() -> PathTracker {
        PathTracker { parts: Vec::new() }
    }

    pub fn push(&mut self, name: &str) {
        self.parts.push(name.to_owned());
    }

    pub fn pop(&mut self) {
        self.parts.pop();
    }

    /// The current path, rooted at `base`.
    pub fn path(&self, base: &Path) -> PathBuf {
        let mut result = base.to_path_buf();
        for part in &self.parts {
            result.push(part);
        }
        result
    }
}

impl Default for PathTracker {
    fn default() -> PathTracker {
        PathTracker::new()
    }
}

/// Walk the tree rooted at `oid`, dispatching to the visitor.
pub fn walk<V: Visitor + ?Sized>(pool: &dyn ChunkSource, oid: &Oid, visit: &mut V) -> Result<()> {
    if visit.early_visit(oid)? == Visit::Prune {
        return Ok(());
    }

    let chunk = pool.search(oid)?;
    if visit.chunk(&chunk)? == Visit::Prune {
        return Ok(());
    }

    let kind = chunk.kind().bytes();
    match &kind {
        b"back" => back_chunk(pool, &chunk, visit),
        b"node" => node_chunk(pool, &chunk, visit),
        b"dir " => dir_chunk(pool, &chunk, visit),
        b"blob" => visit.blob(&chunk),
        b"null" => Ok(()),
        _ if is_indirect(&kind) => indirect_chunk(pool, &chunk, visit),
        _ => {
            // Don't fail the walk over a chunk kind from the future.
            warn!("Unsupported chunk kind {:?} at {}", chunk.kind().to_string(), oid.to_hex());
            Ok(())
        }
    }
}

// The indirect levels: ind0-ind3 for file data, dir0-dir2 for
// directories ("dir " itself is dispatched earlier).
fn is_indirect(kind: &[u8; 4]) -> bool {
    (kind.starts_with(b"ind") || kind.starts_with(b"dir")) && kind[3].is_ascii_digit()
}

fn back_chunk<V: Visitor + ?Sized>(pool: &dyn ChunkSource, chunk: &Chunk, visit: &mut V)
                                   -> Result<()> {
    let pmap = PropertyMap::decode(chunk.data()?)?;
    let mut props = pmap.props;

    let date = match props.remove("_date") {
        Some(text) => {
            // Milliseconds since the epoch.
            let ms: i64 = text.parse().map_err(|_| {
                Error::BadProperties(format!("invalid _date property {:?}", text))
            })?;
            ms * 1_000_000
        }
        None => {
            return Err(Error::BadProperties(format!("backup record {} has no _date",
                                                    chunk.oid().to_hex())))
        }
    };

    if visit.back(chunk.oid(), date, &props)? == Visit::Prune {
        return Ok(());
    }

    let hash = match props.get("hash") {
        Some(text) => Oid::from_hex(text)?,
        None => {
            return Err(Error::BadProperties(format!("backup record {} has no hash",
                                                    chunk.oid().to_hex())))
        }
    };
    walk(pool, &hash, visit)
}

fn node_chunk<V: Visitor + ?Sized>(pool: &dyn ChunkSource, chunk: &Chunk, visit: &mut V)
                                   -> Result<()> {
    let pmap = PropertyMap::decode(chunk.data()?)?;

    match &pmap.kind[..] {
        "DIR" => {
            if visit.enter(&pmap)? == Visit::Continue {
                let children = pmap.get_oid("children")?;
                walk(pool, &children, visit)?;
            }
            visit.leave(&pmap)
        }
        "REG" => {
            if visit.open(&pmap)? == Visit::Continue {
                let data = pmap.get_oid("data")?;
                walk(pool, &data, visit)?;
            }
            visit.close(&pmap)
        }
        _ => visit.node(&pmap),
    }
}

fn dir_chunk<V: Visitor + ?Sized>(pool: &dyn ChunkSource, chunk: &Chunk, visit: &mut V)
                                  -> Result<()> {
    let data = chunk.data()?;
    let mut pos = 0;

    while pos < data.len() {
        if pos + 2 > data.len() {
            return Err(Error::ShortRead);
        }
        let name_len = ((data[pos] as usize) << 8) | data[pos + 1] as usize;
        pos += 2;

        if pos + name_len + 20 > data.len() {
            return Err(Error::ShortRead);
        }
        let name = String::from_utf8(data[pos..pos + name_len].to_vec())?;
        pos += name_len;

        let child = Oid::from_raw(&data[pos..pos + 20]);
        pos += 20;

        visit.push_path(&name);
        let result = walk(pool, &child, visit);
        visit.pop_path();
        result?;
    }
    Ok(())
}

fn indirect_chunk<V: Visitor + ?Sized>(pool: &dyn ChunkSource, chunk: &Chunk, visit: &mut V)
                                       -> Result<()> {
    let data = chunk.data()?;
    if data.len() % 20 != 0 {
        return Err(Error::ShortRead);
    }

    for piece in data.chunks(20) {
        let child = Oid::from_raw(piece);
        walk(pool, &child, visit)?;
    }
    Ok(())
}
