// Backups.

//! The backup driver.  Walks a live directory tree, encoding file
//! data and directory contents into the pool, and finishes by writing
//! a `back` chunk naming the result.
//!
//! For each regular file, the ctime cache is consulted first: when the
//! inode's ctime is unchanged from the previous backup, the recorded
//! data OID is reused and the file is never opened.

use crate::cache::{Cache, DirInfo, FileInfo};
use crate::pool::{ChunkSink, ChunkSource, SqlPool};
use crate::store::file::write_file;
use crate::store::time;
use crate::store::DirWriter;
use crate::store::PropertyMap;
use crate::Chunk;
use crate::Kind;
use crate::Oid;
use crate::Result;
use log::{info, warn};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// What a backup did, mostly of interest for progress reporting.
#[derive(Debug, Clone)]
pub struct Summary {
    /// The OID of the `back` chunk written.
    pub root: Oid,
    /// Chunks offered to the pool.
    pub chunks: u64,
    /// Uncompressed bytes offered.
    pub bytes: u64,
    /// Bytes after compression.
    pub zbytes: u64,
    /// Regular files whose data was read and chunked.
    pub files_read: u64,
    /// Regular files satisfied entirely from the ctime cache.
    pub files_reused: u64,
    /// File bytes skipped thanks to the cache.
    pub bytes_reused: u64,
}

/// Back up the tree rooted at `path` into the pool, flushing when
/// done.  `props` are recorded on the backup root, alongside `fsuuid`
/// and the date.
pub fn run<P: AsRef<Path>>(pool: &SqlPool,
                           path: P,
                           fs_uuid: &str,
                           props: &BTreeMap<String, String>)
                           -> Result<Summary> {
    let path = path.as_ref();
    info!("Backing up {:?}", path);

    let root_meta = fs::symlink_metadata(path)?;

    let sink = CountingSink::new(pool);
    let mut dumper = Dumper {
        sink: &sink,
        cache: pool.cache(fs_uuid)?,
        root_dev: root_meta.dev(),
        files_read: 0,
        files_reused: 0,
        bytes_reused: 0,
    };

    let head = dumper.directory(path, &root_meta)?;

    let mut back = PropertyMap::new("back");
    for (k, v) in props {
        back.props.insert(k.clone(), v.clone());
    }
    back.props.insert("hash".to_owned(), head.to_hex());
    back.props.insert("fsuuid".to_owned(), fs_uuid.to_owned());
    // The backup date property is in ms since the start of unix time.
    back.props.insert("_date".to_owned(), unix_ms().to_string());

    let root = dumper.write_node("back", &back)?;

    pool.flush()?;
    info!("Backup complete: {}", root.to_hex());

    Ok(Summary {
        root,
        chunks: sink.chunks.get(),
        bytes: sink.bytes.get(),
        zbytes: sink.zbytes.get(),
        files_read: dumper.files_read,
        files_reused: dumper.files_reused,
        bytes_reused: dumper.bytes_reused,
    })
}

struct Dumper<'a> {
    sink: &'a CountingSink<'a>,
    cache: Cache<'a>,

    // The device of the backup root; children on other devices are
    // mount points and are not descended into.
    root_dev: u64,

    files_read: u64,
    files_reused: u64,
    bytes_reused: u64,
}

impl<'a> Dumper<'a> {
    fn directory(&mut self, path: &Path, meta: &Metadata) -> Result<Oid> {
        let children = if meta.dev() == self.root_dev {
            read_dir_sorted(path)?
        } else {
            // Crossing a device; act as if there are no children.
            vec![]
        };

        let old = self.cache.get_dir(meta.ino())?;
        let mut info = DirInfo::new(meta.ino());

        let mut writer = DirWriter::new(self.sink, 256 * 1024);

        for (name, cmeta) in children {
            let cpath = path.join(&name);
            let ftype = cmeta.file_type();

            let id = if ftype.is_file() {
                self.regular_file(&cpath, &cmeta, &old, &mut info)?
            } else if ftype.is_dir() {
                self.directory(&cpath, &cmeta)?
            } else {
                self.plain_node(&cpath, &cmeta)?
            };

            writer.add(&name, &id)?;
        }

        let child_id = writer.finalize()?;

        self.cache.update_dir(&info)?;

        let mut props = encode_props(meta);
        props.props.insert("children".to_owned(), child_id.to_hex());
        self.write_node("node", &props)
    }

    fn regular_file(&mut self,
                    path: &Path,
                    meta: &Metadata,
                    old: &DirInfo,
                    info: &mut DirInfo)
                    -> Result<Oid> {
        let ino = meta.ino();
        let ctime = meta.ctime() * 1_000_000_000 + meta.ctime_nsec();

        let fi = match old.files.get(&ino) {
            Some(prior) if prior.ctime == ctime => {
                // Unchanged since the last backup; reuse the data OID
                // and keep the entry, expiry included.
                self.files_reused += 1;
                self.bytes_reused += meta.len();
                prior.clone()
            }
            _ => {
                let data = write_file(self.sink, path)?;
                self.files_read += 1;
                let mut fi = FileInfo {
                    ino,
                    ctime,
                    data,
                    expire: 0,
                };
                self.cache.set_expire(&mut fi);
                fi
            }
        };

        let mut props = encode_props(meta);
        props.props.insert("data".to_owned(), fi.data.to_hex());

        info.files.insert(ino, fi);

        self.write_node("node", &props)
    }

    fn plain_node(&mut self, path: &Path, meta: &Metadata) -> Result<Oid> {
        let mut props = encode_props(meta);

        if props.kind == "LNK" {
            let target = fs::read_link(path)?;
            let target = match target.to_str() {
                Some(target) => target.to_owned(),
                None => {
                    warn!("Symlink target is not valid UTF-8: {:?}", path);
                    target.to_string_lossy().into_owned()
                }
            };
            props.props.insert("target".to_owned(), target);
        }

        self.write_node("node", &props)
    }

    fn write_node(&self, kind: &str, node: &PropertyMap) -> Result<Oid> {
        let ch = Chunk::new_plain(Kind::new(kind)?, node.encode()?);
        self.sink.insert(&ch)?;
        Ok(*ch.oid())
    }
}

// Read a directory's entries, sorted by name.  Entries that can't be
// described (stat failures, non-UTF-8 names) are skipped with a
// warning rather than failing the whole backup.
fn read_dir_sorted(path: &Path) -> Result<Vec<(String, Metadata)>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Unable to read entry in {:?} ({})", path, err);
                continue;
            }
        };

        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                warn!("Skipping non-UTF-8 name in {:?}: {:?}", path, name);
                continue;
            }
        };

        match entry.metadata() {
            Ok(meta) => entries.push((name, meta)),
            Err(err) => {
                warn!("Unable to stat {:?}/{} ({})", path, name, err);
            }
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

// Given stat information for a node, encode the textual backup
// properties that will be written for it.
fn encode_props(meta: &Metadata) -> PropertyMap {
    let ftype = meta.file_type();

    let mut add_dev = false;
    let kind = if ftype.is_file() {
        "REG"
    } else if ftype.is_dir() {
        "DIR"
    } else if ftype.is_symlink() {
        "LNK"
    } else if ftype.is_char_device() {
        add_dev = true;
        "CHR"
    } else if ftype.is_block_device() {
        add_dev = true;
        "BLK"
    } else if ftype.is_fifo() {
        "FIFO"
    } else if ftype.is_socket() {
        "SOCK"
    } else {
        "UNK"
    };

    let mut result = PropertyMap::new(kind);
    let props = &mut result.props;
    props.insert("mode".to_owned(), (meta.mode() & 0o7777).to_string());
    props.insert("dev".to_owned(), meta.dev().to_string());
    props.insert("ino".to_owned(), meta.ino().to_string());
    props.insert("nlink".to_owned(), meta.nlink().to_string());
    props.insert("uid".to_owned(), meta.uid().to_string());
    props.insert("gid".to_owned(), meta.gid().to_string());
    props.insert("size".to_owned(), meta.size().to_string());
    props.insert("mtime".to_owned(),
                 time::encode(meta.mtime(), meta.mtime_nsec() as u32));
    props.insert("ctime".to_owned(),
                 time::encode(meta.ctime(), meta.ctime_nsec() as u32));

    if add_dev {
        props.insert("rdev".to_owned(), meta.rdev().to_string());
    }

    result
}

fn unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(_) => 0,
    }
}

// A pool wrapper that maintains statistics about what passes through,
// for the summary.
struct CountingSink<'a> {
    child: &'a SqlPool,
    chunks: Cell<u64>,
    bytes: Cell<u64>,
    zbytes: Cell<u64>,
}

impl<'a> CountingSink<'a> {
    fn new(child: &SqlPool) -> CountingSink {
        CountingSink {
            child,
            chunks: Cell::new(0),
            bytes: Cell::new(0),
            zbytes: Cell::new(0),
        }
    }
}

impl<'a> ChunkSource for CountingSink<'a> {
    fn search(&self, key: &Oid) -> Result<Chunk> {
        self.child.search(key)
    }

    fn contains(&self, key: &Oid) -> Result<bool> {
        self.child.contains(key)
    }

    fn uuid(&self) -> &Uuid {
        self.child.uuid()
    }

    fn backups(&self) -> Result<Vec<Oid>> {
        self.child.backups()
    }
}

impl<'a> ChunkSink for CountingSink<'a> {
    fn insert(&self, chunk: &Chunk) -> Result<()> {
        self.child.insert(chunk)?;

        self.chunks.set(self.chunks.get() + 1);
        self.bytes.set(self.bytes.get() + chunk.data_len() as u64);
        let zlen = match chunk.zdata() {
            Some(zdata) => zdata.len() as u64,
            None => chunk.data_len() as u64,
        };
        self.zbytes.set(self.zbytes.get() + zlen);

        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.child.flush()
    }
}
