// Restore a backup.

//! Re-create a backed up tree on the filesystem.  This is a visitor
//! over the backup: directories are made on `enter` and get their
//! attributes on `leave`, files are created on `open`, filled from
//! `blob` chunks, and finished on `close`.  Ownership is only restored
//! when running as root.

use crate::pool::ChunkSource;
use crate::store::walk::{walk, PathTracker, Visit, VisitResult, Visitor};
use crate::store::{time, PropertyMap};
use crate::Chunk;
use crate::Error;
use crate::Oid;
use crate::Result;
use log::warn;
use std::ffi::CString;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

/// Restore the backup named by `id` into the directory `path`, which
/// must not yet exist.
pub fn run<P: AsRef<Path>>(pool: &dyn ChunkSource, id: &Oid, path: P) -> Result<()> {
    let mut state = Restorer {
        base: path.as_ref().to_path_buf(),
        tracker: PathTracker::new(),
        file: None,
        is_root: unsafe { libc::geteuid() } == 0,
    };

    walk(pool, id, &mut state)
}

struct Restorer {
    base: PathBuf,
    tracker: PathTracker,

    // The regular file currently being written.
    file: Option<File>,

    is_root: bool,
}

impl Restorer {
    fn path(&self) -> PathBuf {
        self.tracker.path(&self.base)
    }

    // Restore permissions, ownership, and timestamp on the given node.
    fn restore_stat(&self, path: &Path, props: &PropertyMap) -> Result<()> {
        if self.is_root {
            let uid = props.get_u64("uid")? as libc::uid_t;
            let gid = props.get_u64("gid")? as libc::gid_t;
            let cpath = path_cstring(path)?;
            if unsafe { libc::lchown(cpath.as_ptr(), uid, gid) } != 0 {
                return Err(Error::Io(std::io::Error::last_os_error()));
            }
        }

        if props.kind != "LNK" {
            let mode = props.get_u64("mode")? as u32;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }

        self.restore_time(path, props)
    }

    // Restore the timestamp on the given node.
    fn restore_time(&self, path: &Path, props: &PropertyMap) -> Result<()> {
        let when = time::decode(props.get("mtime")?)?;
        let times = [timespec(when), timespec(when)];

        let cpath = path_cstring(path)?;
        let rc = unsafe {
            libc::utimensat(libc::AT_FDCWD,
                            cpath.as_ptr(),
                            times.as_ptr(),
                            libc::AT_SYMLINK_NOFOLLOW)
        };
        if rc != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Visitor for Restorer {
    fn enter(&mut self, _props: &PropertyMap) -> VisitResult {
        fs::create_dir(self.path())?;
        Ok(Visit::Continue)
    }

    fn leave(&mut self, props: &PropertyMap) -> Result<()> {
        // Attributes go on last, after the children are in place, so
        // that a read-only directory doesn't break its own restore.
        self.restore_stat(&self.path(), props)
    }

    fn open(&mut self, _props: &PropertyMap) -> VisitResult {
        let fd = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path())?;
        self.file = Some(fd);
        Ok(Visit::Continue)
    }

    fn close(&mut self, props: &PropertyMap) -> Result<()> {
        match self.file.take() {
            Some(_fd) => (),
            None => unreachable!(),
        }
        self.restore_stat(&self.path(), props)
    }

    fn blob(&mut self, chunk: &Chunk) -> Result<()> {
        match self.file {
            Some(ref mut fd) => fd.write_all(chunk.data()?)?,
            None => unreachable!(),
        }
        Ok(())
    }

    fn node(&mut self, props: &PropertyMap) -> Result<()> {
        let path = self.path();
        match &props.kind[..] {
            "LNK" => {
                symlink(props.get("target")?, &path)?;
                self.restore_stat(&path, props)
            }
            kind => {
                // Devices, fifos and sockets need more privilege (or
                // more intent) than a restore should assume.
                warn!("Not restoring {} node at {:?}", kind, path);
                Ok(())
            }
        }
    }

    fn push_path(&mut self, name: &str) {
        self.tracker.push(name);
    }

    fn pop_path(&mut self) {
        self.tracker.pop();
    }
}

fn path_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::PathError(format!("path contains NUL: {:?}", path)))
}

fn timespec(nanos: i64) -> libc::timespec {
    libc::timespec {
        tv_sec: nanos.div_euclid(1_000_000_000) as libc::time_t,
        tv_nsec: nanos.rem_euclid(1_000_000_000) as libc::c_long,
    }
}
