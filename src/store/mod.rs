// Tree encoding and traversal.

//! Encoding filesystem trees as chunks, and walking them back.
//!
//! Regular file data goes through [`DataWrite`], which splits it into
//! `blob` chunks linked by `ind` indirect blocks.  Directory contents
//! go through [`DirWriter`], which produces `dir ` chunks linked by
//! `dir` indirect blocks.  Each filesystem entry is described by a
//! `node` chunk holding an encoded [`PropertyMap`], and a whole backup
//! is capped by a `back` chunk.  [`walk`] traverses any of these.

pub use self::dir::DirWriter;
pub use self::file::DataWrite;
pub use self::indirect::IndirectWriter;
pub use self::props::PropertyMap;
pub use self::walk::{walk, PathTracker, Visit, VisitResult, Visitor};

pub mod dir;
pub mod file;
pub mod indirect;
pub mod props;
pub mod time;
pub mod walk;
