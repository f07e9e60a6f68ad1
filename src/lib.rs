// Copyright 2016 David Brown
// MIT License

//! A content addressed, deduplicating backup engine.
//!
//! Backups are decomposed into `Chunk`s, identified by the SHA-1 hash
//! of their kind and payload, and stored in a `Pool`.  Files and
//! directories are encoded as trees of chunks, which can be traversed
//! again with a visitor.

pub use crate::error::Error;

use std::result;

pub type Result<T> = result::Result<T, Error>;

pub use crate::chunk::Chunk;
pub use crate::kind::Kind;
pub use crate::oid::Oid;

pub mod cache;
pub mod chunk;
pub mod chunkio;
pub mod dump;
pub mod error;
pub mod kind;
pub mod oid;
pub mod pdump;
pub mod pool;
pub mod restore;
pub mod store;

mod zlib;

#[cfg(test)]
mod testutil;
