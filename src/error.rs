// Errors for the backup engine.

use std::error;
use std::fmt;
use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::string::FromUtf8Error;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Sql(rusqlite::Error),
    Uuid(uuid::Error),
    Utf8(FromUtf8Error),
    ParseInt(ParseIntError),

    // Chunk codec.
    BadMagic,
    ShortRead,
    Decompress,
    LengthMismatch,

    // Property maps and hex parsing.
    BadProperties(String),
    BadOid(String),

    NonAsciiKind,
    BadKindLength,

    // Pool.
    SchemaMismatch(String),
    PoolNotFound(PathBuf),
    MissingChunk,
    DuplicateInsert,

    // Segment indices.
    InvalidIndex(String),
    PathError(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Error {
        Error::Sql(err)
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Error {
        Error::Uuid(err)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::Utf8(err)
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Error {
        Error::ParseInt(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::Sql(ref err) => err.fmt(f),
            Error::Uuid(ref err) => err.fmt(f),
            Error::Utf8(ref err) => err.fmt(f),
            Error::ParseInt(ref err) => err.fmt(f),
            Error::BadMagic => write!(f, "Invalid chunk magic"),
            Error::ShortRead => write!(f, "Short read"),
            Error::Decompress => write!(f, "Unable to decompress payload"),
            Error::LengthMismatch => write!(f, "Payload length mismatch"),
            Error::BadProperties(ref msg) => write!(f, "Property error: {}", msg),
            Error::BadOid(ref msg) => write!(f, "Invalid OID: {:?}", msg),
            Error::NonAsciiKind => write!(f, "Non ascii Kind"),
            Error::BadKindLength => write!(f, "Invalid Kind length (!= 4)"),
            Error::SchemaMismatch(ref version) => {
                write!(f, "Incompatible database schema: {:?}", version)
            }
            Error::PoolNotFound(ref path) => write!(f, "Not a storage pool: {:?}", path),
            Error::MissingChunk => write!(f, "Missing chunk"),
            Error::DuplicateInsert => write!(f, "Duplicate insert into pool"),
            Error::InvalidIndex(ref msg) => write!(f, "Invalid index file: {}", msg),
            Error::PathError(ref msg) => write!(f, "Path error: {}", msg),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::Sql(ref err) => Some(err),
            Error::Uuid(ref err) => Some(err),
            Error::Utf8(ref err) => Some(err),
            Error::ParseInt(ref err) => Some(err),
            _ => None,
        }
    }
}
