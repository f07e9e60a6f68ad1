// Chunk kinds.

//! A Kind is a u32 that corresponds to a 4-character ASCII string.  It
//! is packed little endian so that the numeric order matches the
//! textual order of the tags.

use crate::Error;
use crate::Result;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct Kind(pub u32);

impl Kind {
    pub fn new(text: &str) -> Result<Kind> {
        let b = text.as_bytes();
        if !text.is_ascii() {
            return Err(Error::NonAsciiKind);
        }
        if b.len() != 4 {
            return Err(Error::BadKindLength);
        }

        Ok(Kind(LittleEndian::read_u32(b)))
    }

    /// Get the kind back as its 4 tag bytes.
    pub fn bytes(self) -> [u8; 4] {
        let mut result = [0u8; 4];
        LittleEndian::write_u32(&mut result, self.0);
        result
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.bytes();
        for &ch in &bytes {
            fmt::Write::write_char(f, ch as char)?;
        }
        Ok(())
    }
}
