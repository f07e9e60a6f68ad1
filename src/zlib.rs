// An interface to the compression library.

use crate::Error;
use crate::Result;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::Read;

/// Attempt to compress a single block of data.  Returns the compressed
/// payload if that is strictly smaller than the input, otherwise None.
pub fn deflate(buf: &[u8]) -> Option<Vec<u8>> {
    let mut src = ZlibEncoder::new(buf, Compression::default());
    let mut res = Vec::new();
    match src.read_to_end(&mut res) {
        Ok(_) => (),
        // Compressing into memory does not fail; treat any surprise as
        // uncompressible.
        Err(_) => return None,
    }
    if res.len() < buf.len() {
        Some(res)
    } else {
        None
    }
}

/// Decompress the given buffer.
pub fn inflate(buf: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut src = ZlibDecoder::new(buf);
    let mut res = Vec::with_capacity(size_hint);
    src.read_to_end(&mut res).map_err(|_| Error::Decompress)?;
    Ok(res)
}
