// Property maps.

//! Property list conversion.
//!
//! A property map is a short kind tag plus string key/value pairs.  The
//! encoding is deliberately simple: the tag as a 1-byte length prefixed
//! string, then each key as a 1-byte length prefixed string followed by
//! its value as a 2-byte big-endian length prefixed string.  Keys are
//! written in sorted order, so that equal maps always encode to equal
//! bytes (and therefore equal OIDs).

use crate::store::time;
use crate::Error;
use crate::Oid;
use crate::Result;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMap {
    pub kind: String,
    pub props: BTreeMap<String, String>,
}

impl PropertyMap {
    pub fn new(kind: &str) -> PropertyMap {
        PropertyMap {
            kind: kind.to_owned(),
            props: BTreeMap::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        push_string8(&mut buf, &self.kind)?;

        for (key, value) in &self.props {
            push_string8(&mut buf, key)?;
            push_string16(&mut buf, value)?;
        }

        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<PropertyMap> {
        let mut dec = Decoder::new(data);

        let kind = dec.get_string8()?;
        let mut props = BTreeMap::new();
        while !dec.done() {
            let key = dec.get_string8()?;
            let value = dec.get_string16()?;
            // Duplicate keys overwrite; encoders never produce them.
            props.insert(key, value);
        }

        Ok(PropertyMap { kind, props })
    }

    /// Look up a property that is required to be present.
    pub fn get(&self, key: &str) -> Result<&str> {
        match self.props.get(key) {
            Some(value) => Ok(&value[..]),
            None => Err(Error::BadProperties(format!("missing property {:?}", key))),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        let text = self.get(key)?;
        text.parse().map_err(|_| {
            Error::BadProperties(format!("property {:?} is not a number: {:?}", key, text))
        })
    }

    /// Decode a property holding a hex OID.
    pub fn get_oid(&self, key: &str) -> Result<Oid> {
        Oid::from_hex(self.get(key)?)
    }

    /// Decode a `<sec>.<9-digit-nsec>` timestamp property into
    /// nanoseconds since the epoch.
    pub fn get_time(&self, key: &str) -> Result<i64> {
        time::decode(self.get(key)?)
    }
}

fn push_string8(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > 0xff {
        return Err(Error::BadProperties(format!("string too long: {} bytes", bytes.len())));
    }
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
    Ok(())
}

fn push_string16(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > 0xffff {
        return Err(Error::BadProperties(format!("value too long: {} bytes", bytes.len())));
    }
    buf.push((bytes.len() >> 8) as u8);
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
    Ok(())
}

// The decoder itself.
struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &[u8]) -> Decoder {
        Decoder { data, offset: 0 }
    }

    fn get_byte(&mut self) -> Result<u8> {
        if self.offset >= self.data.len() {
            return Err(Error::ShortRead);
        }
        let result = self.data[self.offset];
        self.offset += 1;
        Ok(result)
    }

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.offset + len > self.data.len() {
            return Err(Error::ShortRead);
        }
        let result = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(result)
    }

    fn get_string(&mut self, len: usize) -> Result<String> {
        let buf = self.get_bytes(len)?;
        Ok(String::from_utf8(buf.to_vec())?)
    }

    fn get_string8(&mut self) -> Result<String> {
        let len = self.get_byte()? as usize;
        self.get_string(len)
    }

    fn get_string16(&mut self) -> Result<String> {
        let s1 = self.get_byte()? as usize;
        let s2 = self.get_byte()? as usize;
        self.get_string((s1 << 8) | s2)
    }

    fn done(&self) -> bool {
        self.offset >= self.data.len()
    }
}
