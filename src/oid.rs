// Object IDs.

//! Every chunk in the pool is identified by an object-id (OID), which
//! is the SHA-1 hash of the `Kind` followed by the payload itself.

use crate::kind::Kind;
use crate::Error;
use crate::Result;
use sha1::{Digest, Sha1};

pub const OID_LEN: usize = 20;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Oid(pub [u8; OID_LEN]);

impl Oid {
    /// Compute the OID identifying a chunk of the given kind and
    /// payload.
    pub fn from_data(kind: Kind, data: &[u8]) -> Oid {
        let mut ctx = Sha1::new();
        ctx.update(&kind.bytes());
        ctx.update(data);
        Oid(ctx.finalize().into())
    }

    pub fn from_raw(bytes: &[u8]) -> Oid {
        if bytes.len() != OID_LEN {
            panic!("OID is incorrect length");
        }

        let mut result = [0u8; OID_LEN];
        result.copy_from_slice(bytes);
        Oid(result)
    }

    pub fn from_hex(text: &str) -> Result<Oid> {
        if text.len() != 2 * OID_LEN {
            return Err(Error::BadOid(text.to_owned()));
        }

        match hex::decode(text) {
            Ok(bytes) => Ok(Oid::from_raw(&bytes)),
            Err(_) => Err(Error::BadOid(text.to_owned())),
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

#[cfg(test)]
impl Oid {
    /// An OID derived from an integer, handy for tests that need many
    /// distinct but reproducible hashes.
    pub fn from_u32(index: u32) -> Oid {
        Oid::from_data(Kind::new("blob").unwrap(), format!("{}", index).as_bytes())
    }

    // When testing, it is useful to produce a tweaked Oid that is
    // slightly larger or smaller than the given one.
    fn tweak(&self, adjust: i16, stop: u8) -> Oid {
        let mut result = *self;
        let mut pos = OID_LEN - 1;
        loop {
            let tmp = (result.0[pos] as i16 + adjust) as u8;
            result.0[pos] = tmp;
            if tmp == stop {
                if pos == 0 {
                    break;
                }
                pos -= 1;
            } else {
                break;
            }
        }
        result
    }

    pub fn inc(&self) -> Oid {
        self.tweak(1, 0)
    }

    pub fn dec(&self) -> Oid {
        self.tweak(-1, 255)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kind::Kind;

    #[test]
    fn test_hex() {
        let zero = Oid::from_hex("0000000000000000000000000000000000000000").unwrap();
        assert_eq!(zero.to_hex(), "0000000000000000000000000000000000000000");

        let ones = Oid::from_hex("ffffffffffffffffffffffffffffffffffffffff").unwrap();
        assert_eq!(ones.to_hex(), "ffffffffffffffffffffffffffffffffffffffff");

        assert!(Oid::from_hex("42").is_err());
        assert!(Oid::from_hex("000000000000000000000000000000000000000g").is_err());
    }

    #[test]
    fn test_hashes() {
        let blob = Kind::new("blob").unwrap();
        assert_eq!(Oid::from_data(blob, b"This is a sample message").to_hex(),
                   "fc46bae8992795a17f286ddc1743a00a0cd33c0a");
        assert_eq!(Oid::from_data(blob, b"").to_hex(),
                   "0fd0bcfb44f83e7d5ac7a8922578276b9af48746");
        assert_eq!(Oid::from_u32(5124).to_hex(),
                   "f2a4cd9a77813d7c49c223739eb8ab5b9bbe71e9");
    }

    fn tweaker(input: &str, expect: &str, amount: i16) {
        let mut work = Oid::from_hex(input).unwrap();
        let mut tmp = amount;
        while tmp > 0 {
            work = work.inc();
            tmp -= 1;
        }
        while tmp < 0 {
            work = work.dec();
            tmp += 1;
        }
        if Oid::from_hex(expect).unwrap() != work {
            panic!("Expecting {}, but got {}, amount {}", expect, work.to_hex(), amount);
        }
    }

    #[test]
    fn test_tweak() {
        let a = Oid::from_data(Kind::new("blob").unwrap(), b"1");
        let b = a.inc();
        assert!(a != b);
        let c = b.dec();
        assert_eq!(a, c);

        tweaker("0000000000000000000000000000000000000000",
                "0000000000000000000000000000000000000001",
                1);
        tweaker("0000000000000000000000000000000000000000",
                "0000000000000000000000000000000000000100",
                256);
        tweaker("00000000000000000000000000000000ffffffff",
                "0000000000000000000000000000000100000000",
                1);
        tweaker("ffffffffffffffffffffffffffffffffffffffff",
                "0000000000000000000000000000000000000000",
                1);

        tweaker("ffffffffffffffffffffffffffffffffffffffff",
                "fffffffffffffffffffffffffffffffffffffffe",
                -1);
        tweaker("ffffffffffffffffffffffffffffffffffffffff",
                "fffffffffffffffffffffffffffffffffffffeff",
                -256);
        tweaker("ffffffffffffffffffffffffffffffff00000000",
                "fffffffffffffffffffffffffffffffeffffffff",
                -1);
        tweaker("0000000000000000000000000000000000000000",
                "ffffffffffffffffffffffffffffffffffffffff",
                -1);
    }
}
