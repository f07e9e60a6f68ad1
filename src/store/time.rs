// Backup timestamps.

//! Timestamps in property maps are written as `<sec>.<9-digit-nsec>`,
//! e.g. `1394736000.000000123`.  The decoder tolerates a missing
//! fractional part but rejects fractions longer than nanoseconds.

use crate::Error;
use crate::Result;

const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Encode seconds and nanoseconds since the epoch.
pub fn encode(sec: i64, nsec: u32) -> String {
    format!("{}.{:09}", sec, nsec)
}

/// Decode a timestamp into nanoseconds since the epoch.
pub fn decode(text: &str) -> Result<i64> {
    let mut parts = text.splitn(2, '.');

    let sec = parts.next().unwrap_or("");
    let sec: i64 = sec
        .parse()
        .map_err(|_| Error::BadProperties(format!("invalid timestamp {:?}", text)))?;

    let nsec = match parts.next() {
        None => 0,
        Some(frac) => {
            if frac.len() > 9 {
                return Err(Error::BadProperties(format!("invalid timestamp {:?}", text)));
            }
            let mut nsec: i64 = frac
                .parse()
                .map_err(|_| Error::BadProperties(format!("invalid timestamp {:?}", text)))?;
            for _ in frac.len()..9 {
                nsec *= 10;
            }
            nsec
        }
    };

    Ok(sec * NSEC_PER_SEC + nsec)
}
