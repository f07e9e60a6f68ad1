// Dump bytes as ascii.

//! A hex dumper for debugging, in the classic `offset: bytes |ascii|`
//! format.

use std::io::{self, Write};

pub trait HexDump {
    /// Dump the bytes to stdout.
    fn dump(&self);

    /// Dump the bytes to the given writer.
    fn dump_to<W: Write>(&self, out: &mut W) -> io::Result<()>;
}

impl HexDump for [u8] {
    fn dump(&self) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        // Failure writing a debug dump to stdout is not actionable.
        let _ = self.dump_to(&mut out);
    }

    fn dump_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut offset = 0;
        while offset < self.len() {
            let mut line = String::new();
            let mut ascii = String::new();

            line.push_str(&format!("{:08x}: ", offset));
            ascii.push('|');

            for pos in offset..offset + 16 {
                if pos >= self.len() {
                    line.push_str("   ");
                    ascii.push(' ');
                } else {
                    let ch = self[pos];
                    line.push_str(&format!("{:02x} ", ch));
                    if (32..=126).contains(&ch) {
                        ascii.push(ch as char);
                    } else {
                        ascii.push('.');
                    }
                }

                if (pos & 15) == 7 {
                    line.push(' ');
                }
            }
            ascii.push('|');

            writeln!(out, "{} {}", line, ascii)?;
            offset += 16;
        }
        Ok(())
    }
}
