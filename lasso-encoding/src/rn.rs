//! `\r\n` terminated framing
//!
//! Plain ASCII frames terminated by the two-byte sequence `\r\n`. There is
//! no byte stuffing, so frames of different kinds cannot interleave on one
//! channel and the payload must not contain a newline. Used with the ASCII
//! processing mode only.

use crate::Inline;

pub const CR: u8 = b'\r';
pub const NL: u8 = b'\n';
/// The two trailing delimiter bytes
pub const OVERHEAD: usize = 2;

/// Append `\r\n` behind `buf[..size]`, returning the frame length.
pub fn terminate(buf: &mut [u8], size: usize) -> usize {
    buf[size] = CR;
    buf[size + 1] = NL;
    size + OVERHEAD
}

/// Streaming decoder accumulating into the destination buffer
///
/// The reported frame length excludes the carriage return.
#[derive(Debug)]
pub struct RnDecoder {
    count: u8,
}

impl RnDecoder {
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn feed(&mut self, byte: u8, dest: &mut [u8]) -> Inline {
        if byte == NL {
            let count = usize::from(self.count);
            self.count = 0;

            if count == 0 {
                return Inline::Empty;
            }
            return if dest[count - 1] == CR {
                Inline::Frame(count - 1)
            } else {
                // a newline must follow a carriage return
                Inline::Illegal
            };
        }

        if usize::from(self.count) < dest.len() {
            dest[usize::from(self.count)] = byte;
            self.count += 1;
            Inline::Pending
        } else {
            self.count = 0;
            Inline::Overrun
        }
    }
}

impl Default for RnDecoder {
    fn default() -> Self {
        RnDecoder::new()
    }
}
