//! Escape sequence framing
//!
//! Frames start and end with the delimiter `0x7e`. Any payload byte equal to
//! the delimiter or the escape character `0x7d` is transmitted as `0x7d`
//! followed by the byte minus `0x20`. The wire overhead is content-dependent,
//! two delimiters plus at worst one escape per payload byte.

use crate::Inline;

/// Frame start and end delimiter
pub const DELIMITER: u8 = 0x7e;
/// Escape prefix
pub const ESCAPE: u8 = 0x7d;
/// Start and end delimiter
pub const OVERHEAD: usize = 2;

/// Encode `src[..size]` into `dest`, returning the encoded length.
///
/// `dest` must hold the worst case of `2 * size + 2` bytes. Source and
/// destination may be the halves of one double-sized buffer; the encoder
/// never reads a source byte after writing past it as long as `dest` starts
/// below `src`.
pub fn encode(src: &[u8], dest: &mut [u8], size: usize) -> usize {
    debug_assert!(dest.len() >= 2 * size + OVERHEAD);

    let mut at = 0;
    dest[at] = DELIMITER;
    at += 1;

    for &byte in &src[..size] {
        if byte == DELIMITER || byte == ESCAPE {
            dest[at] = ESCAPE;
            at += 1;
            dest[at] = byte - 0x20;
        } else {
            dest[at] = byte;
        }
        at += 1;
    }

    dest[at] = DELIMITER;
    at + 1
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Idle,
    InFrame,
    Escape,
}

/// Streaming single-frame decoder
#[derive(Debug)]
pub struct EscsDecoder {
    state: State,
    count: u8,
}

impl EscsDecoder {
    pub const fn new() -> Self {
        Self {
            state: State::Idle,
            count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.count = 0;
    }

    pub fn feed(&mut self, byte: u8, dest: &mut [u8]) -> Inline {
        if byte == DELIMITER {
            self.state = State::InFrame;
            let count = self.count;
            self.count = 0;

            return if count > 0 {
                Inline::Frame(count as usize)
            } else {
                Inline::Pending
            };
        }

        if byte == ESCAPE {
            if self.state != State::Idle {
                self.state = State::Escape;
            }
            return Inline::Pending;
        }

        let data = match self.state {
            State::Idle => return Inline::Pending,
            State::InFrame => byte,
            State::Escape => {
                self.state = State::InFrame;
                byte + 0x20
            }
        };

        if usize::from(self.count) < dest.len() {
            dest[usize::from(self.count)] = data;
            self.count += 1;
            Inline::Pending
        } else {
            self.state = State::Idle;
            self.count = 0;
            Inline::Overrun
        }
    }
}

impl Default for EscsDecoder {
    fn default() -> Self {
        EscsDecoder::new()
    }
}
