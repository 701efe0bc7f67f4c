//! Consistent overhead byte stuffing
//!
//! A COBS frame is at most 256 bytes on the wire:
//!
//! ```text
//! [0x00] [code] [up to 253 payload bytes, 0x00-free] [0x00]
//! ```
//!
//! Each payload run ending in a zero is replaced by `[run_len + 1]` followed
//! by the run without its zero. Messages longer than 253 bytes are sliced
//! into chunks; every chunk but the last carries the continuation delimiter
//! `0xff` instead of the closing `0x00`.

use crate::Inline;

/// Frame start and end delimiter
pub const DELIMITER: u8 = 0x00;
/// Closing delimiter of a non-final chunk of an extended message
pub const EXTENDED: u8 = 0xff;
/// Payload capacity of one frame
pub const MAX_PAYLOAD: usize = 253;
/// Delimiter, first code byte and closing delimiter
pub const OVERHEAD: usize = 3;

/// Encode one chunk in place.
///
/// `frame[0]` and `frame[1]` are the header slots, payload occupies
/// `frame[2..2 + size]` and `frame[2 + size]` receives the closing
/// delimiter. The caller owns backup and restore of the byte at
/// `frame[2 + size]` when chunks share a buffer.
pub fn encode(frame: &mut [u8], size: usize, extended: bool) {
    debug_assert!(size >= 1 && size <= MAX_PAYLOAD);
    debug_assert!(frame.len() >= size + OVERHEAD);

    frame[0] = DELIMITER;
    frame[2 + size] = DELIMITER; // phantom delimiter terminates the last run

    let mut remaining = size + 1;
    let mut code_at = 1;
    let mut scan = 2;
    while remaining > 0 {
        let mut run = 1;
        while frame[scan] != DELIMITER {
            scan += 1;
            run += 1;
        }
        scan += 1;
        frame[code_at] = run as u8;
        code_at += run;
        remaining -= run;
    }

    if extended {
        frame[code_at] = EXTENDED;
    }
}

/// Code of a full 253-byte run, which does not displace a zero
const FULL_RUN: u8 = 0xfe;

/// Discard bytes until the next delimiter
const SYNC: u8 = 0xff;
/// The next byte is the first run code of a frame
const AWAIT: u8 = 0xfe;

/// Streaming single-frame decoder
///
/// Holds the running `(run, count)` pair between bytes. A stuffed zero is
/// emitted lazily when the following run code arrives, never for a full
/// 254-run and never at the closing delimiter. Extended messages are not
/// reassembled; commands fit one frame by construction.
#[derive(Debug)]
pub struct CobsDecoder {
    /// Data bytes left in the current run, or one of the sentinels above
    run: u8,
    /// The current run displaced a zero that precedes the next run
    stuff: bool,
    count: u8,
}

impl CobsDecoder {
    pub const fn new() -> Self {
        Self {
            run: SYNC,
            stuff: false,
            count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.run = SYNC;
        self.stuff = false;
        self.count = 0;
    }

    pub fn feed(&mut self, byte: u8, dest: &mut [u8]) -> Inline {
        if byte == DELIMITER {
            let run = self.run;
            self.run = AWAIT;
            self.stuff = false;
            let count = self.count;
            self.count = 0;

            // mid-run delimiter means a truncated frame, silently resync
            return if run == 0 && count > 0 {
                Inline::Frame(count as usize)
            } else {
                Inline::Pending
            };
        }

        match self.run {
            SYNC => Inline::Pending,
            AWAIT => {
                if byte == EXTENDED {
                    self.run = SYNC;
                    return Inline::Pending;
                }
                self.run = byte - 1;
                self.stuff = byte != FULL_RUN;
                Inline::Pending
            }
            0 => {
                // the byte is the next run code
                if byte == EXTENDED {
                    // extended messages are not reassembled
                    self.run = SYNC;
                    self.count = 0;
                    return Inline::Pending;
                }
                let stuff = self.stuff;
                self.run = byte - 1;
                self.stuff = byte != FULL_RUN;
                if stuff {
                    self.write(0, dest)
                } else {
                    Inline::Pending
                }
            }
            _ => {
                self.run -= 1;
                self.write(byte, dest)
            }
        }
    }

    fn write(&mut self, byte: u8, dest: &mut [u8]) -> Inline {
        if usize::from(self.count) < dest.len() {
            dest[usize::from(self.count)] = byte;
            self.count += 1;
            Inline::Pending
        } else {
            self.run = SYNC;
            self.count = 0;
            Inline::Overrun
        }
    }
}

impl Default for CobsDecoder {
    fn default() -> Self {
        CobsDecoder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(stream: &[u8], dest: &mut [u8]) -> Inline {
        let mut decoder = CobsDecoder::new();
        let mut last = Inline::Pending;
        for &byte in stream {
            last = decoder.feed(byte, dest);
            if last != Inline::Pending {
                break;
            }
        }
        last
    }

    #[test]
    fn test_encode_reference() {
        let payload = [0x01, 0x00, 0x02, 0x03, 0x04, 0x00, 0x00, 0x05, 0x06, 0x07, 0x08];
        let mut frame = [0u8; 16];
        frame[2..2 + payload.len()].copy_from_slice(&payload);
        encode(&mut frame, payload.len(), false);
        assert_eq!(
            &frame[..payload.len() + OVERHEAD],
            &[0x00, 0x02, 0x01, 0x04, 0x02, 0x03, 0x04, 0x01, 0x05, 0x05, 0x06, 0x07, 0x08, 0x00]
        );
    }

    #[test]
    fn test_round_trip() {
        let cases: &[&[u8]] = &[
            &[0x00],
            &[0x11],
            &[0x11, 0x00],
            &[0x00, 0x00, 0x00],
            &[0x01, 0x00, 0x02, 0x03, 0x04, 0x00, 0x00, 0x05, 0x06, 0x07, 0x08],
        ];
        for payload in cases {
            let mut frame = [0u8; 260];
            frame[2..2 + payload.len()].copy_from_slice(payload);
            encode(&mut frame, payload.len(), false);

            // no in-band delimiter between the header and closing delimiters
            assert!(!frame[1..1 + payload.len() + 1].contains(&DELIMITER));

            let mut dest = [0u8; 253];
            let wire = &frame[..payload.len() + OVERHEAD];
            assert_eq!(decode(wire, &mut dest), Inline::Frame(payload.len()));
            assert_eq!(&dest[..payload.len()], *payload);
        }
    }

    #[test]
    fn test_round_trip_full_frame() {
        let mut frame = [0u8; 260];
        for (i, slot) in frame[2..2 + MAX_PAYLOAD].iter_mut().enumerate() {
            *slot = (i % 255) as u8 + 1;
        }
        let payload: [u8; MAX_PAYLOAD] = frame[2..2 + MAX_PAYLOAD].try_into().unwrap();
        encode(&mut frame, MAX_PAYLOAD, false);
        assert_eq!(frame[1], 254);

        let mut dest = [0u8; MAX_PAYLOAD];
        assert_eq!(
            decode(&frame[..MAX_PAYLOAD + OVERHEAD], &mut dest),
            Inline::Frame(MAX_PAYLOAD)
        );
        assert_eq!(dest, payload);
    }

    #[test]
    fn test_extended_chunk_delimiter() {
        let mut frame = [0u8; 260];
        for slot in frame[2..2 + MAX_PAYLOAD].iter_mut() {
            *slot = 0x42;
        }
        encode(&mut frame, MAX_PAYLOAD, true);
        assert_eq!(frame[2 + MAX_PAYLOAD], EXTENDED);

        let mut tail = [0u8; 8];
        tail[2] = 0x42;
        encode(&mut tail, 1, false);
        assert_eq!(tail[3], DELIMITER);
    }

    #[test]
    fn test_decoder_discards_until_delimiter() {
        let mut decoder = CobsDecoder::new();
        let mut dest = [0u8; 8];
        // mid-stream garbage before any delimiter
        assert_eq!(decoder.feed(0x17, &mut dest), Inline::Pending);
        assert_eq!(decoder.feed(0x29, &mut dest), Inline::Pending);
        assert_eq!(decoder.feed(DELIMITER, &mut dest), Inline::Pending);

        for &byte in &[0x02, 0x55, DELIMITER] {
            let progress = decoder.feed(byte, &mut dest);
            if byte == DELIMITER {
                assert_eq!(progress, Inline::Frame(1));
            }
        }
        assert_eq!(dest[0], 0x55);
    }

    #[test]
    fn test_decoder_overrun() {
        let mut decoder = CobsDecoder::new();
        let mut dest = [0u8; 4];
        decoder.feed(DELIMITER, &mut dest);
        decoder.feed(0x06, &mut dest);
        let mut last = Inline::Pending;
        for byte in 1..=5u8 {
            last = decoder.feed(byte, &mut dest);
        }
        assert_eq!(last, Inline::Overrun);

        // the next well-formed frame still decodes
        decoder.feed(DELIMITER, &mut dest);
        decoder.feed(0x02, &mut dest);
        assert_eq!(decoder.feed(0x33, &mut dest), Inline::Pending);
        assert_eq!(decoder.feed(DELIMITER, &mut dest), Inline::Frame(1));
        assert_eq!(dest[0], 0x33);
    }
}
