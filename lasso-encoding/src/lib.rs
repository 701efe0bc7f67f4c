//! Frame codecs and value serialization for the Lasso data server
//!
//! This crate provides the byte-stuffing codecs (COBS, ESCS, RN) with their
//! streaming decoders, the pluggable CRC helpers and the MessagePack subset
//! used by the MessagePack processing mode. Lasso users should not depend on
//! this crate directly. Use the `lasso::encoding` reexport instead.
//!
//! All decoders are inline: they consume one byte at a time (typically from a
//! receive interrupt) and keep their own state between calls, so no staging
//! buffer beyond the frame destination is needed.
#![no_std]

pub mod cobs;
pub mod crc;
pub mod escs;
pub mod msgpack;
pub mod rn;

/// Outcome of feeding one byte to an inline frame decoder
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Inline {
    /// Frame still in flight, keep feeding
    Pending,
    /// A complete frame of this length sits in the destination buffer
    Frame(usize),
    /// A delimiter closed a zero-length frame
    Empty,
    /// The frame exceeded the destination buffer and was abandoned
    Overrun,
    /// A delimiter appeared where the framing rules forbid it
    Illegal,
}
