//! Transmit frames
//!
//! A [`DataFrame`] wraps one of the two outgoing buffers (strobe or
//! response) together with its transmission cursor. Frames are filled in
//! one piece and drained in chunks by the TX pump, one chunk per tick.

use alloc::vec::Vec;
use core::ptr::NonNull;

/// Backing storage of a frame
pub(crate) enum FrameBuffer {
    /// Memory planner has not run yet
    Unallocated,
    Owned(Vec<u8>),
    /// User-supplied strobe source, registered through `set_buffer`
    External(Option<NonNull<u8>>),
}

// External pointers reference user memory with host lifetime; see the
// sampling model in `cell`.
unsafe impl Send for FrameBuffer {}

pub(crate) struct DataFrame {
    /// Tick-granularity period countdown
    pub countdown: u16,
    /// Byte displaced by the next COBS chunk header
    pub cobs_backup: u8,
    /// Strobe: snapshot captured this cycle. Response: length of a received
    /// command awaiting interpretation, zero when idle.
    pub valid: usize,
    pub buffer: FrameBuffer,
    /// Offset of the next chunk into the buffer
    pub frame: usize,
    /// Bytes remaining in the current transmission
    pub byte_count: usize,
    /// Logical buffer capacity (half the allocation for ESCS frames)
    pub bytes_max: usize,
    /// Current payload length
    pub bytes_total: usize,
    /// Allocation size backing the buffer
    pub bytes_physical: usize,
}

impl DataFrame {
    pub fn new(countdown: u16) -> Self {
        Self {
            countdown,
            cobs_backup: 0,
            valid: 0,
            buffer: FrameBuffer::Unallocated,
            frame: 0,
            byte_count: 0,
            bytes_max: 0,
            bytes_total: 0,
            bytes_physical: 0,
        }
    }

    /// Allocate the owned backing store, zero-filled.
    pub fn allocate(&mut self, physical: usize) -> Result<(), ()> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(physical).map_err(|_| ())?;
        buf.resize(physical, 0);
        self.buffer = FrameBuffer::Owned(buf);
        self.bytes_physical = physical;
        Ok(())
    }

    /// Rearm the transmission cursor over the current payload.
    pub fn load(&mut self) {
        self.frame = 0;
        self.byte_count = self.bytes_total;
    }

    pub fn buf(&mut self) -> Option<&mut [u8]> {
        match &mut self.buffer {
            FrameBuffer::Unallocated => None,
            FrameBuffer::Owned(vec) => Some(vec.as_mut_slice()),
            FrameBuffer::External(ptr) => {
                let ptr = (*ptr)?;
                // length supplied by the memory planner, validity by the user
                Some(unsafe {
                    core::slice::from_raw_parts_mut(ptr.as_ptr(), self.bytes_physical)
                })
            }
        }
    }
}
