//! The Lasso host: tick-driven protocol engine
//!
//! One [`Host`] value owns the scheduler state, the data cell registry and
//! both transmit frames. The user wires it to a periodic tick by calling
//! [`Host::handle_com`] at the configured tick period and feeds received
//! bytes through [`Host::receive_byte`], typically from a UART interrupt.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::NonNull;

use lasso_core::{CellType, Encoding, Errno, StrobeDynamics, CONTROL_CODE};
use lasso_encoding::{cobs, crc, escs, rn, Inline};

use crate::cell::{ChangeHook, DataCell};
use crate::config::{Config, ConfigError, COMMAND_BUFFER_MAX};
use crate::frame::{DataFrame, FrameBuffer};

/// Transmit-side transport error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// Transmitter back-pressure; the chunk is retried next tick
    Busy,
    /// Any other failure; the chunk is dropped and the stream advances
    Io,
}

/// One-way byte transport towards the client
///
/// `send` hands over one frame chunk and must not block. A driver that is
/// still shifting out the previous chunk reports [`SendError::Busy`].
pub trait Transport {
    fn send(&mut self, chunk: &[u8]) -> Result<(), SendError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError {
    /// The data space is limited to 255 cells
    TooManyCells,
    /// Cells need backing memory unless the strobe source is external
    NullPointer,
    /// Registration is closed once the memory planner has run
    AlreadyRegistered,
    /// Buffer allocation failed
    OutOfMemory,
}

/// Streaming command decoder, selected by the command encoding
enum Decoder {
    Rn(rn::RnDecoder),
    Cobs(cobs::CobsDecoder),
    Escs(escs::EscsDecoder),
}

impl Decoder {
    fn feed(&mut self, byte: u8, dest: &mut [u8]) -> Inline {
        match self {
            Decoder::Rn(d) => d.feed(byte, dest),
            Decoder::Cobs(d) => d.feed(byte, dest),
            Decoder::Escs(d) => d.feed(byte, dest),
        }
    }

    fn reset(&mut self) {
        match self {
            Decoder::Rn(d) => d.reset(),
            Decoder::Cobs(d) => d.reset(),
            Decoder::Escs(d) => d.reset(),
        }
    }
}

/// Ingress state fed from the receive interrupt
pub(crate) struct Receiver {
    pub buf: [u8; COMMAND_BUFFER_MAX],
    /// Configured command buffer size, the decoders never write past it
    pub limit: usize,
    /// Ticks left before an incomplete frame is dropped
    pub timeout: u16,
    decoder: Decoder,
}

/// The host-side protocol engine
///
/// Construction order mirrors the bootstrap of the original hosts: create
/// the host, install the optional hooks, register every data cell, then run
/// the memory planner with [`Host::register_mem`]. Afterwards the host is
/// live: it advertises its signature until a client starts a strobe.
pub struct Host<T: Transport> {
    pub(crate) cfg: Config,
    pub(crate) transport: T,
    pub(crate) crc: crc::CrcFn,
    pub(crate) activation_hook: Option<fn(bool)>,
    pub(crate) period_hook: Option<fn(u16) -> u16>,
    pub(crate) control_hook: Option<fn(&[u8])>,
    pub(crate) cells: Vec<DataCell>,
    /// Dynamic-strobe mask prefix length in bytes
    pub(crate) mask_bytes: usize,
    pub(crate) receive: Receiver,
    pub(crate) strobe: DataFrame,
    pub(crate) response: DataFrame,
    pub(crate) strobing: bool,
    pub(crate) advertise: bool,
    pub(crate) strobe_period: u16,
    pub(crate) tick_period: u16,
    pub(crate) roundtrip_latency: u16,
    pub(crate) advertise_period: u16,
    pub(crate) overdrive: bool,
    timestamp: Option<Box<u32>>,
    pub(crate) signature: [u8; 16],
    pub(crate) registered: bool,
}

impl<T: Transport> Host<T> {
    /// Create a host over a validated configuration.
    pub fn new(cfg: Config, transport: T) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let info = cfg.protocol_info().into_bits();
        let mut signature = [0u8; 16];
        signature[..10].copy_from_slice(b"lassoHost/");
        signature[10..14].copy_from_slice(&info.to_le_bytes());
        signature[14..].copy_from_slice(b"\r\n");

        let decoder = match cfg.command_encoding {
            Encoding::Cobs => Decoder::Cobs(cobs::CobsDecoder::new()),
            Encoding::Escs => Decoder::Escs(escs::EscsDecoder::new()),
            _ => Decoder::Rn(rn::RnDecoder::new()),
        };

        let tick_period = cfg.tick_period_ms;
        let roundtrip_latency = cfg.roundtrip_latency_ticks(tick_period);
        let mut response = DataFrame::new(roundtrip_latency);
        response.bytes_max = cfg.response_buffer_size;

        let mut host = Self {
            transport,
            crc: crc::xor_checksum,
            activation_hook: None,
            period_hook: None,
            control_hook: None,
            cells: Vec::new(),
            mask_bytes: 0,
            receive: Receiver {
                buf: [0; COMMAND_BUFFER_MAX],
                limit: cfg.command_buffer_size,
                timeout: 0,
                decoder,
            },
            strobe: DataFrame::new(cfg.strobe_period_ticks),
            response,
            strobing: false,
            advertise: true,
            strobe_period: cfg.strobe_period_ticks,
            tick_period,
            roundtrip_latency,
            advertise_period: cfg.advertise_period_ticks(tick_period),
            overdrive: false,
            timestamp: None,
            signature,
            registered: false,
            cfg,
        };

        if host.cfg.timestamp {
            host.register_timestamp();
        }
        Ok(host)
    }

    /// Install a CRC generator replacing the default XOR checksum.
    pub fn set_crc(&mut self, crc: crc::CrcFn) {
        self.crc = crc;
    }

    /// Hook invoked on every strobe activation or deactivation.
    pub fn set_activation_hook(&mut self, hook: fn(bool)) {
        self.activation_hook = Some(hook);
    }

    /// Hook that may override a requested strobe period.
    pub fn set_period_hook(&mut self, hook: fn(u16) -> u16) {
        self.period_hook = Some(hook);
    }

    /// Sink for control passthrough messages (first byte `0xc1`).
    pub fn set_control_hook(&mut self, hook: fn(&[u8])) {
        self.control_hook = Some(hook);
    }

    /// Register a data cell linking `ptr` to the protocol.
    ///
    /// Cells are appended in registration order; the order defines the cell
    /// indices and the strobe layout. Registration closes when
    /// [`Host::register_mem`] runs.
    ///
    /// # Safety
    ///
    /// `ptr` must point to memory of at least `count` elements of the type's
    /// byte width, properly aligned, and stay valid for the host lifetime.
    /// The memory is read (and written, for writeable cells) without
    /// synchronization.
    pub unsafe fn register_cell(
        &mut self,
        ty: CellType,
        count: u16,
        ptr: *const (),
        name: &'static str,
        unit: &'static str,
        on_change: Option<ChangeHook>,
        update_rate: u16,
    ) -> Result<(), RegisterError> {
        let ptr = NonNull::new(ptr as *mut u8);
        self.register_cell_inner(ty, count, ptr, name, unit, on_change, update_rate)
    }

    fn register_timestamp(&mut self) {
        let counter = Box::new(0u32);
        let ptr = NonNull::from(counter.as_ref()).cast::<u8>();
        self.timestamp = Some(counter);
        unwrap!(self.register_cell_inner(
            CellType::UINT32.with(CellType::ENABLE),
            1,
            Some(ptr),
            "Timestamp",
            "ticks",
            None,
            1,
        ));
    }

    fn register_cell_inner(
        &mut self,
        mut ty: CellType,
        count: u16,
        ptr: Option<NonNull<u8>>,
        name: &'static str,
        unit: &'static str,
        on_change: Option<ChangeHook>,
        update_rate: u16,
    ) -> Result<(), RegisterError> {
        if self.registered {
            return Err(RegisterError::AlreadyRegistered);
        }
        if self.cells.len() >= 255 {
            return Err(RegisterError::TooManyCells);
        }
        if ptr.is_none() && !self.cfg.strobe_external_source {
            return Err(RegisterError::NullPointer);
        }

        if self.cfg.strobe_external_source {
            ty = ty.with(CellType::PERMANENT);
        }
        if ty.permanent() {
            ty.enable();
        }

        let rate = if self.cfg.strobe_dynamics == StrobeDynamics::Dynamic {
            u32::from(update_rate.max(1))
        } else {
            1
        };

        let cell = DataCell {
            ty,
            count,
            ptr,
            name,
            unit,
            on_change,
            update_rate: (rate << 16) | rate,
        };

        let footprint = cell.footprint();
        self.strobe.bytes_max += footprint;
        if ty.enabled() {
            self.strobe.bytes_total += footprint;
        }

        self.cells.try_reserve(1).map_err(|_| RegisterError::OutOfMemory)?;
        self.cells.push(cell);
        Ok(())
    }

    /// Run the memory planner and allocate the transmit buffers.
    ///
    /// Reserves head room for the codec header and the strobe marker byte,
    /// the dynamic-mask prefix, and tail room for the CRC, then rounds each
    /// buffer to the configured alignment. ESCS buffers are allocated at
    /// twice their logical size: payload is written into the upper half and
    /// encoded down into the lower half.
    pub fn register_mem(&mut self) -> Result<(), RegisterError> {
        if self.registered {
            return Err(RegisterError::AlreadyRegistered);
        }
        let cfg = self.cfg;
        let crc_width = cfg.crc_width.into_usize();
        let align = cfg.memory_align;

        if cfg.strobe_encoding.is_stuffed() {
            // strobe marker discriminating strobes from replies
            self.strobe.bytes_max += 1;
            self.strobe.bytes_total += 1;
        }
        if cfg.strobe_dynamics == StrobeDynamics::Dynamic && !self.cells.is_empty() {
            self.mask_bytes = (self.cells.len() - 1) / 8 + 1;
            self.strobe.bytes_max += self.mask_bytes;
            self.strobe.bytes_total += self.mask_bytes;
        }
        if cfg.strobe_crc {
            self.strobe.bytes_max += crc_width;
            self.strobe.bytes_total += crc_width;
        }
        if cfg.command_crc {
            self.response.bytes_max += crc_width;
        }

        self.strobe.bytes_max += match cfg.strobe_encoding {
            Encoding::Escs => escs::OVERHEAD,
            Encoding::Cobs => cobs::OVERHEAD,
            _ => 0,
        };
        self.response.bytes_max += match cfg.command_encoding {
            Encoding::Escs => escs::OVERHEAD,
            Encoding::Cobs => cobs::OVERHEAD,
            _ => rn::OVERHEAD,
        };

        self.strobe.bytes_max = align_up(self.strobe.bytes_max, align);
        self.response.bytes_max = align_up(self.response.bytes_max, align);

        // write-high / encode-low layout needs double the logical size
        let strobe_physical = match cfg.strobe_encoding {
            Encoding::Escs => self.strobe.bytes_max * 2,
            _ => self.strobe.bytes_max,
        };
        let response_physical = match cfg.command_encoding {
            Encoding::Escs => self.response.bytes_max * 2,
            _ => self.response.bytes_max,
        };

        if cfg.strobe_external_source {
            self.strobe.buffer = FrameBuffer::External(None);
            self.strobe.bytes_physical = strobe_physical;
        } else {
            self.strobe
                .allocate(strobe_physical)
                .map_err(|_| RegisterError::OutOfMemory)?;
        }
        self.response
            .allocate(response_physical)
            .map_err(|_| RegisterError::OutOfMemory)?;

        debug!(
            "lasso memory planned: strobe {}/{} response {}",
            self.strobe.bytes_total, self.strobe.bytes_max, self.response.bytes_max
        );

        self.registered = true;
        Ok(())
    }

    /// Feed one received byte, typically from the UART interrupt.
    ///
    /// A completed frame is published towards the handler; further bytes
    /// are rejected with [`Errno::NoSpace`] until the interpreter has
    /// consumed it.
    pub fn receive_byte(&mut self, byte: u8) -> Result<(), Errno> {
        if !self.registered {
            return Ok(());
        }
        if self.response.valid > 0 {
            return Err(Errno::NoSpace);
        }

        let dest = &mut self.receive.buf[..self.receive.limit];
        match self.receive.decoder.feed(byte, dest) {
            Inline::Pending => {
                self.receive.timeout = self.cfg.command_timeout_ticks;
                Ok(())
            }
            Inline::Frame(0) | Inline::Empty => {
                self.receive.timeout = 0;
                Err(Errno::NoData)
            }
            Inline::Frame(len) => {
                self.receive.timeout = 0;
                self.response.valid = len;
                Ok(())
            }
            Inline::Overrun => {
                self.receive.timeout = 0;
                Err(Errno::Overflow)
            }
            Inline::Illegal => {
                self.receive.timeout = 0;
                Err(Errno::IllegalSequence)
            }
        }
    }

    /// Point the strobe at an external, user-filled buffer.
    ///
    /// Only meaningful with `strobe_external_source`; the sampler is
    /// bypassed and the user produces the strobe payload, including any
    /// codec prefix layout.
    ///
    /// # Safety
    ///
    /// The buffer must be at least the planned physical strobe size and
    /// stay valid for the host lifetime.
    pub unsafe fn set_buffer(&mut self, buffer: NonNull<u8>) {
        self.strobe.buffer = FrameBuffer::External(Some(buffer));
    }

    /// Subtract externally counted cycles from the strobe countdown.
    pub fn countdown(&mut self, count: u16) {
        self.strobe.countdown = self.strobe.countdown.saturating_sub(count);
    }

    /// Adjust the tick period at run time, in milliseconds.
    ///
    /// Recomputes the advertisement period and the roundtrip latency.
    /// Validity is the caller's responsibility, mirroring registration-time
    /// constraints.
    pub fn tick_period(&mut self, period_ms: u16) {
        self.tick_period = period_ms;
        self.advertise_period = self.cfg.advertise_period_ticks(period_ms);
        self.roundtrip_latency = self.cfg.roundtrip_latency_ticks(period_ms);
    }

    /// Number of registered data cells
    pub fn cell_count(&self) -> u8 {
        self.cells.len() as u8
    }

    pub fn is_strobing(&self) -> bool {
        self.strobing
    }

    pub fn is_advertising(&self) -> bool {
        self.advertise
    }

    /// Sticky flag: a strobe cycle elapsed while the previous frame was
    /// still transmitting.
    pub fn overdrive(&self) -> bool {
        self.overdrive
    }

    /// Current value of the built-in timestamp cell, when configured
    pub fn timestamp(&self) -> Option<u32> {
        self.timestamp.as_deref().copied()
    }

    /// Locate a cell by its registration index.
    ///
    /// Also yields the cell's byte offset in the strobe payload: the summed
    /// footprint of the enabled cells preceding it.
    pub(crate) fn seek_cell(&self, index: u8) -> Option<(usize, usize)> {
        let index = usize::from(index);
        if index >= self.cells.len() {
            return None;
        }
        let offset = self.cells[..index]
            .iter()
            .filter(|cell| cell.ty.enabled())
            .map(|cell| cell.footprint())
            .sum();
        Some((index, offset))
    }

    /// Serial bandwidth left at the current strobe volume and period, in
    /// units of 0.01 %. Negative when the strobe does not fit the line.
    pub(crate) fn cycle_margin(&self) -> i32 {
        let period_ms = f32::from(self.strobe_period) * f32::from(self.tick_period);
        // worst-case ESCS expansion doubles the strobe on the wire
        let bits_per_byte = if self.cfg.strobe_encoding == Encoding::Escs {
            20_000.0
        } else {
            10_000.0
        };
        let bits_per_s = self.strobe.bytes_total as f32 * bits_per_byte / period_ms;
        let baud = self.cfg.baudrate as f32;
        ((baud - bits_per_s) * 10_000.0 / baud) as i32
    }

    /// The tick handler: advance all countdowns, run the sampler and the
    /// interpreter when due, then make exactly one transmit attempt.
    ///
    /// Call at the configured tick period. Does nothing until
    /// [`Host::register_mem`] has run.
    pub fn handle_com(&mut self) {
        if !self.registered {
            return;
        }

        if self.receive.timeout > 0 {
            self.receive.timeout -= 1;
            if self.receive.timeout == 0 {
                trace!("receive timeout, incomplete frame dropped");
                self.receive.decoder.reset();
            }
        }

        if self.advertise {
            self.strobe.countdown = self.strobe.countdown.wrapping_sub(1);
            if self.strobe.countdown == 0 {
                self.strobe.countdown = self.advertise_period;
                self.strobe.frame = 0;
                self.strobe.byte_count = self.signature.len();
            }
        } else if self.strobing {
            if !self.cfg.strobe_external_sync {
                self.strobe.countdown = self.strobe.countdown.wrapping_sub(1);
            }
            if self.strobe.countdown == 0 {
                self.strobe.countdown = self.strobe_period;

                if self.strobe.byte_count > 0 {
                    // previous frame still draining
                    warn!("strobe overdrive: period too short for payload");
                    self.overdrive = true;
                    self.strobe.valid = 0;
                } else {
                    self.sample_data_cells();
                    self.strobe.load();
                    self.strobe.valid = 1;
                    if self.cfg.strobe_encoding == Encoding::Cobs {
                        // byte the first chunk header will displace
                        let displaced = self.strobe.buf().map(|buf| buf[2]);
                        if let Some(byte) = displaced {
                            self.strobe.cobs_backup = byte;
                        }
                    }
                }
            }
        }

        self.response.countdown = self.response.countdown.wrapping_sub(1);
        if self.response.countdown == 0 {
            self.response.countdown = self.cfg.response_latency_ticks;

            if self.response.byte_count == 0 && self.response.valid > 0 {
                let valid = self.response.valid;
                let crc_ok =
                    !self.cfg.command_crc || (self.crc)(&self.receive.buf[..valid]) == 0;

                if crc_ok {
                    if self.receive.buf[0] == CONTROL_CODE {
                        if let Some(hook) = self.control_hook {
                            hook(&self.receive.buf[1..valid]);
                        }
                    } else {
                        self.interpret_command();
                        self.response.load();
                        if self.cfg.command_encoding == Encoding::Cobs {
                            let displaced = self.response.buf().map(|buf| buf[2]);
                            if let Some(byte) = displaced {
                                self.response.cobs_backup = byte;
                            }
                        }
                    }
                } else {
                    warn!("command crc mismatch, frame dropped");
                }
                self.response.valid = 0;
            }
        }

        self.pump();

        if let Some(counter) = self.timestamp.as_mut() {
            **counter = counter.wrapping_add(1);
        }
    }

    /// Snapshot the active data space into the strobe buffer.
    fn sample_data_cells(&mut self) {
        let cfg = self.cfg;
        let stuffed = cfg.strobe_encoding.is_stuffed();
        let dynamic = cfg.strobe_dynamics == StrobeDynamics::Dynamic;
        let bytes_max = self.strobe.bytes_max;
        let mask_bytes = self.mask_bytes;
        let crc_fn = self.crc;

        if !cfg.strobe_external_source {
            let Host { strobe, cells, .. } = self;
            let Some(buf) = strobe.buf() else {
                return;
            };

            let mut at = match cfg.strobe_encoding {
                // 0xff marks the chunk as not yet encoded
                Encoding::Cobs => {
                    buf[0] = 0xff;
                    2
                }
                // anything but the delimiter arms the lazy encoder
                Encoding::Escs => {
                    buf[0] = 0x00;
                    bytes_max
                }
                _ => 0,
            };
            if stuffed {
                buf[at] = CONTROL_CODE;
                at += 1;
            }

            let mask_at = at;
            if dynamic {
                buf[at..at + mask_bytes].fill(0);
                at += mask_bytes;
            }

            for (index, cell) in cells.iter_mut().enumerate() {
                if !cell.ty.enabled() {
                    continue;
                }
                if dynamic && !cell.strobe_due() {
                    continue;
                }
                if dynamic {
                    buf[mask_at + index / 8] |= 1 << (index % 8);
                }
                let len = cell.footprint();
                cell.sample_into(&mut buf[at..at + len], cfg.unaligned_memory_access);
                at += len;
            }

            if dynamic {
                let prefix = match cfg.strobe_encoding {
                    Encoding::Cobs => 2,
                    _ => bytes_max,
                };
                strobe.bytes_total = at - prefix;
            }
        }

        if cfg.strobe_crc {
            let width = cfg.crc_width.into_usize();
            let bytes_total = self.strobe.bytes_total;
            let Some(buf) = self.strobe.buf() else {
                return;
            };
            // checksum the payload, excluding codec headers and the strobe
            // marker but including the dynamic mask bytes
            let data_start = match cfg.strobe_encoding {
                Encoding::Cobs => 3,
                Encoding::Escs => bytes_max + 1,
                _ => 0,
            };
            let marker = usize::from(stuffed);
            // dynamic sampling recomputed bytes_total without the checksum
            let data_len = if dynamic {
                bytes_total - marker
            } else {
                bytes_total - marker - width
            };
            crc::append(crc_fn, cfg.crc_width, &mut buf[data_start..], data_len);
            if dynamic {
                self.strobe.bytes_total += width;
            }
        }
    }

    /// One transmit attempt per tick: the strobe drains first, the response
    /// gets the first free slot after it.
    fn pump(&mut self) {
        if self.strobe.byte_count > 0 {
            if self.advertise {
                // the signature is broadcast raw in every encoding
                let at = self.strobe.frame;
                let num = self.strobe.byte_count.min(self.cfg.max_frame_size);
                match self.transport.send(&self.signature[at..at + num]) {
                    Err(SendError::Busy) => {}
                    _ => {
                        self.strobe.frame += num;
                        self.strobe.byte_count -= num;
                    }
                }
            } else {
                transmit(
                    &mut self.strobe,
                    self.cfg.strobe_encoding,
                    self.cfg.max_frame_size,
                    &mut self.transport,
                );
            }
        } else {
            transmit(
                &mut self.response,
                self.cfg.command_encoding,
                self.cfg.max_frame_size,
                &mut self.transport,
            );
        }
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Send one chunk of a frame, encoding lazily on the first attempt.
fn transmit<T: Transport>(
    frame: &mut DataFrame,
    encoding: Encoding,
    max_frame_size: usize,
    transport: &mut T,
) {
    if frame.byte_count == 0 {
        return;
    }
    let at = frame.frame;

    if encoding == Encoding::Cobs {
        let num = frame.byte_count.min(cobs::MAX_PAYLOAD);
        let extended = frame.byte_count > cobs::MAX_PAYLOAD;
        let backup = frame.cobs_backup;
        let mut next_backup = backup;

        let result = {
            let Some(buf) = frame.buf() else { return };
            // a clean delimiter means the chunk survived a busy retry
            // already encoded
            if buf[at] != cobs::DELIMITER {
                buf[at + 2] = backup;
                if extended {
                    // the closing delimiter of this chunk crushes the next
                    // chunk's first payload byte
                    next_backup = buf[at + 255];
                }
                cobs::encode(&mut buf[at..], num, extended);
            }
            transport.send(&buf[at..at + num + cobs::OVERHEAD])
        };
        frame.cobs_backup = next_backup;

        match result {
            Err(SendError::Busy) => {}
            result => {
                if result.is_err() {
                    warn!("transport error, chunk dropped");
                }
                frame.frame += num;
                frame.byte_count -= num;
            }
        }
        return;
    }

    if encoding == Encoding::Escs {
        let bytes_max = frame.bytes_max;
        let count = frame.byte_count;
        let mut encoded = None;
        if at == 0 {
            let Some(buf) = frame.buf() else { return };
            // a leading delimiter means the frame survived a busy retry
            // already encoded
            if buf[0] != escs::DELIMITER {
                let mut w = at;
                buf[w] = escs::DELIMITER;
                w += 1;
                for i in 0..count {
                    let byte = buf[bytes_max + i];
                    if byte == escs::DELIMITER || byte == escs::ESCAPE {
                        buf[w] = escs::ESCAPE;
                        w += 1;
                        buf[w] = byte - 0x20;
                    } else {
                        buf[w] = byte;
                    }
                    w += 1;
                }
                buf[w] = escs::DELIMITER;
                encoded = Some(w + 1 - at);
            }
        }
        if let Some(len) = encoded {
            // encoding changes the frame length
            frame.byte_count = len;
        }
    }

    // RN responses, raw strobes and encoded ESCS frames drain here
    let num = frame.byte_count.min(max_frame_size);
    let result = {
        let Some(buf) = frame.buf() else { return };
        transport.send(&buf[at..at + num])
    };
    match result {
        Err(SendError::Busy) => {}
        result => {
            if result.is_err() {
                warn!("transport error, chunk dropped");
            }
            frame.frame += num;
            frame.byte_count -= num;
        }
    }
}
