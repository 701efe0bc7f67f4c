//! Lasso protocol core data types
//!
//! This crate provides basic data type definitions used by other Lasso crates.
//! Lasso users should not depend on this crate directly. Use the `lasso::core`
//! reexport instead.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Protocol error code carried in every reply frame
///
/// The numeric encoding is part of the wire protocol and follows the errno
/// numbering the original hosts report, so existing clients keep decoding
/// replies unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum Errno {
    /// Transport-level failure
    Io = 5,
    /// Allocation failed at registration time
    OutOfMemory = 12,
    /// Write to a cell without the writeable bit
    PermissionDenied = 13,
    /// Data cell index outside the registered data space
    BadAddress = 14,
    /// Transmitter back-pressure, retry next tick
    Busy = 16,
    /// Malformed or out-of-range command argument
    InvalidArgument = 22,
    /// A second complete frame arrived before the first was consumed
    NoSpace = 28,
    /// Empty frame
    NoData = 61,
    /// Unknown opcode
    OpNotSupported = 95,
    /// Unknown or unsupported data cell type
    NotSupported = 134,
    /// Delimiter sequence violation in the incoming byte stream
    IllegalSequence = 138,
    /// Incoming frame exceeds the command buffer
    Overflow = 139,
    /// Reply formatting ran out of buffer, reply reduced to the error code
    Cancelled = 140,
}

impl Errno {
    pub const fn into_i32(self) -> i32 {
        self as i32
    }
}

impl From<Errno> for i32 {
    fn from(value: Errno) -> Self {
        value.into_i32()
    }
}

/// Byte-stuffing scheme of a frame stream
///
/// The numeric encoding is transmitted inside [`ProtocolInfo`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Encoding {
    /// Raw bytes, no delimiter. Valid for strobes only.
    None = 0,
    /// `\r\n` terminated frames, ASCII payloads only
    Rn = 1,
    /// Consistent overhead byte stuffing, `0x00` delimiter
    Cobs = 2,
    /// Escape sequences, `0x7e` delimiter and `0x7d` escape
    Escs = 3,
}

impl Encoding {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }

    /// Byte-stuffed encodings keep the delimiter out of band, which lets
    /// strobe and response frames interleave on one channel.
    pub const fn is_stuffed(self) -> bool {
        matches!(self, Encoding::Cobs | Encoding::Escs)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ProcessingMode {
    Ascii = 0,
    MsgPack = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StrobeDynamics {
    /// Every enabled cell contributes to every strobe
    Static = 0,
    /// Cells contribute at their own update rate, flagged by a mask prefix
    Dynamic = 1,
}

/// Truncation width of the pluggable CRC
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CrcWidth {
    One = 1,
    Two = 2,
    Four = 4,
}

impl CrcWidth {
    pub const fn into_usize(self) -> usize {
        self as usize
    }

    /// Two-bit field value used in [`ProtocolInfo`] (width minus one)
    pub const fn info_bits(self) -> u32 {
        self as u32 - 1
    }
}

/// Semantic kind of a data cell, bits 4..=7 of [`CellType`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CellKind {
    Bool = 0,
    Char = 1,
    Uint = 2,
    Int = 3,
    Float = 4,
}

impl CellKind {
    pub const fn try_from_u8(code: u8) -> Option<CellKind> {
        match code {
            0 => Some(CellKind::Bool),
            1 => Some(CellKind::Char),
            2 => Some(CellKind::Uint),
            3 => Some(CellKind::Int),
            4 => Some(CellKind::Float),
            _ => None,
        }
    }
}

/// Packed 16-bit data cell type descriptor
///
/// The bit layout is stable on-wire:
/// * bit 0: enabled in the current strobe
/// * bits 1..=3: byte width (`0` means 1 byte, otherwise the width itself)
/// * bits 4..=7: [`CellKind`]
/// * bit 8: writeable by the client
/// * bit 9: permanent strobe member
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellType(u16);

impl CellType {
    pub const ENABLE: u16 = 0x0001;
    pub const WRITEABLE: u16 = 0x0100;
    pub const PERMANENT: u16 = 0x0200;

    const WIDTH_MASK: u16 = 0x000e;
    const KIND_MASK: u16 = 0x00f0;
    const KIND_SHIFT: u16 = 4;
    const KIND_WIDTH_MASK: u16 = Self::KIND_MASK | Self::WIDTH_MASK;

    pub const BOOL: CellType = CellType(0x0000);
    pub const CHAR: CellType = CellType(0x0010);
    pub const UINT8: CellType = CellType(0x0020);
    pub const INT8: CellType = CellType(0x0030);
    pub const UINT16: CellType = CellType(0x0022);
    pub const INT16: CellType = CellType(0x0032);
    pub const UINT32: CellType = CellType(0x0024);
    pub const INT32: CellType = CellType(0x0034);
    pub const UINT64: CellType = CellType(0x0028);
    pub const INT64: CellType = CellType(0x0038);
    pub const FLOAT: CellType = CellType(0x0044);
    pub const DOUBLE: CellType = CellType(0x0048);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u16 {
        self.0
    }

    pub const fn with(self, flags: u16) -> Self {
        Self(self.0 | flags)
    }

    pub const fn kind(self) -> Option<CellKind> {
        CellKind::try_from_u8(((self.0 & Self::KIND_MASK) >> Self::KIND_SHIFT) as u8)
    }

    /// Kind and width bits only, the discriminant used for value dispatch
    pub const fn shape_bits(self) -> u16 {
        self.0 & Self::KIND_WIDTH_MASK
    }

    /// Element width in bytes (the zero width field encodes 1 byte)
    pub const fn byte_width(self) -> usize {
        match self.0 & Self::WIDTH_MASK {
            0 => 1,
            w => w as usize,
        }
    }

    pub const fn enabled(self) -> bool {
        self.0 & Self::ENABLE != 0
    }

    pub const fn writeable(self) -> bool {
        self.0 & Self::WRITEABLE != 0
    }

    pub const fn permanent(self) -> bool {
        self.0 & Self::PERMANENT != 0
    }

    pub const fn enable(&mut self) {
        self.0 |= Self::ENABLE;
    }

    pub const fn disable(&mut self) {
        self.0 &= !Self::ENABLE;
    }

    pub const fn make_permanent(&mut self) {
        self.0 |= Self::PERMANENT | Self::ENABLE;
    }

    /// Strobe footprint of `count` elements of this type
    pub const fn footprint(self, count: u16) -> usize {
        count as usize * self.byte_width()
    }
}

impl From<CellType> for u16 {
    fn from(value: CellType) -> Self {
        value.into_bits()
    }
}

impl From<u16> for CellType {
    fn from(value: u16) -> Self {
        CellType::from_bits(value)
    }
}

/// Single-character command opcodes
///
/// GET opcodes are lowercase, SET opcodes uppercase. `0xc1` is reserved for
/// the control passthrough and never reaches the interpreter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    GetProtocolInfo = b'i',
    GetTimingInfo = b't',
    GetDataCellCount = b'n',
    GetDataCellParams = b'p',
    GetDataCellValue = b'v',
    SetAdvertise = b'A',
    SetStrobePeriod = b'P',
    SetDataCellStrobe = b'S',
    SetDataCellValue = b'V',
    SetDataSpaceStrobe = b'W',
}

impl Opcode {
    pub const fn try_from_u8(code: u8) -> Option<Opcode> {
        match code {
            b'i' => Some(Opcode::GetProtocolInfo),
            b't' => Some(Opcode::GetTimingInfo),
            b'n' => Some(Opcode::GetDataCellCount),
            b'p' => Some(Opcode::GetDataCellParams),
            b'v' => Some(Opcode::GetDataCellValue),
            b'A' => Some(Opcode::SetAdvertise),
            b'P' => Some(Opcode::SetStrobePeriod),
            b'S' => Some(Opcode::SetDataCellStrobe),
            b'V' => Some(Opcode::SetDataCellValue),
            b'W' => Some(Opcode::SetDataSpaceStrobe),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }

    pub const fn is_get(self) -> bool {
        self.into_u8() >= b'a'
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// First byte of a control passthrough command, also the invalid MessagePack
/// head byte that prefixes strobes on a shared byte-stuffed channel.
pub const CONTROL_CODE: u8 = 0xc1;

/// Maximum cycles between two strobes
pub const STROBE_SLOWEST: u16 = 65535;

/// Packed 32-bit protocol description advertised in the host signature
///
/// Layout:
/// * bits 0..=1: command encoding
/// * bit 2: strobe encoding equals command encoding
/// * bit 3: processing mode
/// * bit 4: strobe dynamics
/// * bits 5..=6: CRC byte width minus one
/// * bit 7: command CRC enabled
/// * bit 8: strobe CRC enabled
/// * bit 9: little-endian strobe data
/// * bits 10..=15: command buffer size minus one
/// * bits 16..=23: response buffer size minus one
/// * bits 24..=31: frame size in 256-byte steps, minus one
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolInfo(u32);

pub struct ProtocolInfoFields {
    pub command_encoding: Encoding,
    pub strobe_encoding: Encoding,
    pub processing_mode: ProcessingMode,
    pub strobe_dynamics: StrobeDynamics,
    pub crc_width: CrcWidth,
    pub command_crc: bool,
    pub strobe_crc: bool,
    pub little_endian: bool,
    pub command_buffer_size: u32,
    pub response_buffer_size: u32,
    pub max_frame_size: u32,
}

impl ProtocolInfo {
    pub const fn new(fields: &ProtocolInfoFields) -> Self {
        let matched = fields.command_encoding as u32 == fields.strobe_encoding as u32;
        Self(
            fields.command_encoding as u32
                | (matched as u32) << 2
                | (fields.processing_mode as u32) << 3
                | (fields.strobe_dynamics as u32) << 4
                | fields.crc_width.info_bits() << 5
                | (fields.command_crc as u32) << 7
                | (fields.strobe_crc as u32) << 8
                | (fields.little_endian as u32) << 9
                | (fields.command_buffer_size - 1) << 10
                | (fields.response_buffer_size - 1) << 16
                | ((fields.max_frame_size >> 8) - 1) << 24,
        )
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u32 {
        self.0
    }
}

impl From<ProtocolInfo> for u32 {
    fn from(value: ProtocolInfo) -> Self {
        value.into_bits()
    }
}
