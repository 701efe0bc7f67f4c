//! Host configuration
//!
//! All protocol options are gathered in one [`Config`] value and validated
//! once when the [`Host`](crate::host::Host) is created. Invalid flag
//! combinations are rejected up front so the hot path never re-checks them.

use lasso_core::{CrcWidth, Encoding, ProcessingMode, ProtocolInfo, ProtocolInfoFields, StrobeDynamics};

/// Advertisement broadcast period in milliseconds
pub const ADVERTISE_PERIOD_MS: u16 = 250;

/// Largest admissible command (receive) buffer
pub const COMMAND_BUFFER_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Tick period must stay below the advertisement period
    InvalidTickPeriod,
    /// Command buffer size outside 16..=64
    InvalidCommandBufferSize,
    /// Response buffer size outside 32..=256
    InvalidResponseBufferSize,
    /// Strobe period bounds empty or default outside them
    InvalidStrobePeriod,
    InvalidCommandTimeout,
    InvalidResponseLatency,
    /// Commands always need a frame delimiter
    InvalidCommandEncoding,
    /// Strobes are never RN framed
    InvalidStrobeEncoding,
    /// A stuffed strobe encoding must match the command encoding
    EncodingMismatch,
    /// RN commands imply ASCII processing
    AsciiModeRequired,
    /// RN frames carry no CRC
    CommandCrcForbidden,
    /// Dynamic strobing needs a stuffed strobe encoding
    DynamicNeedsStuffing,
    /// Frame size must be a non-zero multiple of 256, at most 65536
    InvalidFrameSize,
    /// Alignment must be a power of two
    InvalidAlignment,
    InvalidBaudrate,
}

/// Host configuration, resolved at construction
///
/// The defaults reproduce a plain RN/ASCII terminal host. Constraints are
/// checked by [`Config::validate`]:
/// RN commands imply ASCII processing, an unencoded strobe and no command
/// CRC; dynamic strobing requires a byte-stuffed strobe; a stuffed strobe
/// must share the command encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Scheduler granularity in milliseconds, 1..=249
    pub tick_period_ms: u16,
    /// Incoming command buffer in bytes, 16..=64
    pub command_buffer_size: usize,
    /// Outgoing response buffer in bytes, 32..=256
    pub response_buffer_size: usize,
    pub strobe_period_min_ticks: u16,
    pub strobe_period_max_ticks: u16,
    /// Initial strobe period, defaults to the minimum
    pub strobe_period_ticks: u16,
    /// Ticks of receive inactivity before an incomplete frame is dropped
    pub command_timeout_ticks: u16,
    /// Maximum ticks between command receipt and the first reply byte
    pub response_latency_ticks: u16,
    pub command_encoding: Encoding,
    pub strobe_encoding: Encoding,
    pub processing_mode: ProcessingMode,
    pub strobe_dynamics: StrobeDynamics,
    pub crc_width: CrcWidth,
    pub command_crc: bool,
    pub strobe_crc: bool,
    /// Transmission chunk limit, a multiple of 256
    pub max_frame_size: usize,
    /// Serial line rate, used for latency and margin arithmetic
    pub baudrate: u32,
    pub little_endian: bool,
    /// Whether the sampler may issue unaligned word stores
    pub unaligned_memory_access: bool,
    /// Buffer alignment boundary, a power of two
    pub memory_align: usize,
    /// Register a tick-counting timestamp cell first
    pub timestamp: bool,
    /// Strobe countdown is driven by [`Host::countdown`](crate::host::Host::countdown)
    pub strobe_external_sync: bool,
    /// Strobe payload is produced into a user-supplied buffer
    pub strobe_external_source: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period_ms: 10,
            command_buffer_size: 64,
            response_buffer_size: 96,
            strobe_period_min_ticks: 10,
            strobe_period_max_ticks: lasso_core::STROBE_SLOWEST,
            strobe_period_ticks: 10,
            command_timeout_ticks: 5,
            response_latency_ticks: 1,
            command_encoding: Encoding::Rn,
            strobe_encoding: Encoding::None,
            processing_mode: ProcessingMode::Ascii,
            strobe_dynamics: StrobeDynamics::Static,
            crc_width: CrcWidth::Two,
            command_crc: false,
            strobe_crc: false,
            max_frame_size: 4096,
            baudrate: 115_200,
            little_endian: cfg!(target_endian = "little"),
            unaligned_memory_access: false,
            memory_align: 4,
            timestamp: false,
            strobe_external_sync: false,
            strobe_external_source: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 || self.tick_period_ms >= ADVERTISE_PERIOD_MS {
            return Err(ConfigError::InvalidTickPeriod);
        }
        if !(16..=COMMAND_BUFFER_MAX).contains(&self.command_buffer_size) {
            return Err(ConfigError::InvalidCommandBufferSize);
        }
        if !(32..=256).contains(&self.response_buffer_size) {
            return Err(ConfigError::InvalidResponseBufferSize);
        }
        if self.strobe_period_min_ticks == 0
            || self.strobe_period_max_ticks < self.strobe_period_min_ticks
            || self.strobe_period_ticks < self.strobe_period_min_ticks
            || self.strobe_period_ticks > self.strobe_period_max_ticks
        {
            return Err(ConfigError::InvalidStrobePeriod);
        }
        if self.command_timeout_ticks == 0 {
            return Err(ConfigError::InvalidCommandTimeout);
        }
        if self.response_latency_ticks == 0 {
            return Err(ConfigError::InvalidResponseLatency);
        }
        if self.command_encoding == Encoding::None {
            return Err(ConfigError::InvalidCommandEncoding);
        }
        if self.strobe_encoding == Encoding::Rn {
            return Err(ConfigError::InvalidStrobeEncoding);
        }
        if self.command_encoding == Encoding::Rn {
            if self.processing_mode != ProcessingMode::Ascii {
                return Err(ConfigError::AsciiModeRequired);
            }
            if self.strobe_encoding != Encoding::None {
                return Err(ConfigError::InvalidStrobeEncoding);
            }
            if self.command_crc {
                return Err(ConfigError::CommandCrcForbidden);
            }
        }
        if self.strobe_encoding.is_stuffed() && self.strobe_encoding != self.command_encoding {
            return Err(ConfigError::EncodingMismatch);
        }
        if self.strobe_dynamics == StrobeDynamics::Dynamic && !self.strobe_encoding.is_stuffed() {
            return Err(ConfigError::DynamicNeedsStuffing);
        }
        if self.max_frame_size == 0
            || self.max_frame_size % 256 != 0
            || self.max_frame_size > 65536
        {
            return Err(ConfigError::InvalidFrameSize);
        }
        if !self.memory_align.is_power_of_two() {
            return Err(ConfigError::InvalidAlignment);
        }
        if self.baudrate == 0 {
            return Err(ConfigError::InvalidBaudrate);
        }
        Ok(())
    }

    /// Advertisement period in ticks at the given tick period
    pub(crate) fn advertise_period_ticks(&self, tick_period_ms: u16) -> u16 {
        ADVERTISE_PERIOD_MS.div_ceil(tick_period_ms).max(1)
    }

    /// Worst-case command-to-reply latency in ticks at the given tick period
    ///
    /// Command bytes in plus reply bytes out at the configured baudrate,
    /// plus the handler reaction and treatment margin. Assumes strobing is
    /// off; while strobing the reply additionally awaits the strobe drain.
    pub(crate) fn roundtrip_latency_ticks(&self, tick_period_ms: u16) -> u16 {
        let wire_bits = (self.command_buffer_size + self.response_buffer_size) as u32 * 10 * 1000;
        let wire_ticks = wire_bits / self.baudrate / u32::from(tick_period_ms);
        (wire_ticks as u16)
            .saturating_add(self.response_latency_ticks)
            .saturating_add(2)
    }

    pub(crate) fn protocol_info(&self) -> ProtocolInfo {
        ProtocolInfo::new(&ProtocolInfoFields {
            command_encoding: self.command_encoding,
            strobe_encoding: self.strobe_encoding,
            processing_mode: self.processing_mode,
            strobe_dynamics: self.strobe_dynamics,
            crc_width: self.crc_width,
            command_crc: self.command_crc,
            strobe_crc: self.strobe_crc,
            little_endian: self.little_endian,
            command_buffer_size: self.command_buffer_size as u32,
            response_buffer_size: self.response_buffer_size as u32,
            max_frame_size: self.max_frame_size as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_rn_constraints() {
        let mut cfg = Config::default();
        cfg.processing_mode = ProcessingMode::MsgPack;
        assert_eq!(cfg.validate(), Err(ConfigError::AsciiModeRequired));

        let mut cfg = Config::default();
        cfg.strobe_encoding = Encoding::Cobs;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidStrobeEncoding));

        let mut cfg = Config::default();
        cfg.command_crc = true;
        assert_eq!(cfg.validate(), Err(ConfigError::CommandCrcForbidden));
    }

    #[test]
    fn test_stuffed_encodings_must_match() {
        let mut cfg = Config::default();
        cfg.command_encoding = Encoding::Cobs;
        cfg.strobe_encoding = Encoding::Escs;
        assert_eq!(cfg.validate(), Err(ConfigError::EncodingMismatch));

        cfg.strobe_encoding = Encoding::Cobs;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_dynamic_needs_stuffing() {
        let mut cfg = Config::default();
        cfg.strobe_dynamics = StrobeDynamics::Dynamic;
        assert_eq!(cfg.validate(), Err(ConfigError::DynamicNeedsStuffing));

        cfg.command_encoding = Encoding::Cobs;
        cfg.strobe_encoding = Encoding::Cobs;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_timing_helpers() {
        let cfg = Config {
            command_buffer_size: 16,
            response_buffer_size: 96,
            ..Config::default()
        };
        assert_eq!(cfg.advertise_period_ticks(10), 25);
        // (16 + 96) * 10_000 bits / 115200 baud / 10 ms = 0 ticks, + 1 + 2
        assert_eq!(cfg.roundtrip_latency_ticks(10), 3);
    }
}
