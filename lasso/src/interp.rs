//! Command interpreter
//!
//! Parses one received command frame, dispatches the opcode against the
//! scheduler and the data cell registry, and renders the reply into the
//! response frame. Replies echo the opcode and end in the numeric error
//! code, `0` on success.

use core::fmt::Write as _;

use lasso_core::{CellType, Encoding, Errno, Opcode, ProcessingMode};
use lasso_encoding::msgpack::{PackReader, PackWriter};
use lasso_encoding::{cobs, crc, rn};

use crate::cell::Value;
use crate::config::COMMAND_BUFFER_MAX;
use crate::host::{Host, Transport};
use crate::wire::{self, Args, Cursor};

/// Version string reported by GetProtocolInfo
const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// How a handled opcode is answered
enum Outcome {
    /// Opcode-specific payload was written, append the success code
    Reply,
    /// Acknowledgement only: opcode and error code
    Tiny,
    /// No reply at all
    Silent,
}

impl<T: Transport> Host<T> {
    /// Interpret the pending command and format the reply, if any.
    ///
    /// Leaves `response.bytes_total` at zero when the command is answered
    /// silently.
    pub(crate) fn interpret_command(&mut self) {
        self.response.bytes_total = 0;
        let len = self.response.valid;
        let mut cmd = [0u8; COMMAND_BUFFER_MAX];
        cmd[..len].copy_from_slice(&self.receive.buf[..len]);

        match self.cfg.processing_mode {
            ProcessingMode::Ascii => self.interpret_ascii(&cmd[..len]),
            ProcessingMode::MsgPack => self.interpret_msgpack(&cmd[..len]),
        }
    }

    fn interpret_ascii(&mut self, cmd: &[u8]) {
        let opcode = cmd[0];
        if self.strobing && !self.cfg.strobe_encoding.is_stuffed() && opcode >= b'a' {
            // raw strobes and replies cannot interleave, queries are dropped
            return;
        }

        // a trailing CRC may leave non-ASCII bytes behind the arguments
        let text = match core::str::from_utf8(&cmd[1..]) {
            Ok(text) => text,
            Err(err) => {
                core::str::from_utf8(&cmd[1..1 + err.valid_up_to()]).unwrap_or("")
            }
        };
        let mut args = Args::new(text);

        let mut scratch = [0u8; 256];
        let cap = self.cfg.response_buffer_size;
        let mut cur = Cursor::new(&mut scratch[..cap]);
        let _ = cur.push(opcode);
        let _ = cur.push(b',');

        let code = match self.run_ascii(opcode, &mut args, &mut cur) {
            Ok(Outcome::Silent) => return,
            Ok(Outcome::Reply) => 0,
            Ok(Outcome::Tiny) => {
                cur.rewind(2);
                0
            }
            Err(err) => {
                // a failed reply collapses to opcode and error code
                cur.rewind(2);
                err.into_i32()
            }
        };
        if write!(cur, "{}", code).is_err() {
            cur.rewind(2);
            let _ = write!(cur, "{}", Errno::Cancelled.into_i32());
        }
        let len = cur.at();
        self.finish_reply(&scratch[..len]);
    }

    fn run_ascii(
        &mut self,
        opcode: u8,
        args: &mut Args<'_>,
        cur: &mut Cursor<'_>,
    ) -> Result<Outcome, Errno> {
        let full = |_| Errno::Cancelled;
        let opcode = Opcode::try_from_u8(opcode).ok_or(Errno::OpNotSupported)?;
        match opcode {
            Opcode::GetProtocolInfo => {
                let info = self.cfg.protocol_info().into_bits();
                write!(cur, "{},{},", info, VERSION).map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetTimingInfo => {
                write!(
                    cur,
                    "{},{},{},{},{},{},{},",
                    self.tick_period,
                    self.cfg.command_timeout_ticks,
                    self.roundtrip_latency,
                    self.cfg.strobe_period_min_ticks,
                    self.cfg.strobe_period_max_ticks,
                    self.strobe_period,
                    self.cycle_margin(),
                )
                .map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetDataCellCount => {
                write!(cur, "{},", self.cell_count()).map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetDataCellParams => {
                let index = args.next_u8()?;
                let (index, offset) = self.seek_cell(index).ok_or(Errno::BadAddress)?;
                let cell = &self.cells[index];
                write!(
                    cur,
                    "{},{},{},{},{},{},",
                    cell.name(),
                    cell.cell_type().into_bits(),
                    cell.count(),
                    cell.unit(),
                    cell.update_reload(),
                    offset,
                )
                .map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetDataCellValue => {
                let index = args.next_u8()?;
                let (index, _) = self.seek_cell(index).ok_or(Errno::BadAddress)?;
                match self.cells[index].read() {
                    Some(value) => wire::write_value(cur, &value).map_err(full)?,
                    // dataless cell of an external strobe source
                    None => write!(cur, "0,").map_err(full)?,
                }
                Ok(Outcome::Reply)
            }
            Opcode::SetAdvertise => Ok(self.op_set_advertise()),
            Opcode::SetStrobePeriod => {
                let period = args.next_u16()?;
                self.op_set_period(period)
            }
            Opcode::SetDataSpaceStrobe => {
                let on = args.next_u32()? != 0;
                Ok(self.op_set_space_strobe(on))
            }
            Opcode::SetDataCellStrobe => {
                if self.strobing {
                    // changing the strobe length mid-stream is not possible
                    return if self.cfg.strobe_encoding.is_stuffed() {
                        Err(Errno::Busy)
                    } else {
                        Ok(Outcome::Silent)
                    };
                }
                let index = args.next_u8()?;
                let enable = args.next_u32()? != 0;
                self.op_set_cell_strobe(index, enable)
            }
            Opcode::SetDataCellValue => {
                let result = self.write_cell_ascii(args);
                self.op_value_outcome(result)
            }
        }
    }

    fn write_cell_ascii(&mut self, args: &mut Args<'_>) -> Result<(), Errno> {
        let index = args.next_u8()?;
        let (index, _) = self.seek_cell(index).ok_or(Errno::BadAddress)?;
        let cell = &self.cells[index];
        if !cell.cell_type().writeable() {
            return Err(Errno::PermissionDenied);
        }
        let value = wire::parse_value(cell.cell_type(), args.rest())?;
        if cell.offer(&value) {
            cell.store(&value);
        }
        Ok(())
    }

    fn interpret_msgpack(&mut self, cmd: &[u8]) {
        let mut reader = PackReader::new(cmd);
        // commands are [opcode, [args...]]; anything else is dropped
        match reader.open_array() {
            Ok(2) => {}
            _ => return,
        }
        let Ok(opcode) = reader.read_u32() else { return };
        let Ok(opcode) = u8::try_from(opcode) else { return };
        if reader.open_array().is_err() {
            return;
        }

        if self.strobing && !self.cfg.strobe_encoding.is_stuffed() && opcode >= b'a' {
            return;
        }

        let mut scratch = [0u8; 256];
        let cap = self.cfg.response_buffer_size;

        let built = {
            let mut writer = PackWriter::new(&mut scratch[..cap]);
            let header = writer
                .open_array(3)
                .and_then(|_| writer.put_u32(u32::from(opcode)));
            if header.is_err() {
                return;
            }
            match self.run_msgpack(opcode, &mut reader, &mut writer) {
                Ok(Outcome::Silent) => return,
                Ok(Outcome::Reply) => match writer.put_i32(0) {
                    Ok(()) => Ok(writer.offset()),
                    Err(_) => Err(Errno::Cancelled),
                },
                Ok(Outcome::Tiny) => {
                    // acknowledgement carries an empty payload array
                    match writer.open_array(0).and_then(|_| writer.put_i32(0)) {
                        Ok(()) => Ok(writer.offset()),
                        Err(_) => Err(Errno::Cancelled),
                    }
                }
                Err(err) => Err(err),
            }
        };

        let len = match built {
            Ok(len) => len,
            Err(err) => {
                // rebuild as [opcode, [], err]
                let mut writer = PackWriter::new(&mut scratch[..cap]);
                let _ = writer.open_array(3);
                let _ = writer.put_u32(u32::from(opcode));
                let _ = writer.open_array(0);
                let _ = writer.put_i32(err.into_i32());
                writer.offset()
            }
        };
        self.finish_reply(&scratch[..len]);
    }

    fn run_msgpack(
        &mut self,
        opcode: u8,
        reader: &mut PackReader<'_>,
        writer: &mut PackWriter<'_>,
    ) -> Result<Outcome, Errno> {
        let full = |_| Errno::Cancelled;
        let bad = |_| Errno::InvalidArgument;
        let opcode = Opcode::try_from_u8(opcode).ok_or(Errno::OpNotSupported)?;
        match opcode {
            Opcode::GetProtocolInfo => {
                writer.open_array(2).map_err(full)?;
                writer
                    .put_u32(self.cfg.protocol_info().into_bits())
                    .map_err(full)?;
                writer.put_str(VERSION).map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetTimingInfo => {
                writer.open_array(7).map_err(full)?;
                writer.put_u32(u32::from(self.tick_period)).map_err(full)?;
                writer
                    .put_u32(u32::from(self.cfg.command_timeout_ticks))
                    .map_err(full)?;
                writer
                    .put_u32(u32::from(self.roundtrip_latency))
                    .map_err(full)?;
                writer
                    .put_u32(u32::from(self.cfg.strobe_period_min_ticks))
                    .map_err(full)?;
                writer
                    .put_u32(u32::from(self.cfg.strobe_period_max_ticks))
                    .map_err(full)?;
                writer.put_u32(u32::from(self.strobe_period)).map_err(full)?;
                writer.put_i32(self.cycle_margin()).map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetDataCellCount => {
                writer.open_array(1).map_err(full)?;
                writer.put_u32(u32::from(self.cell_count())).map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetDataCellParams => {
                let index = reader.read_u8().map_err(bad)?;
                let (index, offset) = self.seek_cell(index).ok_or(Errno::BadAddress)?;
                let cell = &self.cells[index];
                writer.open_array(6).map_err(full)?;
                writer.put_str(cell.name()).map_err(full)?;
                writer
                    .put_u32(u32::from(cell.cell_type().into_bits()))
                    .map_err(full)?;
                writer.put_u32(u32::from(cell.count())).map_err(full)?;
                writer.put_str(cell.unit()).map_err(full)?;
                writer
                    .put_u32(u32::from(cell.update_reload()))
                    .map_err(full)?;
                writer.put_u32(offset as u32).map_err(full)?;
                Ok(Outcome::Reply)
            }
            Opcode::GetDataCellValue => {
                let index = reader.read_u8().map_err(bad)?;
                let (index, _) = self.seek_cell(index).ok_or(Errno::BadAddress)?;
                writer.open_array(1).map_err(full)?;
                match self.cells[index].read() {
                    Some(Value::Bool(v)) => writer.put_bool(v).map_err(full)?,
                    Some(Value::U8(v)) => writer.put_u32(u32::from(v)).map_err(full)?,
                    Some(Value::I8(v)) => writer.put_i32(i32::from(v)).map_err(full)?,
                    Some(Value::U16(v)) => writer.put_u32(u32::from(v)).map_err(full)?,
                    Some(Value::I16(v)) => writer.put_i32(i32::from(v)).map_err(full)?,
                    Some(Value::U32(v)) => writer.put_u32(v).map_err(full)?,
                    Some(Value::I32(v)) => writer.put_i32(v).map_err(full)?,
                    Some(Value::F32(v)) => writer.put_f32(v).map_err(full)?,
                    Some(Value::Str(bytes)) => writer.put_raw(bytes).map_err(full)?,
                    // 64-bit integers and doubles have no wire encoding here
                    Some(_) => return Err(Errno::NotSupported),
                    None => writer.put_u32(0).map_err(full)?,
                }
                Ok(Outcome::Reply)
            }
            Opcode::SetAdvertise => Ok(self.op_set_advertise()),
            Opcode::SetStrobePeriod => {
                let period = reader.read_u16().map_err(bad)?;
                self.op_set_period(period)
            }
            Opcode::SetDataSpaceStrobe => {
                let on = reader.read_u32().map_err(bad)? != 0;
                Ok(self.op_set_space_strobe(on))
            }
            Opcode::SetDataCellStrobe => {
                if self.strobing {
                    return if self.cfg.strobe_encoding.is_stuffed() {
                        Err(Errno::Busy)
                    } else {
                        Ok(Outcome::Silent)
                    };
                }
                let index = reader.read_u8().map_err(bad)?;
                let enable = reader.read_u32().map_err(bad)? != 0;
                self.op_set_cell_strobe(index, enable)
            }
            Opcode::SetDataCellValue => {
                let result = self.write_cell_msgpack(reader);
                self.op_value_outcome(result)
            }
        }
    }

    fn write_cell_msgpack(&mut self, reader: &mut PackReader<'_>) -> Result<(), Errno> {
        let bad = |_| Errno::InvalidArgument;
        let index = reader.read_u8().map_err(bad)?;
        let (index, _) = self.seek_cell(index).ok_or(Errno::BadAddress)?;
        let cell = &self.cells[index];
        if !cell.cell_type().writeable() {
            return Err(Errno::PermissionDenied);
        }
        let ty = cell.cell_type();
        let shape = ty.shape_bits();
        let value = if shape == CellType::BOOL.shape_bits() {
            Value::Bool(reader.read_u8().map_err(bad)? != 0)
        } else if shape == CellType::UINT8.shape_bits() {
            Value::U8(reader.read_u8().map_err(bad)?)
        } else if shape == CellType::INT8.shape_bits() {
            Value::I8(reader.read_i8().map_err(bad)?)
        } else if shape == CellType::CHAR.shape_bits() {
            Value::Str(reader.read_raw().map_err(bad)?)
        } else if shape == CellType::UINT16.shape_bits() {
            Value::U16(reader.read_u16().map_err(bad)?)
        } else if shape == CellType::INT16.shape_bits() {
            Value::I16(reader.read_i16().map_err(bad)?)
        } else if shape == CellType::UINT32.shape_bits() {
            Value::U32(reader.read_u32().map_err(bad)?)
        } else if shape == CellType::INT32.shape_bits() {
            Value::I32(reader.read_i32().map_err(bad)?)
        } else if shape == CellType::FLOAT.shape_bits() {
            Value::F32(reader.read_f32().map_err(bad)?)
        } else if shape == CellType::UINT64.shape_bits()
            || shape == CellType::INT64.shape_bits()
            || shape == CellType::DOUBLE.shape_bits()
        {
            return Err(Errno::NotSupported);
        } else {
            return Err(Errno::InvalidArgument);
        };
        if cell.offer(&value) {
            cell.store(&value);
        }
        Ok(())
    }

    /// Return to advertising; stops strobing, never replies.
    fn op_set_advertise(&mut self) -> Outcome {
        self.advertise = true;
        if self.strobing {
            self.strobing = false;
            if let Some(hook) = self.activation_hook {
                hook(false);
            }
        }
        // drop any in-flight strobe and advertise promptly
        self.strobe.byte_count = 0;
        self.strobe.countdown = 1;
        trace!("advertising resumed");
        Outcome::Silent
    }

    fn op_set_period(&mut self, period: u16) -> Result<Outcome, Errno> {
        if period < self.cfg.strobe_period_min_ticks || period > self.cfg.strobe_period_max_ticks {
            return Err(Errno::InvalidArgument);
        }
        let period = match self.period_hook {
            Some(hook) => hook(period),
            None => period,
        };
        self.strobe_period = period;
        if self.strobe.countdown > period {
            self.strobe.countdown = period;
        }
        if self.advertise {
            // the period is adjusted but no reply interrupts the signature
            return Ok(Outcome::Silent);
        }
        if self.strobing && !self.cfg.strobe_encoding.is_stuffed() {
            return Ok(Outcome::Silent);
        }
        Ok(Outcome::Tiny)
    }

    fn op_set_space_strobe(&mut self, on: bool) -> Outcome {
        if on {
            if !self.strobing {
                // first strobe on the next cycle
                self.strobe.countdown = 1;
            }
            self.strobing = true;
        } else {
            // stops at the next cycle boundary
            self.strobing = false;
        }
        if let Some(hook) = self.activation_hook {
            hook(self.strobing);
        }
        if self.advertise {
            // cancel an in-flight signature, the reply is suppressed
            self.strobe.byte_count = 0;
            self.advertise = false;
            return Outcome::Silent;
        }
        if !self.cfg.strobe_encoding.is_stuffed() {
            return Outcome::Silent;
        }
        Outcome::Tiny
    }

    fn op_set_cell_strobe(&mut self, index: u8, enable: bool) -> Result<Outcome, Errno> {
        let (index, _) = self.seek_cell(index).ok_or(Errno::BadAddress)?;
        let cell = &mut self.cells[index];
        let footprint = cell.footprint();
        if enable {
            if !cell.cell_type().enabled() {
                cell.ty.enable();
                self.strobe.bytes_total += footprint;
            }
        } else if cell.cell_type().enabled() {
            if cell.cell_type().permanent() {
                return Err(Errno::PermissionDenied);
            }
            cell.ty.disable();
            self.strobe.bytes_total -= footprint;
        }
        if self.advertise {
            return Ok(Outcome::Silent);
        }
        Ok(Outcome::Tiny)
    }

    /// Reply policy shared by both SetDataCellValue paths
    fn op_value_outcome(&mut self, result: Result<(), Errno>) -> Result<Outcome, Errno> {
        if self.advertise {
            return Ok(Outcome::Silent);
        }
        if self.strobing && !self.cfg.strobe_encoding.is_stuffed() {
            return Ok(Outcome::Silent);
        }
        result.map(|_| Outcome::Tiny)
    }

    /// Move the rendered payload into the response frame, add the codec
    /// marker, terminator and CRC, and publish the transmit length.
    fn finish_reply(&mut self, payload: &[u8]) {
        let cfg = self.cfg;
        let payload_start = match cfg.command_encoding {
            Encoding::Cobs => cobs::OVERHEAD - 1,
            Encoding::Escs => self.response.bytes_max,
            _ => 0,
        };
        let crc_fn = self.crc;
        let Some(buf) = self.response.buf() else {
            return;
        };
        match cfg.command_encoding {
            // 0xff marks the frame as not yet encoded
            Encoding::Cobs => buf[0] = 0xff,
            // anything but the delimiter arms the lazy encoder
            Encoding::Escs => buf[0] = 0x00,
            _ => {}
        }
        buf[payload_start..payload_start + payload.len()].copy_from_slice(payload);

        let mut total = payload.len();
        if cfg.command_encoding == Encoding::Rn {
            total = rn::terminate(&mut buf[payload_start..], total);
        } else if cfg.command_crc {
            crc::append(crc_fn, cfg.crc_width, &mut buf[payload_start..], total);
            total += cfg.crc_width.into_usize();
        }
        self.response.bytes_total = total;
    }
}
