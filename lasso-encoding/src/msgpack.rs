//! MessagePack subset for command and reply payloads
//!
//! Covers exactly the shapes the protocol exchanges: arrays, booleans,
//! integers up to 32 bits, single-precision floats, strings and raw bytes.
//! 64-bit integers and doubles are not encoded; cells of those types are
//! rejected at the interpreter level instead.
//!
//! All multi-byte values are big-endian as required by the MessagePack
//! specification; strobe payloads bypass this module entirely and keep host
//! byte order.

const NIL: u8 = 0xc0;
const FALSE: u8 = 0xc2;
const TRUE: u8 = 0xc3;
const F32: u8 = 0xca;
const U8: u8 = 0xcc;
const U16: u8 = 0xcd;
const U32: u8 = 0xce;
const I8: u8 = 0xd0;
const I16: u8 = 0xd1;
const I32: u8 = 0xd2;
const STR8: u8 = 0xd9;
const STR16: u8 = 0xda;
const ARRAY16: u8 = 0xdc;

const FIXSTR: u8 = 0xa0;
const FIXARRAY: u8 = 0x90;
const NEGATIVE_FIXINT: u8 = 0xe0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PackError;

/// Cursor over a serialized buffer
pub struct PackReader<'a> {
    buffer: &'a [u8],
    at: usize,
}

impl<'a> PackReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, at: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PackError> {
        let end = self.at.checked_add(len).ok_or(PackError)?;
        let bytes = self.buffer.get(self.at..end).ok_or(PackError)?;
        self.at = end;
        Ok(bytes)
    }

    fn take_byte(&mut self) -> Result<u8, PackError> {
        Ok(self.take(1)?[0])
    }

    /// Open an array and return its element count.
    pub fn open_array(&mut self) -> Result<usize, PackError> {
        let head = self.take_byte()?;
        match head {
            _ if head & 0xf0 == FIXARRAY => Ok(usize::from(head & 0x0f)),
            ARRAY16 => {
                let len = self.take(2)?;
                Ok(usize::from(u16::from_be_bytes([len[0], len[1]])))
            }
            _ => Err(PackError),
        }
    }

    /// Read any integer encoding up to 32 bits wide, value-preserving.
    pub fn read_u32(&mut self) -> Result<u32, PackError> {
        let head = self.take_byte()?;
        match head {
            0x00..=0x7f => Ok(u32::from(head)),
            U8 => Ok(u32::from(self.take_byte()?)),
            U16 => {
                let b = self.take(2)?;
                Ok(u32::from(u16::from_be_bytes([b[0], b[1]])))
            }
            U32 => {
                let b = self.take(4)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            _ => Err(PackError),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, PackError> {
        u16::try_from(self.read_u32()?).map_err(|_| PackError)
    }

    pub fn read_u8(&mut self) -> Result<u8, PackError> {
        u8::try_from(self.read_u32()?).map_err(|_| PackError)
    }

    pub fn read_i32(&mut self) -> Result<i32, PackError> {
        let head = *self.buffer.get(self.at).ok_or(PackError)?;
        match head {
            _ if head & 0xe0 == NEGATIVE_FIXINT => {
                self.at += 1;
                Ok(i32::from(head as i8))
            }
            I8 => {
                self.at += 1;
                Ok(i32::from(self.take_byte()? as i8))
            }
            I16 => {
                self.at += 1;
                let b = self.take(2)?;
                Ok(i32::from(i16::from_be_bytes([b[0], b[1]])))
            }
            I32 => {
                self.at += 1;
                let b = self.take(4)?;
                Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            // positive values may arrive in any unsigned encoding
            _ => i32::try_from(self.read_u32()?).map_err(|_| PackError),
        }
    }

    pub fn read_i16(&mut self) -> Result<i16, PackError> {
        i16::try_from(self.read_i32()?).map_err(|_| PackError)
    }

    pub fn read_i8(&mut self) -> Result<i8, PackError> {
        i8::try_from(self.read_i32()?).map_err(|_| PackError)
    }

    pub fn read_bool(&mut self) -> Result<bool, PackError> {
        match self.take_byte()? {
            TRUE => Ok(true),
            FALSE => Ok(false),
            _ => Err(PackError),
        }
    }

    pub fn read_f32(&mut self) -> Result<f32, PackError> {
        match self.take_byte()? {
            F32 => {
                let b = self.take(4)?;
                Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            _ => Err(PackError),
        }
    }

    /// Read a string or raw-byte item as a byte slice.
    pub fn read_raw(&mut self) -> Result<&'a [u8], PackError> {
        let head = self.take_byte()?;
        let len = match head {
            _ if head & 0xe0 == FIXSTR => usize::from(head & 0x1f),
            STR8 => usize::from(self.take_byte()?),
            STR16 => {
                let b = self.take(2)?;
                usize::from(u16::from_be_bytes([b[0], b[1]]))
            }
            _ => return Err(PackError),
        };
        self.take(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, PackError> {
        core::str::from_utf8(self.read_raw()?).map_err(|_| PackError)
    }
}

/// Cursor serializing into a caller-provided buffer
pub struct PackWriter<'a> {
    buffer: &'a mut [u8],
    at: usize,
}

impl<'a> PackWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, at: 0 }
    }

    /// Number of bytes serialized so far
    pub fn offset(&self) -> usize {
        self.at
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), PackError> {
        let end = self.at.checked_add(bytes.len()).ok_or(PackError)?;
        self.buffer
            .get_mut(self.at..end)
            .ok_or(PackError)?
            .copy_from_slice(bytes);
        self.at = end;
        Ok(())
    }

    pub fn open_array(&mut self, len: usize) -> Result<(), PackError> {
        if len <= 0x0f {
            self.put(&[FIXARRAY | len as u8])
        } else if len <= 0xffff {
            self.put(&[ARRAY16])?;
            self.put(&(len as u16).to_be_bytes())
        } else {
            Err(PackError)
        }
    }

    pub fn put_nil(&mut self) -> Result<(), PackError> {
        self.put(&[NIL])
    }

    pub fn put_bool(&mut self, value: bool) -> Result<(), PackError> {
        self.put(&[if value { TRUE } else { FALSE }])
    }

    /// Minimal-width unsigned encoding
    pub fn put_u32(&mut self, value: u32) -> Result<(), PackError> {
        if value <= 0x7f {
            self.put(&[value as u8])
        } else if value <= 0xff {
            self.put(&[U8, value as u8])
        } else if value <= 0xffff {
            self.put(&[U16])?;
            self.put(&(value as u16).to_be_bytes())
        } else {
            self.put(&[U32])?;
            self.put(&value.to_be_bytes())
        }
    }

    /// Minimal-width signed encoding, non-negative values go unsigned
    pub fn put_i32(&mut self, value: i32) -> Result<(), PackError> {
        if value >= 0 {
            self.put_u32(value as u32)
        } else if value >= -32 {
            self.put(&[value as u8])
        } else if value >= i32::from(i8::MIN) {
            self.put(&[I8, value as u8])
        } else if value >= i32::from(i16::MIN) {
            self.put(&[I16])?;
            self.put(&(value as i16).to_be_bytes())
        } else {
            self.put(&[I32])?;
            self.put(&value.to_be_bytes())
        }
    }

    pub fn put_f32(&mut self, value: f32) -> Result<(), PackError> {
        self.put(&[F32])?;
        self.put(&value.to_be_bytes())
    }

    pub fn put_raw(&mut self, bytes: &[u8]) -> Result<(), PackError> {
        if bytes.len() <= 0x1f {
            self.put(&[FIXSTR | bytes.len() as u8])?;
        } else if bytes.len() <= 0xff {
            self.put(&[STR8, bytes.len() as u8])?;
        } else {
            return Err(PackError);
        }
        self.put(bytes)
    }

    pub fn put_str(&mut self, value: &str) -> Result<(), PackError> {
        self.put_raw(value.as_bytes())
    }
}
