//! ASCII wire helpers
//!
//! Replies are rendered into a bounded cursor; running out of room maps to
//! the `cancelled` reply at the interpreter level. Command arguments are
//! comma-separated decimal fields behind the opcode character.

use core::fmt::{self, Write};

use lasso_core::{CellType, Errno};

use crate::cell::Value;

/// Bounded byte cursor implementing [`core::fmt::Write`]
pub(crate) struct Cursor<'a> {
    buf: &'a mut [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, at: 0 }
    }

    pub fn at(&self) -> usize {
        self.at
    }

    /// Drop everything written after byte `at`
    pub fn rewind(&mut self, at: usize) {
        self.at = at;
    }

    pub fn push(&mut self, byte: u8) -> fmt::Result {
        if self.at < self.buf.len() {
            self.buf[self.at] = byte;
            self.at += 1;
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) -> fmt::Result {
        if self.at + bytes.len() <= self.buf.len() {
            self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
            self.at += bytes.len();
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}

impl Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.extend(s.as_bytes())
    }
}

/// Comma-separated argument fields behind the opcode
pub(crate) struct Args<'a> {
    rest: &'a str,
}

impl<'a> Args<'a> {
    /// `text` is everything behind the opcode character.
    pub fn new(text: &'a str) -> Self {
        // tolerate both `P10` and the canonical `P,10`
        Self {
            rest: text.strip_prefix(',').unwrap_or(text),
        }
    }

    pub fn next_field(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.split_once(',') {
            Some((field, rest)) => {
                self.rest = rest;
                Some(field)
            }
            None => Some(core::mem::take(&mut self.rest)),
        }
    }

    /// Remaining text verbatim, for string values that may contain commas
    pub fn rest(&mut self) -> &'a str {
        core::mem::take(&mut self.rest)
    }

    pub fn next_u8(&mut self) -> Result<u8, Errno> {
        self.next_field()
            .and_then(|f| num_prefix(f).parse().ok())
            .ok_or(Errno::InvalidArgument)
    }

    pub fn next_u16(&mut self) -> Result<u16, Errno> {
        self.next_field()
            .and_then(|f| num_prefix(f).parse().ok())
            .ok_or(Errno::InvalidArgument)
    }

    pub fn next_u32(&mut self) -> Result<u32, Errno> {
        self.next_field()
            .and_then(|f| num_prefix(f).parse().ok())
            .ok_or(Errno::InvalidArgument)
    }
}

/// Longest numeric-looking prefix of a field.
///
/// Commands carrying a CRC keep the checksum bytes inside the parsed frame,
/// so a numeric argument may have binary trailer bytes glued to it.
fn num_prefix(field: &str) -> &str {
    let field = field.trim_start();
    let end = field
        .find(|c: char| !c.is_ascii_digit() && !"+-.eE".contains(c))
        .unwrap_or(field.len());
    &field[..end]
}

/// Parse a typed value from its ASCII rendition.
pub(crate) fn parse_value<'a>(ty: CellType, text: &'a str) -> Result<Value<'a>, Errno> {
    fn num<V: core::str::FromStr>(text: &str) -> Result<V, Errno> {
        num_prefix(text).parse().map_err(|_| Errno::InvalidArgument)
    }

    let shape = ty.shape_bits();
    let value = if shape == CellType::BOOL.shape_bits() {
        Value::Bool(num::<u8>(text)? != 0)
    } else if shape == CellType::UINT8.shape_bits() {
        Value::U8(num(text)?)
    } else if shape == CellType::INT8.shape_bits() {
        Value::I8(num(text)?)
    } else if shape == CellType::CHAR.shape_bits() {
        Value::Str(text.as_bytes())
    } else if shape == CellType::UINT16.shape_bits() {
        Value::U16(num(text)?)
    } else if shape == CellType::INT16.shape_bits() {
        Value::I16(num(text)?)
    } else if shape == CellType::UINT32.shape_bits() {
        Value::U32(num(text)?)
    } else if shape == CellType::INT32.shape_bits() {
        Value::I32(num(text)?)
    } else if shape == CellType::UINT64.shape_bits() {
        Value::U64(num(text)?)
    } else if shape == CellType::INT64.shape_bits() {
        Value::I64(num(text)?)
    } else if shape == CellType::FLOAT.shape_bits() {
        Value::F32(num(text)?)
    } else if shape == CellType::DOUBLE.shape_bits() {
        Value::F64(num(text)?)
    } else {
        return Err(Errno::InvalidArgument);
    };
    Ok(value)
}

/// Render a typed value followed by the field separator.
pub(crate) fn write_value(cur: &mut Cursor<'_>, value: &Value<'_>) -> fmt::Result {
    match value {
        Value::Bool(v) => write!(cur, "{},", *v as u8),
        Value::U8(v) => write!(cur, "{},", v),
        Value::I8(v) => write!(cur, "{},", v),
        Value::U16(v) => write!(cur, "{},", v),
        Value::I16(v) => write!(cur, "{},", v),
        Value::U32(v) => write!(cur, "{},", v),
        Value::I32(v) => write!(cur, "{},", v),
        Value::U64(v) => write!(cur, "{},", v),
        Value::I64(v) => write!(cur, "{},", v),
        Value::F32(v) => write!(cur, "{},", v),
        Value::F64(v) => write!(cur, "{},", v),
        Value::Str(bytes) => {
            cur.extend(bytes)?;
            cur.push(b',')
        }
    }
}
