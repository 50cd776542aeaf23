//! # Canonical Wire Codec
//!
//! Big-endian primitives shared by the request and response encodings.
//! Variable-length fields carry a `u32` length prefix and repeated sections a
//! `u8` count. Readers are strict: every read is bounds-checked and
//! [`WireReader::finish`] rejects trailing bytes.

use super::errors::CodecError;

/// Append-only big-endian encoder.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Fixed-width field, written without a length prefix.
    pub fn put_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Variable-length field with a `u32` length prefix.
    pub fn put_bytes(&mut self, field: &'static str, bytes: &[u8]) -> Result<(), CodecError> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| CodecError::invalid(field, format!("{} bytes exceeds u32", bytes.len())))?;
        self.put_u32(len);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Section count as a single byte.
    pub fn put_count(&mut self, field: &'static str, count: usize) -> Result<(), CodecError> {
        let count = u8::try_from(count)
            .map_err(|_| CodecError::invalid(field, format!("{count} exceeds 255")))?;
        self.put_u8(count);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked big-endian decoder over a borrowed buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Borrow the next `n` bytes and advance.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::UnexpectedEnd {
                needed: n,
                remaining,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.get_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.get_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.get_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.get_array()?))
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Variable-length field with a `u32` length prefix.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    /// Length-prefixed ASCII/UTF-8 string.
    pub fn get_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CodecError::invalid(field, e.to_string()))
    }

    /// Require the whole buffer to have been consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::ExcessBytes(extra)),
        }
    }
}
