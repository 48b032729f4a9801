// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! A tiny bounds-checked big-endian field reader.
//!
//! The CWE and delta-patch headers are fixed-offset, fixed-length,
//! big-endian structures. This cursor reads them without ever decoding a
//! short buffer, matching the invariant that headers are atomic reads.

use crate::error::ParseError;
use byteorder::{BigEndian, ReadBytesExt};

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn require(&self, n: usize) -> Result<(), ParseError> {
        if self.pos + n > self.buf.len() {
            Err(ParseError::Truncated {
                need: self.pos + n,
                got: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn u8(&mut self) -> Result<u8, ParseError> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn u16(&mut self) -> Result<u16, ParseError> {
        self.require(2)?;
        let mut slice = &self.buf[self.pos..self.pos + 2];
        let v = slice.read_u16::<BigEndian>().expect("bounds checked above");
        self.pos += 2;
        Ok(v)
    }

    pub fn u32(&mut self) -> Result<u32, ParseError> {
        self.require(4)?;
        let mut slice = &self.buf[self.pos..self.pos + 4];
        let v = slice.read_u32::<BigEndian>().expect("bounds checked above");
        self.pos += 4;
        Ok(v)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        self.require(n)?;
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }

    pub fn array4(&mut self) -> Result<[u8; 4], ParseError> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.bytes(4)?);
        Ok(out)
    }

    pub fn array16(&mut self) -> Result<[u8; 16], ParseError> {
        let mut out = [0u8; 16];
        out.copy_from_slice(self.bytes(16)?);
        Ok(out)
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn pad_to(&mut self, len: usize) {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
