// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The staging header written to erase-block 0 of the `swifota` partition
//! in single-system deployments.

use crate::crc32;
use crate::cursor::{Cursor, Writer};
use crate::error::ParseError;
use crate::cwe_header::CWE_HEADER_LEN;

const RESERVED_LEN: usize = 108;

/// Magic bracketing the struct on flash so a torn write is detectable even
/// before the trailing CRC32 is checked.
pub const MAGIC_BEGIN: u32 = u32::from_be_bytes(*b"PMB1");
pub const MAGIC_END: u32 = u32::from_be_bytes(*b"PME1");

pub const PARTITION_META_LEN: usize = CWE_HEADER_LEN
    + 4 // magic_begin
    + 4 // version
    + 4 // offset
    + 4 // logical_block
    + 4 // phy_block
    + 4 // image_size
    + 4 // dld_source
    + 4 // nb_components
    + RESERVED_LEN
    + 4 // magic_end
    + 4; // crc32

#[derive(Debug, Clone)]
pub struct PartitionMetadata {
    pub cwe_header_raw: Vec<u8>,
    pub magic_begin: u32,
    pub version: u32,
    pub offset: u32,
    /// Nominal erase-block index before bad-block skipping.
    pub logical_block: u32,
    /// First *good* PEB where the body was actually written.
    pub phy_block: u32,
    pub image_size: u32,
    pub dld_source: u32,
    pub nb_components: u32,
    pub reserved: Vec<u8>,
    pub magic_end: u32,
}

impl PartitionMetadata {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(PARTITION_META_LEN);
        w.bytes(&self.cwe_header_raw);
        w.pad_to(CWE_HEADER_LEN);
        w.u32(self.magic_begin);
        w.u32(self.version);
        w.u32(self.offset);
        w.u32(self.logical_block);
        w.u32(self.phy_block);
        w.u32(self.image_size);
        w.u32(self.dld_source);
        w.u32(self.nb_components);
        w.bytes(&self.reserved);
        w.pad_to(CWE_HEADER_LEN + 32 + RESERVED_LEN);
        w.u32(self.magic_end);
        let body = w.into_vec();
        let crc = crc32::checksum(&body);
        let mut out = body;
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < PARTITION_META_LEN {
            return Err(ParseError::Truncated {
                need: PARTITION_META_LEN,
                got: buf.len(),
            });
        }
        let body = &buf[..PARTITION_META_LEN - 4];
        let declared_crc = {
            let mut c = Cursor::new(&buf[PARTITION_META_LEN - 4..PARTITION_META_LEN]);
            c.u32()?
        };
        let computed_crc = crc32::checksum(body);
        if declared_crc != computed_crc {
            return Err(ParseError::CrcPsbMismatch {
                declared: declared_crc,
                computed: computed_crc,
            });
        }

        let mut c = Cursor::new(body);
        let cwe_header_raw = c.bytes(CWE_HEADER_LEN)?.to_vec();
        let magic_begin = c.u32()?;
        let version = c.u32()?;
        let offset = c.u32()?;
        let logical_block = c.u32()?;
        let phy_block = c.u32()?;
        let image_size = c.u32()?;
        let dld_source = c.u32()?;
        let nb_components = c.u32()?;
        let reserved = c.bytes(RESERVED_LEN)?.to_vec();
        let magic_end = c.u32()?;

        if magic_begin != MAGIC_BEGIN || magic_end != MAGIC_END {
            return Err(ParseError::Truncated {
                need: PARTITION_META_LEN,
                got: buf.len(),
            });
        }

        Ok(Self {
            cwe_header_raw,
            magic_begin,
            version,
            offset,
            logical_block,
            phy_block,
            image_size,
            dld_source,
            nb_components,
            reserved,
            magic_end,
        })
    }
}
