// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The 400-byte CWE image header, the atomic unit the stream parser reads
//! before it knows anything else about an image.

use crate::crc32;
use crate::cursor::{Cursor, Writer};
use crate::error::ParseError;
use crate::image_kind::ImageKind;

pub const CWE_HEADER_LEN: usize = 400;
const PSB_LEN: usize = 256;
const VERSION_LEN: usize = 84;
const RELEASE_DATE_LEN: usize = 8;

/// Misc-opts bit for "payload is zlib/lzma compressed" — this engine never
/// writes or accepts a compressed image.
pub const MISC_OPTS_COMPRESS: u8 = 0x01;
/// Misc-opts bit for "leaf payload is a delta patch, not a raw image".
pub const MISC_OPTS_DELTAPATCH: u8 = 0x02;

/// Magic signature required in the `signature` field of `APPL` headers.
/// Big-endian value of ASCII `"APSN"`, the vendor's historical constant
/// (see `DESIGN.md` for the assumption this was resolved under).
pub const APPSIGN: u32 = u32::from_be_bytes(*b"APSN");

pub const MIN_HDR_REV: u32 = 3;

#[derive(Debug, Clone)]
pub struct CweHeader {
    pub product_specific_buffer: Vec<u8>,
    pub crc_psb: u32,
    pub hdr_rev: u32,
    pub crc_indicator: u32,
    pub image_type: [u8; 4],
    pub product_type: u32,
    pub image_size: u32,
    pub image_crc32: u32,
    pub version: Vec<u8>,
    pub release_date: Vec<u8>,
    pub compat: u32,
    pub misc_opts: u8,
    pub reserved: [u8; 3],
    pub storage_addr: u32,
    pub program_addr: u32,
    pub entry: u32,
    pub signature: u32,
}

impl CweHeader {
    pub fn kind(&self) -> Result<ImageKind, ParseError> {
        ImageKind::from_tag(&self.image_type)
    }

    pub fn is_compressed(&self) -> bool {
        self.misc_opts & MISC_OPTS_COMPRESS != 0
    }

    /// The DELTAPATCH bit is clear-means-delta: the vendor tool sets it
    /// to 0 for a patched leaf, 1 for a full raw image (see `DESIGN.md`).
    pub fn is_delta_patch(&self) -> bool {
        self.misc_opts & MISC_OPTS_DELTAPATCH == 0
    }

    /// Decode and validate a 400-byte header. Does not touch payload bytes.
    pub fn parse(buf: &[u8], expected_product_type: u32) -> Result<Self, ParseError> {
        if buf.len() < CWE_HEADER_LEN {
            return Err(ParseError::Truncated {
                need: CWE_HEADER_LEN,
                got: buf.len(),
            });
        }

        let declared_psb_crc = {
            let mut c = Cursor::new(&buf[PSB_LEN..PSB_LEN + 4]);
            c.u32()?
        };
        let computed_psb_crc = crc32::checksum(&buf[..PSB_LEN]);
        if declared_psb_crc != computed_psb_crc {
            return Err(ParseError::CrcPsbMismatch {
                declared: declared_psb_crc,
                computed: computed_psb_crc,
            });
        }

        let mut c = Cursor::new(buf);
        let product_specific_buffer = c.bytes(PSB_LEN)?.to_vec();
        let crc_psb = c.u32()?;
        let hdr_rev = c.u32()?;
        let crc_indicator = c.u32()?;
        let image_type = c.array4()?;
        let product_type = c.u32()?;
        let image_size = c.u32()?;
        let image_crc32 = c.u32()?;
        let version = c.bytes(VERSION_LEN)?.to_vec();
        let release_date = c.bytes(RELEASE_DATE_LEN)?.to_vec();
        let compat = c.u32()?;
        let misc_opts = c.u8()?;
        let mut reserved = [0u8; 3];
        reserved.copy_from_slice(c.bytes(3)?);
        let storage_addr = c.u32()?;
        let program_addr = c.u32()?;
        let entry = c.u32()?;
        let signature = c.u32()?;

        let header = Self {
            product_specific_buffer,
            crc_psb,
            hdr_rev,
            crc_indicator,
            image_type,
            product_type,
            image_size,
            image_crc32,
            version,
            release_date,
            compat,
            misc_opts,
            reserved,
            storage_addr,
            program_addr,
            entry,
            signature,
        };

        if header.hdr_rev < MIN_HDR_REV {
            return Err(ParseError::HeaderRevTooOld(header.hdr_rev));
        }

        let kind = header.kind()?;

        if header.is_compressed() {
            return Err(ParseError::CompressedUnsupported);
        }

        if kind == ImageKind::Appl && header.signature != APPSIGN {
            return Err(ParseError::BadAppSignature(header.signature));
        }

        if header.product_type != expected_product_type {
            return Err(ParseError::ProductTypeMismatch {
                expected: expected_product_type,
                got: header.product_type,
            });
        }

        if !kind.is_composite() && header.image_size == 0 {
            return Err(ParseError::ZeroLengthImage);
        }

        Ok(header)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(CWE_HEADER_LEN);
        w.bytes(&self.product_specific_buffer);
        w.pad_to(PSB_LEN);
        w.u32(self.crc_psb);
        w.u32(self.hdr_rev);
        w.u32(self.crc_indicator);
        w.bytes(&self.image_type);
        w.u32(self.product_type);
        w.u32(self.image_size);
        w.u32(self.image_crc32);
        w.bytes(&self.version);
        w.pad_to(PSB_LEN + 28 + VERSION_LEN);
        w.bytes(&self.release_date);
        w.pad_to(PSB_LEN + 28 + VERSION_LEN + RELEASE_DATE_LEN);
        w.u32(self.compat);
        w.u8(self.misc_opts);
        w.bytes(&self.reserved);
        w.u32(self.storage_addr);
        w.u32(self.program_addr);
        w.u32(self.entry);
        w.u32(self.signature);
        let mut buf = w.into_vec();
        buf.resize(CWE_HEADER_LEN, 0);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(image_type: &[u8; 4], image_size: u32, misc_opts: u8) -> Vec<u8> {
        let psb = vec![0xAAu8; PSB_LEN];
        let crc_psb = crc32::checksum(&psb);

        let mut w = Writer::with_capacity(CWE_HEADER_LEN);
        w.bytes(&psb);
        w.u32(crc_psb);
        w.u32(3); // hdr_rev
        w.u32(0); // crc_indicator
        w.bytes(image_type);
        w.u32(0x1234_5678); // product_type
        w.u32(image_size);
        w.u32(0); // image_crc32 placeholder
        w.bytes(&[0u8; VERSION_LEN]);
        w.bytes(&[0u8; RELEASE_DATE_LEN]);
        w.u32(0); // compat
        w.u8(misc_opts);
        w.bytes(&[0u8; 3]);
        w.u32(0); // storage_addr
        w.u32(0); // program_addr
        w.u32(0); // entry
        w.u32(if image_type == b"APPL" { APPSIGN } else { 0 });
        let mut buf = w.into_vec();
        buf.resize(CWE_HEADER_LEN, 0);
        buf
    }

    #[test]
    fn parses_valid_leaf_header() {
        let buf = sample_header(b"USER", 4096, 0);
        let h = CweHeader::parse(&buf, 0x1234_5678).unwrap();
        assert_eq!(h.kind().unwrap(), ImageKind::User);
        assert_eq!(h.image_size, 4096);
    }

    #[test]
    fn rejects_bad_psb_crc() {
        let mut buf = sample_header(b"USER", 4096, 0);
        buf[256] ^= 0xFF;
        assert!(matches!(
            CweHeader::parse(&buf, 0x1234_5678),
            Err(ParseError::CrcPsbMismatch { .. })
        ));
    }

    #[test]
    fn rejects_old_hdr_rev() {
        let mut buf = sample_header(b"USER", 4096, 0);
        // hdr_rev lives right after crc_psb at offset 260
        buf[260..264].copy_from_slice(&2u32.to_be_bytes());
        assert!(matches!(
            CweHeader::parse(&buf, 0x1234_5678),
            Err(ParseError::HeaderRevTooOld(2))
        ));
    }

    #[test]
    fn rejects_compressed_images() {
        let buf = sample_header(b"USER", 4096, MISC_OPTS_COMPRESS);
        assert!(matches!(
            CweHeader::parse(&buf, 0x1234_5678),
            Err(ParseError::CompressedUnsupported)
        ));
    }

    #[test]
    fn rejects_wrong_product_type() {
        let buf = sample_header(b"USER", 4096, 0);
        assert!(matches!(
            CweHeader::parse(&buf, 0xDEAD_BEEF),
            Err(ParseError::ProductTypeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_zero_length_leaf() {
        let buf = sample_header(b"USER", 0, 0);
        assert!(matches!(
            CweHeader::parse(&buf, 0x1234_5678),
            Err(ParseError::ZeroLengthImage)
        ));
    }

    #[test]
    fn composite_may_have_zero_size() {
        let buf = sample_header(b"APPL", 0, 0);
        let h = CweHeader::parse(&buf, 0x1234_5678).unwrap();
        assert!(h.kind().unwrap().is_composite());
    }

    #[test]
    fn appl_requires_signature() {
        let mut buf = sample_header(b"APPL", 0, 0);
        // signature is the final 4 bytes
        let len = buf.len();
        buf[len - 4..].copy_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            CweHeader::parse(&buf, 0x1234_5678),
            Err(ParseError::BadAppSignature(0))
        ));
    }
}
