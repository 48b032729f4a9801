// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The resume-context snapshot: parser + writer progress, persisted so a
//! suspended download can resume at the next erase-block boundary.

use crate::crc32;
use crate::cursor::{Cursor, Writer};
use crate::error::ParseError;
use crate::patch_header::{PatchMeta, PatchSlice, PATCH_META_READ_LEN, PATCH_SLICE_LEN};

/// Upper bound on slices embedded in one resume-context file. A patch with
/// more slices than this checkpoints at the next slice boundary instead of
/// mid-patch; see `DESIGN.md`.
pub const MAX_EMBEDDED_SLICES: usize = 64;

pub const RESUME_CTX_LEN: usize = 4 // ctx_counter
    + 4 // image_type
    + 4 // image_size
    + 4 // image_crc
    + 4 // current_image_crc
    + 4 // global_crc
    + 4 // current_global_crc
    + 8 // total_read
    + 4 // current_offset
    + 8 // full_image_length
    + 1 // misc_opts
    + 1 // is_first_nvup_downloaded
    + 1 // is_modem_downloaded
    + 1 // is_image_to_be_read
    + 1 // has_patch_meta
    + PATCH_META_READ_LEN
    + 4 // embedded slice count
    + PATCH_SLICE_LEN * MAX_EMBEDDED_SLICES
    + 4; // ctx_crc

#[derive(Debug, Clone)]
pub struct ResumeContext {
    pub ctx_counter: u32,
    pub image_type: u32,
    pub image_size: u32,
    pub image_crc: u32,
    pub current_image_crc: u32,
    pub global_crc: u32,
    pub current_global_crc: u32,
    pub total_read: u64,
    /// Offset aligned to the device erase-block size.
    pub current_offset: u32,
    pub full_image_length: i64,
    pub misc_opts: u8,
    pub is_first_nvup_downloaded: bool,
    pub is_modem_downloaded: bool,
    pub is_image_to_be_read: bool,
    pub patch_meta: Option<PatchMeta>,
    pub patch_slices: Vec<PatchSlice>,
}

impl ResumeContext {
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        if self.patch_slices.len() > MAX_EMBEDDED_SLICES {
            return Err(ParseError::Truncated {
                need: self.patch_slices.len(),
                got: MAX_EMBEDDED_SLICES,
            });
        }

        let mut w = Writer::with_capacity(RESUME_CTX_LEN);
        w.u32(self.ctx_counter);
        w.u32(self.image_type);
        w.u32(self.image_size);
        w.u32(self.image_crc);
        w.u32(self.current_image_crc);
        w.u32(self.global_crc);
        w.u32(self.current_global_crc);
        w.bytes(&self.total_read.to_be_bytes());
        w.u32(self.current_offset);
        w.bytes(&self.full_image_length.to_be_bytes());
        w.u8(self.misc_opts);
        w.u8(self.is_first_nvup_downloaded as u8);
        w.u8(self.is_modem_downloaded as u8);
        w.u8(self.is_image_to_be_read as u8);
        match &self.patch_meta {
            Some(meta) => {
                w.u8(1);
                w.bytes(&meta.encode());
            }
            None => {
                w.u8(0);
                w.bytes(&[0u8; PATCH_META_READ_LEN]);
            }
        }
        w.u32(self.patch_slices.len() as u32);
        for slice in &self.patch_slices {
            w.bytes(&slice.encode());
        }
        for _ in self.patch_slices.len()..MAX_EMBEDDED_SLICES {
            w.bytes(&[0u8; PATCH_SLICE_LEN]);
        }

        let body = w.into_vec();
        let ctx_crc = crc32::checksum(&body);
        let mut out = body;
        out.extend_from_slice(&ctx_crc.to_be_bytes());
        Ok(out)
    }

    /// Decode and validate the trailing CRC32 over every preceding field.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < RESUME_CTX_LEN {
            return Err(ParseError::Truncated {
                need: RESUME_CTX_LEN,
                got: buf.len(),
            });
        }
        let body = &buf[..RESUME_CTX_LEN - 4];
        let declared_crc = {
            let mut c = Cursor::new(&buf[RESUME_CTX_LEN - 4..RESUME_CTX_LEN]);
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
        let ctx_counter = c.u32()?;
        let image_type = c.u32()?;
        let image_size = c.u32()?;
        let image_crc = c.u32()?;
        let current_image_crc = c.u32()?;
        let global_crc = c.u32()?;
        let current_global_crc = c.u32()?;
        let total_read = u64::from_be_bytes(c.bytes(8)?.try_into().expect("8 bytes"));
        let current_offset = c.u32()?;
        let full_image_length =
            i64::from_be_bytes(c.bytes(8)?.try_into().expect("8 bytes"));
        let misc_opts = c.u8()?;
        let is_first_nvup_downloaded = c.u8()? != 0;
        let is_modem_downloaded = c.u8()? != 0;
        let is_image_to_be_read = c.u8()? != 0;
        let has_patch_meta = c.u8()? != 0;
        let patch_meta_bytes = c.bytes(PATCH_META_READ_LEN)?;
        let patch_meta = if has_patch_meta {
            Some(PatchMeta::parse(patch_meta_bytes)?)
        } else {
            None
        };
        let slice_count = c.u32()? as usize;
        let mut patch_slices = Vec::with_capacity(slice_count.min(MAX_EMBEDDED_SLICES));
        for i in 0..MAX_EMBEDDED_SLICES {
            let slice_bytes = c.bytes(PATCH_SLICE_LEN)?;
            if i < slice_count {
                patch_slices.push(PatchSlice::parse(slice_bytes)?);
            }
        }

        Ok(Self {
            ctx_counter,
            image_type,
            image_size,
            image_crc,
            current_image_crc,
            global_crc,
            current_global_crc,
            total_read,
            current_offset,
            full_image_length,
            misc_opts,
            is_first_nvup_downloaded,
            is_modem_downloaded,
            is_image_to_be_read,
            patch_meta,
            patch_slices,
        })
    }
}
