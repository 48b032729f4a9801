// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Delta patch headers: the leading patch-meta block and the per-slice
//! headers that follow it.

use crate::cursor::{Cursor, Writer};
use crate::error::ParseError;

/// The patch-meta header is read from a fixed 256-byte window even though
/// its real fields only occupy 44 bytes; the remainder is reserved.
pub const PATCH_META_READ_LEN: usize = 256;
const PATCH_META_FIELD_LEN: usize = 44;

pub const PATCH_SLICE_LEN: usize = 12;

/// Sentinel `ubi_vol_id` meaning the patch targets raw flash, not a UBI
/// volume.
pub const UBI_VOL_ID_RAW: u16 = 0xFFFF;

const MAGIC_BSDIFF40: &[u8; 16] = b"BSDIFF40\0\0\0\0\0\0\0\0";
const MAGIC_IMGDIFF2: &[u8; 16] = b"IMGDIFF2\0\0\0\0\0\0\0\0";
const MAGIC_NODIFF: &[u8; 16] = b"NODIFF\0\0\0\0\0\0\0\0\0\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Bsdiff40,
    Imgdiff2,
    NoDiff,
}

impl DiffKind {
    pub fn magic(self) -> &'static [u8; 16] {
        match self {
            Self::Bsdiff40 => MAGIC_BSDIFF40,
            Self::Imgdiff2 => MAGIC_IMGDIFF2,
            Self::NoDiff => MAGIC_NODIFF,
        }
    }

    pub fn from_magic(magic: &[u8; 16]) -> Result<Self, ParseError> {
        match magic {
            m if m == MAGIC_BSDIFF40 => Ok(Self::Bsdiff40),
            m if m == MAGIC_IMGDIFF2 => Ok(Self::Imgdiff2),
            m if m == MAGIC_NODIFF => Ok(Self::NoDiff),
            other => Err(ParseError::UnknownDiffType(*other)),
        }
    }

    /// Whether a patch of this kind may target a raw (non-UBI) flash
    /// partition.
    pub fn allows_raw_flash(self) -> bool {
        matches!(self, Self::Bsdiff40 | Self::NoDiff)
    }

    /// Whether a patch of this kind may target a UBI logical volume.
    pub fn allows_ubi(self) -> bool {
        matches!(self, Self::Imgdiff2 | Self::NoDiff)
    }
}

/// The 44 real fields inside the 256-byte patch-meta read.
#[derive(Debug, Clone)]
pub struct PatchMeta {
    pub diff_type: DiffKind,
    pub segment_size: u32,
    pub num_patches: u32,
    pub ubi_vol_id: u16,
    pub ubi_vol_type: u8,
    pub ubi_vol_flags: u8,
    pub orig_size: u32,
    pub orig_crc32: u32,
    pub dest_size: u32,
    pub dest_crc32: u32,
}

impl PatchMeta {
    /// `ubi_vol_id == UBI_VOL_ID_RAW` means the destination is raw flash;
    /// any other value names a UBI volume.
    pub fn targets_ubi(&self) -> bool {
        self.ubi_vol_id != UBI_VOL_ID_RAW
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < PATCH_META_READ_LEN {
            return Err(ParseError::Truncated {
                need: PATCH_META_READ_LEN,
                got: buf.len(),
            });
        }
        let mut c = Cursor::new(&buf[..PATCH_META_FIELD_LEN]);
        let diff_type_magic = c.array16()?;
        let diff_type = DiffKind::from_magic(&diff_type_magic)?;
        let segment_size = c.u32()?;
        let num_patches = c.u32()?;
        let ubi_vol_id = c.u16()?;
        let ubi_vol_type = c.u8()?;
        let ubi_vol_flags = c.u8()?;
        let orig_size = c.u32()?;
        let orig_crc32 = c.u32()?;
        let dest_size = c.u32()?;
        let dest_crc32 = c.u32()?;

        Ok(Self {
            diff_type,
            segment_size,
            num_patches,
            ubi_vol_id,
            ubi_vol_type,
            ubi_vol_flags,
            orig_size,
            orig_crc32,
            dest_size,
            dest_crc32,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(PATCH_META_READ_LEN);
        w.bytes(self.diff_type.magic());
        w.u32(self.segment_size);
        w.u32(self.num_patches);
        w.u16(self.ubi_vol_id);
        w.u8(self.ubi_vol_type);
        w.u8(self.ubi_vol_flags);
        w.u32(self.orig_size);
        w.u32(self.orig_crc32);
        w.u32(self.dest_size);
        w.u32(self.dest_crc32);
        let mut buf = w.into_vec();
        buf.resize(PATCH_META_READ_LEN, 0);
        buf
    }
}

/// One delta-patch slice: the `number`-th of `num_patches` slices, each
/// `size` bytes, concatenated after the meta header in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSlice {
    pub offset: u32,
    pub number: u32,
    pub size: u32,
}

impl PatchSlice {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < PATCH_SLICE_LEN {
            return Err(ParseError::Truncated {
                need: PATCH_SLICE_LEN,
                got: buf.len(),
            });
        }
        let mut c = Cursor::new(buf);
        Ok(Self {
            offset: c.u32()?,
            number: c.u32()?,
            size: c.u32()?,
        })
    }

    pub fn encode(&self) -> [u8; PATCH_SLICE_LEN] {
        let mut w = Writer::with_capacity(PATCH_SLICE_LEN);
        w.u32(self.offset);
        w.u32(self.number);
        w.u32(self.size);
        let v = w.into_vec();
        let mut out = [0u8; PATCH_SLICE_LEN];
        out.copy_from_slice(&v);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(diff_type: DiffKind, ubi_vol_id: u16) -> PatchMeta {
        PatchMeta {
            diff_type,
            segment_size: 4096,
            num_patches: 3,
            ubi_vol_id,
            ubi_vol_type: 0,
            ubi_vol_flags: 0,
            orig_size: 1024,
            orig_crc32: 0x1111_2222,
            dest_size: 2048,
            dest_crc32: 0x3333_4444,
        }
    }

    #[test]
    fn round_trips_each_diff_kind() {
        for kind in [DiffKind::Bsdiff40, DiffKind::Imgdiff2, DiffKind::NoDiff] {
            let m = meta(kind, UBI_VOL_ID_RAW);
            let encoded = m.encode();
            let decoded = PatchMeta::parse(&encoded).unwrap();
            assert_eq!(decoded.diff_type, kind);
            assert_eq!(decoded.num_patches, 3);
        }
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut buf = meta(DiffKind::Bsdiff40, UBI_VOL_ID_RAW).encode();
        buf[0..16].copy_from_slice(b"NOTAREALMAGICXX\0");
        assert!(matches!(
            PatchMeta::parse(&buf),
            Err(ParseError::UnknownDiffType(_))
        ));
    }

    #[test]
    fn bsdiff40_is_raw_only() {
        assert!(DiffKind::Bsdiff40.allows_raw_flash());
        assert!(!DiffKind::Bsdiff40.allows_ubi());
    }

    #[test]
    fn imgdiff2_is_ubi_only() {
        assert!(!DiffKind::Imgdiff2.allows_raw_flash());
        assert!(DiffKind::Imgdiff2.allows_ubi());
    }

    #[test]
    fn nodiff_allows_either() {
        assert!(DiffKind::NoDiff.allows_raw_flash());
        assert!(DiffKind::NoDiff.allows_ubi());
    }

    #[test]
    fn ubi_vol_id_sentinel_means_raw() {
        let raw = meta(DiffKind::NoDiff, UBI_VOL_ID_RAW);
        assert!(!raw.targets_ubi());
        let ubi = meta(DiffKind::Imgdiff2, 3);
        assert!(ubi.targets_ubi());
    }

    #[test]
    fn patch_slice_round_trips() {
        let s = PatchSlice {
            offset: 100,
            number: 2,
            size: 64,
        };
        let encoded = s.encode();
        assert_eq!(PatchSlice::parse(&encoded).unwrap(), s);
    }
}
