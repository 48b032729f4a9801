// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Delta patch engine (C3): stages each patch slice to a scratch file,
//! dispatches to BSDIFF/IMGDIFF/NODIFF reconstruction, and verifies the
//! destination against `dest_crc32`/`dest_size` before it ever reaches
//! the partition writer.

use std::io::{Read, Seek, SeekFrom, Write};

use fwupdate_proto::patch_header::{DiffKind, PatchMeta, PatchSlice};
use fwupdate_proto::{crc32, ImageKind};
use tempfile::NamedTempFile;

use crate::error::{EngineError, EngineResult};

pub struct PatchOutcome {
    pub consumed: usize,
    pub written_to_flash: usize,
    pub flashed: bool,
    pub completed: bool,
}

/// Drives one patch (meta + its `num_patches` slices) to completion.
/// Owns the scratch file for the lifetime of the patch set; it is
/// truncated at the start of each slice and unlinked on completion or on
/// any error (`NamedTempFile`'s drop handles the unlink on every exit
/// path, including panic-unwind).
pub struct PatchSession {
    meta: PatchMeta,
    source: Vec<u8>,
    scratch: NamedTempFile,
    slices_done: u32,
    reconstructed: Vec<u8>,
}

impl PatchSession {
    /// `source` is the full source partition/volume content, already
    /// verified against `meta.orig_crc32`/`orig_size` by the caller
    /// (`SourceMismatch` is the caller's responsibility to raise before
    /// constructing a session).
    pub fn begin(
        meta: PatchMeta,
        kind: ImageKind,
        source: Vec<u8>,
    ) -> EngineResult<Self> {
        if kind == ImageKind::Sbl1 {
            return Err(EngineError::NotPermitted(
                "SBL is not patchable via the delta patch engine".into(),
            ));
        }
        if !meta.diff_type.allows_raw_flash() && !meta.targets_ubi() {
            return Err(EngineError::Unsupported(format!(
                "{:?} cannot target raw flash",
                meta.diff_type
            )));
        }
        if !meta.diff_type.allows_ubi() && meta.targets_ubi() {
            return Err(EngineError::Unsupported(format!(
                "{:?} cannot target a UBI volume",
                meta.diff_type
            )));
        }

        let scratch = NamedTempFile::new().map_err(EngineError::Io)?;
        Ok(Self {
            meta,
            source,
            scratch,
            slices_done: 0,
            reconstructed: Vec::new(),
        })
    }

    /// Stage one slice's body into the scratch file, then reconstruct the
    /// corresponding span of the destination image.
    pub fn apply_slice(&mut self, slice: &PatchSlice, body: &[u8]) -> EngineResult<PatchOutcome> {
        if body.len() != slice.size as usize {
            return Err(EngineError::BadParameter(format!(
                "slice {} declared {} bytes, got {}",
                slice.number,
                slice.size,
                body.len()
            )));
        }

        self.scratch.as_file_mut().set_len(0).map_err(EngineError::Io)?;
        self.scratch
            .as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(EngineError::Io)?;
        self.scratch.write_all(body).map_err(EngineError::Io)?;
        self.scratch.flush().map_err(EngineError::Io)?;

        let reconstructed_piece = match self.meta.diff_type {
            DiffKind::NoDiff => body.to_vec(),
            DiffKind::Bsdiff40 => self.bspatch_slice(slice)?,
            DiffKind::Imgdiff2 => self.bspatch_slice(slice)?,
        };

        if self.reconstructed.len() < slice.offset as usize + reconstructed_piece.len() {
            self.reconstructed
                .resize(slice.offset as usize + reconstructed_piece.len(), 0);
        }
        self.reconstructed[slice.offset as usize..slice.offset as usize + reconstructed_piece.len()]
            .copy_from_slice(&reconstructed_piece);

        self.slices_done += 1;
        let completed = self.slices_done >= self.meta.num_patches;

        Ok(PatchOutcome {
            consumed: body.len(),
            written_to_flash: reconstructed_piece.len(),
            flashed: false,
            completed,
        })
    }

    /// Applies a BSDIFF40-format patch read from the scratch file against
    /// `source[slice.offset..]`. IMGDIFF2 is modeled the same way per
    /// slice: each slice carries one bsdiff-style sub-patch against the
    /// corresponding source region, which is how the real format chunks a
    /// diff across a UBI volume's LEBs.
    fn bspatch_slice(&mut self, slice: &PatchSlice) -> EngineResult<Vec<u8>> {
        let mut patch_bytes = Vec::new();
        self.scratch
            .as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(EngineError::Io)?;
        self.scratch
            .as_file_mut()
            .read_to_end(&mut patch_bytes)
            .map_err(EngineError::Io)?;

        let source_region = self
            .source
            .get(slice.offset as usize..)
            .ok_or_else(|| EngineError::SourceMismatch("slice offset past source end".into()))?;

        bspatch(source_region, &patch_bytes)
    }

    /// Finalize: verify the fully-reconstructed image against
    /// `dest_size`/`dest_crc32`.
    pub fn finish(self) -> EngineResult<Vec<u8>> {
        if self.slices_done != self.meta.num_patches {
            return Err(EngineError::Fault(
                "patch finished with slices outstanding".into(),
            ));
        }
        if self.reconstructed.len() != self.meta.dest_size as usize {
            return Err(EngineError::SourceMismatch(format!(
                "reconstructed {} bytes, expected dest_size {}",
                self.reconstructed.len(),
                self.meta.dest_size
            )));
        }
        let got = crc32::checksum(&self.reconstructed);
        if got != self.meta.dest_crc32 {
            return Err(EngineError::SourceMismatch(format!(
                "reconstructed CRC32 {got:#010x} != dest_crc32 {:#010x}",
                self.meta.dest_crc32
            )));
        }
        Ok(self.reconstructed)
    }
}

/// Verifies the source partition/volume content against the patch meta's
/// `orig_crc32`/`orig_size` before a `PatchSession` is constructed.
pub fn verify_source(meta: &PatchMeta, source: &[u8]) -> EngineResult<()> {
    if source.len() < meta.orig_size as usize {
        return Err(EngineError::SourceMismatch(
            "source shorter than orig_size".into(),
        ));
    }
    let region = &source[..meta.orig_size as usize];
    let got = crc32::checksum(region);
    if got != meta.orig_crc32 {
        return Err(EngineError::SourceMismatch(format!(
            "source CRC32 {got:#010x} != orig_crc32 {:#010x}",
            meta.orig_crc32
        )));
    }
    Ok(())
}

fn bspatch(source: &[u8], patch: &[u8]) -> EngineResult<Vec<u8>> {
    bsdiff_android::patch(source, patch)
        .map_err(|e| EngineError::Fault(format!("bspatch failed: {e}")))
}
