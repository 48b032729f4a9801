// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash/UBI I/O abstraction. No code outside this module talks to the
//! kernel: everything else drives flash through the `FlashDevice` and
//! `UbiDevice` traits, which have both a production backend (`mtd`/`ubi`,
//! real ioctls) and an in-memory `sim` backend used by tests.

pub mod mtd;
pub mod sim;
pub mod ubi;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub erase_size: u32,
    pub write_size: u32,
    pub size: u64,
    pub nb_peb: u32,
}

impl DeviceInfo {
    pub fn peb_offset(&self, peb: u32) -> u64 {
        peb as u64 * self.erase_size as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EccStats {
    pub corrected: u32,
    pub failed: u32,
    pub bad_blocks: u32,
}

/// A raw flash partition (MTD) handle, opened for the duration of one
/// download or verification pass.
pub trait FlashDevice {
    fn info(&self) -> DeviceInfo;

    /// Erase one physical erase block. The PEB must read back all `0xFF`
    /// afterwards unless it is bad.
    fn erase(&mut self, peb: u32) -> EngineResult<()>;

    /// Read-back with bad-block skip-forward: `is_bad` PEBs are never
    /// returned to the caller as data.
    fn read(&mut self, offset: u64, len: usize) -> EngineResult<Vec<u8>>;

    /// Page-aligned write. Returns the PEB the write actually landed on —
    /// which may differ from the nominal PEB if a bad block was skipped.
    fn write(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<u32>;

    fn is_bad(&self, peb: u32) -> bool;
    fn mark_bad(&mut self, peb: u32) -> EngineResult<()>;
    fn ecc_stats(&self) -> EccStats;

    /// Forward `peb` to the next good block, marking bad ones along the
    /// way if `mark_on_skip` is set (used by the writer's EIO handling;
    /// read-only scans pass `false`).
    fn next_good_peb(&mut self, mut peb: u32, mark_on_skip: bool) -> EngineResult<u32> {
        let nb_peb = self.info().nb_peb;
        while peb < nb_peb && self.is_bad(peb) {
            if mark_on_skip {
                self.mark_bad(peb)?;
            }
            peb += 1;
        }
        if peb >= nb_peb {
            return Err(EngineError::IoWriteFailed(
                "no good PEB remaining in partition".into(),
            ));
        }
        Ok(peb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UbiVolumeType {
    Static,
    Dynamic,
}

/// A UBI instance layered atop a `FlashDevice`.
pub trait UbiDevice {
    fn create_ubi(&mut self, force: bool) -> EngineResult<()>;

    fn create_volume(
        &mut self,
        vol_id: u32,
        name: &str,
        vol_type: UbiVolumeType,
        flags: u8,
        size: u64,
    ) -> EngineResult<()>;

    /// Idempotent: returns whether `vol_id` already exists.
    fn scan_ubi(&mut self, vol_id: u32) -> EngineResult<bool>;

    fn read_ubi_block(&mut self, vol_id: u32, leb: u32, len: usize) -> EngineResult<Vec<u8>>;
    fn write_ubi_block(&mut self, vol_id: u32, leb: u32, bytes: &[u8]) -> EngineResult<()>;

    fn adjust_size(&mut self, vol_id: u32, new_size: u64) -> EngineResult<()>;
    fn close_ubi_volume(&mut self, vol_id: u32) -> EngineResult<()>;
}
