// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory `FlashDevice`/`UbiDevice` backend used by tests. Supports
//! injecting bad-block masks per partition, keyed by which phase (erase
//! or write) should observe the fault.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::flash::{DeviceInfo, EccStats, FlashDevice, UbiDevice, UbiVolumeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    Erase,
    Write,
}

/// A simulated MTD partition backed by a `Vec<u8>`.
pub struct SimFlash {
    info: DeviceInfo,
    data: Vec<u8>,
    bad: Vec<bool>,
    /// PEBs that fail on the given phase, simulating a degrading block.
    fault_mask: HashMap<u32, FaultPhase>,
    ecc: EccStats,
}

impl SimFlash {
    pub fn new(erase_size: u32, write_size: u32, nb_peb: u32) -> Self {
        let size = erase_size as u64 * nb_peb as u64;
        Self {
            info: DeviceInfo {
                erase_size,
                write_size,
                size,
                nb_peb,
            },
            data: vec![0xFF; size as usize],
            bad: vec![false; nb_peb as usize],
            fault_mask: HashMap::new(),
            ecc: EccStats::default(),
        }
    }

    /// Inject a bad-block mask: bit `i` set means PEB `i` faults on `phase`.
    pub fn inject_bad_block_mask(&mut self, mask: u64, phase: FaultPhase) {
        for i in 0..64u32 {
            if mask & (1 << i) != 0 {
                self.fault_mask.insert(i, phase);
            }
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }
}

impl FlashDevice for SimFlash {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn erase(&mut self, peb: u32) -> EngineResult<()> {
        if self.fault_mask.get(&peb) == Some(&FaultPhase::Erase) {
            self.bad[peb as usize] = true;
            self.ecc.bad_blocks += 1;
            return Err(EngineError::IoWriteFailed(format!(
                "simulated erase failure on peb {peb}"
            )));
        }
        let off = self.info.peb_offset(peb) as usize;
        let len = self.info.erase_size as usize;
        self.data[off..off + len].fill(0xFF);
        Ok(())
    }

    fn read(&mut self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        let off = offset as usize;
        if off + len > self.data.len() {
            return Err(EngineError::IoAlignment("read past end of device".into()));
        }
        Ok(self.data[off..off + len].to_vec())
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<u32> {
        if offset % self.info.write_size as u64 != 0 || bytes.len() % self.info.write_size as usize != 0 {
            return Err(EngineError::IoAlignment(format!(
                "write at {offset} of {} bytes is not page-aligned",
                bytes.len()
            )));
        }
        let peb = (offset / self.info.erase_size as u64) as u32;
        if self.fault_mask.get(&peb) == Some(&FaultPhase::Write) {
            self.bad[peb as usize] = true;
            self.ecc.bad_blocks += 1;
            return Err(EngineError::IoWriteFailed(format!(
                "simulated write failure on peb {peb}"
            )));
        }
        let off = offset as usize;
        self.data[off..off + bytes.len()].copy_from_slice(bytes);
        Ok(peb)
    }

    fn is_bad(&self, peb: u32) -> bool {
        self.bad[peb as usize]
    }

    fn mark_bad(&mut self, peb: u32) -> EngineResult<()> {
        self.bad[peb as usize] = true;
        self.ecc.bad_blocks += 1;
        Ok(())
    }

    fn ecc_stats(&self) -> EccStats {
        self.ecc
    }
}

struct SimVolume {
    vol_type: UbiVolumeType,
    data: Vec<u8>,
}

/// A simulated UBI instance layered atop a `SimFlash`.
pub struct SimUbi {
    volumes: HashMap<u32, SimVolume>,
    leb_size: u32,
}

impl SimUbi {
    pub fn new(leb_size: u32) -> Self {
        Self {
            volumes: HashMap::new(),
            leb_size,
        }
    }

    pub fn volume_bytes(&self, vol_id: u32) -> Option<&[u8]> {
        self.volumes.get(&vol_id).map(|v| v.data.as_slice())
    }
}

impl UbiDevice for SimUbi {
    fn create_ubi(&mut self, force: bool) -> EngineResult<()> {
        if !force && !self.volumes.is_empty() {
            return Err(EngineError::NotPermitted("UBI instance already exists".into()));
        }
        self.volumes.clear();
        Ok(())
    }

    fn create_volume(
        &mut self,
        vol_id: u32,
        _name: &str,
        vol_type: UbiVolumeType,
        _flags: u8,
        size: u64,
    ) -> EngineResult<()> {
        if self.volumes.contains_key(&vol_id) {
            return Err(EngineError::NotPermitted(format!(
                "UBI volume {vol_id} already exists"
            )));
        }
        self.volumes.insert(
            vol_id,
            SimVolume {
                vol_type,
                data: vec![0u8; size as usize],
            },
        );
        Ok(())
    }

    fn scan_ubi(&mut self, vol_id: u32) -> EngineResult<bool> {
        Ok(self.volumes.contains_key(&vol_id))
    }

    fn read_ubi_block(&mut self, vol_id: u32, leb: u32, len: usize) -> EngineResult<Vec<u8>> {
        let vol = self
            .volumes
            .get(&vol_id)
            .ok_or_else(|| EngineError::BadParameter(format!("no such UBI volume {vol_id}")))?;
        let off = leb as usize * self.leb_size as usize;
        if off + len > vol.data.len() {
            return Err(EngineError::IoAlignment("read past end of UBI volume".into()));
        }
        Ok(vol.data[off..off + len].to_vec())
    }

    fn write_ubi_block(&mut self, vol_id: u32, leb: u32, bytes: &[u8]) -> EngineResult<()> {
        let vol = self
            .volumes
            .get_mut(&vol_id)
            .ok_or_else(|| EngineError::BadParameter(format!("no such UBI volume {vol_id}")))?;
        let off = leb as usize * self.leb_size as usize;
        if off + bytes.len() > vol.data.len() {
            vol.data.resize(off + bytes.len(), 0);
        }
        vol.data[off..off + bytes.len()].copy_from_slice(bytes);
        let _ = vol.vol_type;
        Ok(())
    }

    fn adjust_size(&mut self, vol_id: u32, new_size: u64) -> EngineResult<()> {
        let vol = self
            .volumes
            .get_mut(&vol_id)
            .ok_or_else(|| EngineError::BadParameter(format!("no such UBI volume {vol_id}")))?;
        vol.data.resize(new_size as usize, 0);
        Ok(())
    }

    fn close_ubi_volume(&mut self, _vol_id: u32) -> EngineResult<()> {
        Ok(())
    }
}
