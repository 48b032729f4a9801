// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Resolves image kinds to MTD device nodes via a static partition map
//! loaded from a TOML file, driving the engine's `DeviceResolver`
//! collaborator against real `/dev/mtdN` character devices.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fwupdate_engine::config::SystemShape;
use fwupdate_engine::error::{EngineError, EngineResult};
use fwupdate_engine::flash::mtd::MtdDevice;
use fwupdate_engine::flash::FlashDevice;
use fwupdate_engine::partmap::{self, Slot, SWIFOTA_PARTITION};
use fwupdate_engine::session::DeviceResolver;
use fwupdate_proto::ImageKind;

/// `partition_name -> /dev/mtdN` table, e.g.:
/// ```toml
/// lefwkro = "/dev/mtd4"
/// lefwkro2 = "/dev/mtd5"
/// ```
pub fn load_device_map(path: &Path) -> Result<HashMap<String, PathBuf>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read device map {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid device map {}", path.display()))
}

/// Opens each destination partition on first use and keeps it open for
/// the rest of the download; the active-slot read used by the delta
/// patch engine opens and closes its own short-lived handle instead,
/// since it only ever needs one pass.
///
/// On a `DualSystem` deployment `open_raw` lands leaves on the passive
/// slot, which `install()` then swaps in. On `SingleSystem` there is no
/// passive slot to write ahead of install: leaves (and `finalize_swifota`'s
/// readback copy) land directly on the active partition, and staged
/// single-system images are assembled in `swifota` beforehand.
pub struct MtdResolver {
    devices: HashMap<String, PathBuf>,
    shape: SystemShape,
    open_raw: HashMap<ImageKind, MtdDevice>,
    swifota: Option<MtdDevice>,
}

impl MtdResolver {
    pub fn new(devices: HashMap<String, PathBuf>, shape: SystemShape) -> Self {
        Self {
            devices,
            shape,
            open_raw: HashMap::new(),
            swifota: None,
        }
    }

    fn device_path(&self, partition: &str) -> EngineResult<PathBuf> {
        self.devices.get(partition).cloned().ok_or_else(|| {
            EngineError::BadParameter(format!("no device configured for partition {partition}"))
        })
    }

    fn write_slot(&self) -> Slot {
        match self.shape {
            SystemShape::DualSystem => Slot::Passive,
            SystemShape::SingleSystem => Slot::Active,
        }
    }
}

impl DeviceResolver for MtdResolver {
    fn open_raw(&mut self, kind: ImageKind) -> EngineResult<&mut dyn FlashDevice> {
        if !self.open_raw.contains_key(&kind) {
            let partition = partmap::partition_name(kind, self.write_slot()).ok_or_else(|| {
                EngineError::BadParameter(format!("{kind:?} has no partition mapping"))
            })?;
            let path = self.device_path(&partition)?;
            let device = MtdDevice::open(&path)?;
            self.open_raw.insert(kind, device);
        }
        Ok(self.open_raw.get_mut(&kind).expect("just inserted") as &mut dyn FlashDevice)
    }

    fn read_source_for_patch(&mut self, kind: ImageKind, len: usize) -> EngineResult<Vec<u8>> {
        let partition = partmap::partition_name(kind, Slot::Active).ok_or_else(|| {
            EngineError::BadParameter(format!("{kind:?} has no partition mapping"))
        })?;
        let path = self.device_path(&partition)?;
        let mut device = MtdDevice::open(&path)?;
        device.read(0, len)
    }

    fn open_swifota(&mut self) -> EngineResult<&mut dyn FlashDevice> {
        if self.swifota.is_none() {
            let path = self.device_path(SWIFOTA_PARTITION)?;
            self.swifota = Some(MtdDevice::open(&path)?);
        }
        Ok(self.swifota.as_mut().expect("just inserted") as &mut dyn FlashDevice)
    }
}
