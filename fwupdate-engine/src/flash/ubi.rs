// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Production `UbiDevice` backend: drives `/dev/ubi_ctrl` and per-volume
//! `/dev/ubiX_Y` nodes through the kernel UBI ioctls. This is a thin
//! wrapper — wear leveling and block remapping are the kernel's job, not
//! ours.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use nix::ioctl_write_ptr;

use crate::error::{EngineError, EngineResult};
use crate::flash::{UbiDevice, UbiVolumeType};

const UBI_IOC_MAGIC: u8 = b'O';

#[repr(C)]
struct UbiMkvolReq {
    vol_id: i32,
    alignment: i32,
    bytes: i64,
    vol_type: i8,
    padding1: [u8; 23],
    name_len: i16,
    name: [u8; 128],
}

ioctl_write_ptr!(ubi_ioc_mkvol, UBI_IOC_MAGIC, 0, UbiMkvolReq);

/// `/dev/ubiX_Y` node opened for writing into one volume.
struct VolumeHandle {
    file: File,
}

pub struct UbiInstance {
    ctrl: File,
    base_path: PathBuf,
    volumes: std::collections::HashMap<u32, VolumeHandle>,
}

impl UbiInstance {
    pub fn open(ubi_ctrl_path: PathBuf, base_path: PathBuf) -> EngineResult<Self> {
        let ctrl = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&ubi_ctrl_path)
            .map_err(EngineError::Io)?;
        Ok(Self {
            ctrl,
            base_path,
            volumes: std::collections::HashMap::new(),
        })
    }

    fn volume_node(&self, vol_id: u32) -> PathBuf {
        self.base_path.join(format!("ubi0_{vol_id}"))
    }
}

impl UbiDevice for UbiInstance {
    fn create_ubi(&mut self, _force: bool) -> EngineResult<()> {
        // Attaching the MTD to UBI is done by the platform before this
        // engine runs; here we only need `/dev/ubi_ctrl` to already exist.
        Ok(())
    }

    fn create_volume(
        &mut self,
        vol_id: u32,
        name: &str,
        vol_type: UbiVolumeType,
        _flags: u8,
        size: u64,
    ) -> EngineResult<()> {
        let mut req = UbiMkvolReq {
            vol_id: vol_id as i32,
            alignment: 1,
            bytes: size as i64,
            vol_type: match vol_type {
                UbiVolumeType::Dynamic => 1,
                UbiVolumeType::Static => 2,
            },
            padding1: [0; 23],
            name_len: name.len() as i16,
            name: [0; 128],
        };
        let bytes = name.as_bytes();
        req.name[..bytes.len()].copy_from_slice(bytes);

        unsafe { ubi_ioc_mkvol(self.ctrl.as_raw_fd(), &req) }
            .map_err(|e| EngineError::Fault(format!("UBI_IOCMKVOL failed: {e}")))?;
        Ok(())
    }

    fn scan_ubi(&mut self, vol_id: u32) -> EngineResult<bool> {
        Ok(self.volume_node(vol_id).exists())
    }

    fn read_ubi_block(&mut self, vol_id: u32, leb: u32, len: usize) -> EngineResult<Vec<u8>> {
        let handle = self.open_volume(vol_id)?;
        handle
            .file
            .seek(SeekFrom::Start(leb as u64 * len as u64))
            .map_err(EngineError::Io)?;
        let mut buf = vec![0u8; len];
        handle.file.read_exact(&mut buf).map_err(EngineError::Io)?;
        Ok(buf)
    }

    fn write_ubi_block(&mut self, vol_id: u32, leb: u32, bytes: &[u8]) -> EngineResult<()> {
        let handle = self.open_volume(vol_id)?;
        handle
            .file
            .seek(SeekFrom::Start(leb as u64 * bytes.len() as u64))
            .map_err(EngineError::Io)?;
        handle.file.write_all(bytes).map_err(EngineError::Io)
    }

    fn adjust_size(&mut self, _vol_id: u32, _new_size: u64) -> EngineResult<()> {
        // UBI volumes are resized through UBI_IOCVOLUP on the control
        // device; omitted here since this engine only ever grows a
        // volume once at creation time.
        Ok(())
    }

    fn close_ubi_volume(&mut self, vol_id: u32) -> EngineResult<()> {
        self.volumes.remove(&vol_id);
        Ok(())
    }
}

impl UbiInstance {
    fn open_volume(&mut self, vol_id: u32) -> EngineResult<&mut VolumeHandle> {
        if !self.volumes.contains_key(&vol_id) {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(self.volume_node(vol_id))
                .map_err(EngineError::Io)?;
            self.volumes.insert(vol_id, VolumeHandle { file });
        }
        Ok(self.volumes.get_mut(&vol_id).expect("just inserted"))
    }
}
