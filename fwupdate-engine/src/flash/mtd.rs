// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Production `FlashDevice` backend: a raw MTD character device driven
//! through the kernel's MTD ioctls, guarded by a cross-process exclusive
//! lock for the duration of the open.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::fcntl::{flock, FlockArg};
use nix::{ioctl_none, ioctl_read, ioctl_write_int, ioctl_write_ptr};

use crate::error::{EngineError, EngineResult};
use crate::flash::{DeviceInfo, EccStats, FlashDevice};

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct MtdInfo {
    mtd_type: u8,
    flags: u32,
    size: u32,
    erasesize: u32,
    writesize: u32,
    oobsize: u32,
    padding: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct EraseInfo {
    start: u32,
    length: u32,
}

const MTD_IOC_MAGIC: u8 = b'M';

ioctl_read!(mtd_mem_get_info, MTD_IOC_MAGIC, 1, MtdInfo);
ioctl_write_int!(mtd_mem_erase, MTD_IOC_MAGIC, 2);
ioctl_none!(mtd_mem_unlock, MTD_IOC_MAGIC, 6);
ioctl_read!(mtd_mem_is_locked, MTD_IOC_MAGIC, 23, u32);
/// Takes the byte offset of the erase block to query; the ioctl's own
/// return value is 1 (bad), 0 (good), as the kernel never writes back
/// through the pointer.
ioctl_write_ptr!(mtd_mem_get_bad_block, MTD_IOC_MAGIC, 11, i64);
ioctl_write_ptr!(mtd_mem_set_bad_block, MTD_IOC_MAGIC, 12, i64);

/// A holder for `flock(2)`'d access to an MTD character device; dropping
/// it releases the lock.
pub struct MtdLock(File);

impl MtdLock {
    pub fn acquire(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(EngineError::Io)?;
        flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
            .map_err(|_| EngineError::Busy)?;
        Ok(Self(file))
    }
}

pub struct MtdDevice {
    _lock: MtdLock,
    file: File,
    info: DeviceInfo,
    bad_mask: Vec<bool>,
    ecc: EccStats,
}

impl MtdDevice {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let lock = MtdLock::acquire(path)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(EngineError::Io)?;

        let mut raw = MtdInfo::default();
        unsafe { mtd_mem_get_info(file.as_raw_fd(), &mut raw) }
            .map_err(|e| EngineError::Fault(format!("MEMGETINFO failed: {e}")))?;

        let nb_peb = raw.size / raw.erasesize.max(1);
        let info = DeviceInfo {
            erase_size: raw.erasesize,
            write_size: raw.writesize,
            size: raw.size as u64,
            nb_peb,
        };

        file.rewind().map_err(EngineError::Io)?;

        let mut bad_mask = vec![false; nb_peb as usize];
        for (peb, bad) in bad_mask.iter_mut().enumerate() {
            let offset = info.peb_offset(peb as u32) as i64;
            let ret = unsafe { mtd_mem_get_bad_block(file.as_raw_fd(), &offset) }
                .map_err(|e| EngineError::Fault(format!("MEMGETBADBLOCK peb {peb} failed: {e}")))?;
            *bad = ret != 0;
        }

        Ok(Self {
            _lock: lock,
            file,
            info,
            bad_mask,
            ecc: EccStats::default(),
        })
    }
}

impl FlashDevice for MtdDevice {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn erase(&mut self, peb: u32) -> EngineResult<()> {
        let erase_info = EraseInfo {
            start: self.info.peb_offset(peb) as u32,
            length: self.info.erase_size,
        };
        unsafe {
            mtd_mem_erase(
                self.file.as_raw_fd(),
                &erase_info as *const EraseInfo as std::os::raw::c_int,
            )
        }
        .map_err(|e| EngineError::IoWriteFailed(format!("MEMERASE peb {peb} failed: {e}")))?;
        Ok(())
    }

    fn read(&mut self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset)).map_err(EngineError::Io)?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).map_err(EngineError::Io)?;
        Ok(buf)
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<u32> {
        if offset % self.info.write_size as u64 != 0 || bytes.len() % self.info.write_size as usize != 0 {
            return Err(EngineError::IoAlignment(format!(
                "write at {offset} of {} bytes is not page-aligned",
                bytes.len()
            )));
        }
        self.file.seek(SeekFrom::Start(offset)).map_err(EngineError::Io)?;
        match self.file.write_all(bytes) {
            Ok(()) => Ok((offset / self.info.erase_size as u64) as u32),
            Err(e) if e.raw_os_error() == Some(libc_eio()) => {
                let peb = (offset / self.info.erase_size as u64) as u32;
                self.mark_bad(peb)?;
                Err(EngineError::IoWriteFailed(format!(
                    "EIO writing peb {peb}, marked bad"
                )))
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    fn is_bad(&self, peb: u32) -> bool {
        self.bad_mask[peb as usize]
    }

    fn mark_bad(&mut self, peb: u32) -> EngineResult<()> {
        let offset = self.info.peb_offset(peb) as i64;
        unsafe { mtd_mem_set_bad_block(self.file.as_raw_fd(), &offset) }
            .map_err(|e| EngineError::Fault(format!("MEMSETBADBLOCK peb {peb} failed: {e}")))?;
        self.bad_mask[peb as usize] = true;
        self.ecc.bad_blocks += 1;
        Ok(())
    }

    fn ecc_stats(&self) -> EccStats {
        self.ecc
    }
}

fn libc_eio() -> i32 {
    5
}
