// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Partition write engine (C4): raw-flash and UBI-aware chunked writers
//! with on-the-fly CRC32, erase-before-write, bad-block skipping, the SBL
//! scrub algorithm, and the single-system `swifota` staging writer.

use std::collections::HashSet;

use fwupdate_proto::crc32::Crc32Digest;

use crate::error::{EngineError, EngineResult};
use crate::flash::{FlashDevice, UbiDevice, UbiVolumeType};

/// A chunked writer into one raw-flash partition, accumulating CRC32 as
/// bytes arrive. Does not hold the device: each call takes it as a
/// parameter, so the caller is free to re-resolve the device handle
/// between chunks rather than pin a borrow across an entire download.
pub struct RawWriter {
    image_size: u64,
    written: u64,
    current_peb: u32,
    offset_in_peb: u64,
    first_phy_block: Option<u32>,
    erased_pebs: HashSet<u32>,
    digest: Crc32Digest,
}

impl RawWriter {
    /// Opens the writer at the first PEB of the target's passive slot,
    /// which the caller has already resolved to a starting PEB index.
    pub fn begin(image_size: u64, start_peb: u32) -> Self {
        Self {
            image_size,
            written: 0,
            current_peb: start_peb,
            offset_in_peb: 0,
            first_phy_block: None,
            erased_pebs: HashSet::new(),
            digest: Crc32Digest::new(),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// The real PEB the image body started at, after any bad-block skip —
    /// what staging metadata records as `phy_block`.
    pub fn first_phy_block(&self) -> Option<u32> {
        self.first_phy_block
    }

    fn ensure_erased(&mut self, device: &mut dyn FlashDevice, peb: u32) -> EngineResult<()> {
        if self.erased_pebs.insert(peb) {
            device.erase(peb)?;
        }
        Ok(())
    }

    /// Writes one chunk, paging it across PEB boundaries and skipping
    /// bad blocks on EIO. The final chunk of an image may be shorter than
    /// a full page; it is padded to the page boundary with `0xFF` before
    /// the physical write, but only the real bytes feed the CRC.
    pub fn write_chunk(&mut self, device: &mut dyn FlashDevice, bytes: &[u8]) -> EngineResult<usize> {
        let write_size = device.info().write_size as u64;
        let erase_size = device.info().erase_size as u64;
        self.digest.update(bytes);

        let mut remaining = bytes;
        let mut total_written = 0usize;

        while !remaining.is_empty() {
            self.ensure_erased(device, self.current_peb)?;
            if self.first_phy_block.is_none() {
                self.first_phy_block = Some(self.current_peb);
            }

            let room_in_peb = erase_size - self.offset_in_peb;
            let take = remaining.len().min(room_in_peb as usize);
            let mut page = remaining[..take].to_vec();
            let pad = (write_size as usize - page.len() % write_size as usize) % write_size as usize;
            page.extend(std::iter::repeat(0xFFu8).take(pad));

            let offset = self.current_peb as u64 * erase_size + self.offset_in_peb;
            match device.write(offset, &page) {
                Ok(_) => {}
                Err(EngineError::IoWriteFailed(_)) => {
                    // EIO: the block just went bad. Mark it, skip forward,
                    // and retry this same page from the start of the next
                    // good PEB.
                    device.mark_bad(self.current_peb)?;
                    self.current_peb = device.next_good_peb(self.current_peb + 1, true)?;
                    self.offset_in_peb = 0;
                    continue;
                }
                Err(e) => return Err(e),
            }

            self.written += take as u64;
            total_written += take;
            self.offset_in_peb += take as u64;
            remaining = &remaining[take..];

            if self.offset_in_peb >= erase_size {
                self.current_peb = device.next_good_peb(self.current_peb + 1, false)?;
                self.offset_in_peb = 0;
            }
        }

        Ok(total_written)
    }

    /// Verifies the accumulated CRC32 matches the header's declared value
    /// and that exactly `image_size` bytes were written.
    pub fn finish(self, expected_crc32: u32) -> EngineResult<u32> {
        if self.written != self.image_size {
            return Err(EngineError::CrcMismatch {
                expected: expected_crc32,
                got: 0,
            });
        }
        let got = self.digest.finalize();
        if got != expected_crc32 {
            return Err(EngineError::CrcMismatch {
                expected: expected_crc32,
                got,
            });
        }
        Ok(self.first_phy_block.unwrap_or(0))
    }
}

/// Verification read: re-reads `size` bytes at `offset` and checks CRC32.
pub fn check_data(
    device: &mut dyn FlashDevice,
    offset: u64,
    size: usize,
    expected_crc32: u32,
) -> EngineResult<()> {
    let bytes = device.read(offset, size)?;
    let got = fwupdate_proto::crc32::checksum(&bytes);
    if got != expected_crc32 {
        return Err(EngineError::CrcMismatch {
            expected: expected_crc32,
            got,
        });
    }
    Ok(())
}

/// A chunked writer into one UBI volume, verifying the accumulated
/// volume CRC on close.
pub struct UbiWriter<'a> {
    ubi: &'a mut dyn UbiDevice,
    vol_id: u32,
    leb_size: u32,
    next_leb: u32,
    offset_in_leb: u32,
    digest: Crc32Digest,
}

impl<'a> UbiWriter<'a> {
    pub fn begin_ubi_write(
        ubi: &'a mut dyn UbiDevice,
        vol_id: u32,
        name: &str,
        vol_type: UbiVolumeType,
        size: u64,
        leb_size: u32,
        create: bool,
    ) -> EngineResult<Self> {
        if create && !ubi.scan_ubi(vol_id)? {
            ubi.create_volume(vol_id, name, vol_type, 0, size)?;
        }
        Ok(Self {
            ubi,
            vol_id,
            leb_size,
            next_leb: 0,
            offset_in_leb: 0,
            digest: Crc32Digest::new(),
        })
    }

    pub fn write_ubi_chunk(&mut self, bytes: &[u8]) -> EngineResult<()> {
        self.digest.update(bytes);
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let room = self.leb_size - self.offset_in_leb;
            let take = remaining.len().min(room as usize);
            let leb = self.next_leb;
            let mut block = vec![0u8; self.leb_size as usize];
            // Preserve bytes already written earlier in this LEB.
            if self.offset_in_leb > 0 {
                let prior = self.ubi.read_ubi_block(self.vol_id, leb, self.leb_size as usize)?;
                block[..self.offset_in_leb as usize]
                    .copy_from_slice(&prior[..self.offset_in_leb as usize]);
            }
            block[self.offset_in_leb as usize..self.offset_in_leb as usize + take]
                .copy_from_slice(&remaining[..take]);
            self.ubi.write_ubi_block(self.vol_id, leb, &block)?;

            self.offset_in_leb += take as u32;
            remaining = &remaining[take..];
            if self.offset_in_leb >= self.leb_size {
                self.next_leb += 1;
                self.offset_in_leb = 0;
            }
        }
        Ok(())
    }

    pub fn end_ubi_write(self, verify_crc32: Option<u32>) -> EngineResult<()> {
        if let Some(expected) = verify_crc32 {
            let got = self.digest.finalize();
            if got != expected {
                return Err(EngineError::CrcMismatch { expected, got });
            }
        }
        self.ubi.close_ubi_volume(self.vol_id)
    }
}

/// Single-system staging writer: assembles an update inside the `swifota`
/// partition instead of a passive A/B slot. Unlike `RawWriter`, callers
/// address it by absolute byte offset rather than a monotonically
/// advancing cursor, since a `PartitionMetadata` header at PEB 0 precedes
/// the staged CWE stream and UBI volumes created during the update share
/// the same partition.
pub struct SwifotaWriter {
    erase_size: u32,
    erased_pebs: HashSet<u32>,
    offset: u64,
}

impl SwifotaWriter {
    pub fn begin(device: &mut dyn FlashDevice) -> Self {
        Self {
            erase_size: device.info().erase_size,
            erased_pebs: HashSet::new(),
            offset: 0,
        }
    }

    /// Current write cursor, i.e. the offset one past the last byte
    /// accepted by `write_swifota`.
    pub fn get_offset(&self) -> u64 {
        self.offset
    }

    /// Writes `bytes` at `offset`, erasing any PEB this write newly spans.
    /// PEBs are tracked per-writer so a partition already staged earlier
    /// in the same session is not re-erased.
    pub fn write_swifota(
        &mut self,
        device: &mut dyn FlashDevice,
        offset: u64,
        bytes: &[u8],
    ) -> EngineResult<usize> {
        let erase_size = self.erase_size as u64;
        let mut pos = offset;
        let mut remaining = bytes;
        let mut total = 0usize;

        while !remaining.is_empty() {
            let peb = (pos / erase_size) as u32;
            if self.erased_pebs.insert(peb) {
                device.erase(peb)?;
            }
            let offset_in_peb = pos % erase_size;
            let room = erase_size - offset_in_peb;
            let take = remaining.len().min(room as usize);
            device.write(pos, &remaining[..take])?;

            pos += take as u64;
            remaining = &remaining[take..];
            total += take;
        }

        self.offset = offset + total as u64;
        Ok(total)
    }

    /// Re-reads `[start, end)` from the staging partition and computes its
    /// CRC32, so the caller can verify a span without keeping it in memory.
    pub fn compute_data_crc(
        &self,
        device: &mut dyn FlashDevice,
        start: u64,
        end: u64,
    ) -> EngineResult<u32> {
        let bytes = device.read(start, (end - start) as usize)?;
        Ok(fwupdate_proto::crc32::checksum(&bytes))
    }
}

/// Attaches to (or initializes) the UBI instance layered on the `swifota`
/// partition. A no-op beyond the `create_ubi` call itself: the staging
/// partition's UBI image is scanned lazily by `open_ubi_volume_swifota`.
pub fn open_ubi_swifota(ubi: &mut dyn UbiDevice) -> EngineResult<()> {
    ubi.create_ubi(false)
}

/// Opens (creating if requested and absent) one UBI volume inside the
/// staging partition's UBI image.
pub fn open_ubi_volume_swifota<'a>(
    ubi: &'a mut dyn UbiDevice,
    vol_id: u32,
    name: &str,
    vol_type: UbiVolumeType,
    size: u64,
    leb_size: u32,
    create: bool,
) -> EngineResult<UbiWriter<'a>> {
    UbiWriter::begin_ubi_write(ubi, vol_id, name, vol_type, size, leb_size, create)
}

pub fn write_ubi_swifota(writer: &mut UbiWriter<'_>, bytes: &[u8]) -> EngineResult<()> {
    writer.write_ubi_chunk(bytes)
}

pub fn close_ubi_volume_swifota(
    writer: UbiWriter<'_>,
    verify_crc32: Option<u32>,
) -> EngineResult<()> {
    writer.end_ubi_write(verify_crc32)
}

/// Recomputes a UBI volume's CRC32 by walking its LEBs in order — used to
/// verify a volume staged earlier in the same session without an open
/// `UbiWriter` still tracking its digest.
pub fn compute_ubi_volume_crc(
    ubi: &mut dyn UbiDevice,
    vol_id: u32,
    leb_size: u32,
    num_lebs: u32,
) -> EngineResult<u32> {
    let mut digest = Crc32Digest::new();
    for leb in 0..num_lebs {
        let block = ubi.read_ubi_block(vol_id, leb, leb_size as usize)?;
        digest.update(&block);
    }
    Ok(digest.finalize())
}

/// Releases the staging partition's UBI instance. A no-op in the
/// in-memory/MTD models, which have no separate attach/detach state
/// beyond what `UbiDevice` already tracks.
pub fn close_ubi_swifota(_ubi: &mut dyn UbiDevice) -> EngineResult<()> {
    Ok(())
}

/// The 8-byte preamble identifying a valid SBL image at the start of a PEB.
pub const SBL_PREAMBLE: [u8; 8] = [0xD1, 0xDC, 0x4B, 0x84, 0x34, 0x10, 0xD7, 0x73];

/// Bounds retries when locating/writing the opposite half during a scrub;
/// one pass handles low-to-high, the other high-to-low.
pub const SBL_MAX_PASS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SblHalf {
    Low,
    High,
}

/// Writes `new_sbl` power-loss-safely: locates the half currently holding
/// a valid SBL (by preamble), writes the new image to the *opposite*
/// half, verifies it, then erases the stale half. At every instant during
/// the process, at least one half has a preamble-valid, CRC-valid SBL.
pub fn scrub_sbl(
    device: &mut dyn FlashDevice,
    new_sbl: &[u8],
    new_sbl_crc32: u32,
) -> EngineResult<SblHalf> {
    let info = device.info();
    let half_pebs = info.nb_peb / 2;

    let current_valid = find_valid_half(device, half_pebs)?;
    let target = match current_valid {
        Some(SblHalf::Low) => SblHalf::High,
        Some(SblHalf::High) | None => SblHalf::Low,
    };

    let mut last_err = None;
    for _ in 0..SBL_MAX_PASS {
        match write_half(device, target, half_pebs, new_sbl) {
            Ok(()) => {
                let offset = half_start_offset(target, half_pebs, info.erase_size);
                check_data(device, offset, new_sbl.len(), new_sbl_crc32)?;
                if let Some(stale) = current_valid {
                    erase_half(device, stale, half_pebs)?;
                }
                return Ok(target);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(EngineError::Fault("SBL scrub failed".into())))
}

fn half_start_peb(half: SblHalf, half_pebs: u32) -> u32 {
    match half {
        SblHalf::Low => 0,
        SblHalf::High => half_pebs,
    }
}

fn half_start_offset(half: SblHalf, half_pebs: u32, erase_size: u32) -> u64 {
    half_start_peb(half, half_pebs) as u64 * erase_size as u64
}

fn find_valid_half(device: &mut dyn FlashDevice, half_pebs: u32) -> EngineResult<Option<SblHalf>> {
    for half in [SblHalf::Low, SblHalf::High] {
        let start = half_start_peb(half, half_pebs);
        if device.is_bad(start) {
            continue;
        }
        let offset = start as u64 * device.info().erase_size as u64;
        let preamble = device.read(offset, SBL_PREAMBLE.len())?;
        if preamble == SBL_PREAMBLE {
            return Ok(Some(half));
        }
    }
    Ok(None)
}

fn write_half(
    device: &mut dyn FlashDevice,
    half: SblHalf,
    half_pebs: u32,
    data: &[u8],
) -> EngineResult<()> {
    let start_peb = half_start_peb(half, half_pebs);
    let mut writer = RawWriter::begin(data.len() as u64, start_peb);
    writer.write_chunk(device, data)?;
    let crc = fwupdate_proto::crc32::checksum(data);
    writer.finish(crc)?;
    Ok(())
}

fn erase_half(device: &mut dyn FlashDevice, half: SblHalf, half_pebs: u32) -> EngineResult<()> {
    let start = half_start_peb(half, half_pebs);
    for peb in start..start + half_pebs {
        device.erase(peb)?;
    }
    Ok(())
}
