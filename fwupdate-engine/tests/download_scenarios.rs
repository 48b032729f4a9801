// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! End-to-end scenarios driving `DownloadSession` over a fabricated CWE
//! byte stream, the way a modem AT channel or a file-based updater would
//! feed it in, against `flash::sim` backends instead of real MTD/UBI
//! devices.

use std::collections::HashMap;
use std::io::Cursor;

use fwupdate_engine::config::{EngineConfig, SystemShape};
use fwupdate_engine::error::EngineError;
use fwupdate_engine::flash::sim::{FaultPhase, SimFlash};
use fwupdate_engine::flash::FlashDevice;
use fwupdate_engine::patch::{verify_source, PatchSession};
use fwupdate_engine::session::{DeviceResolver, DownloadOutcome, DownloadSession};
use fwupdate_engine::system::SystemState;
use fwupdate_engine::writer::scrub_sbl;
use fwupdate_proto::cursor::Writer;
use fwupdate_proto::cwe_header::CWE_HEADER_LEN;
use fwupdate_proto::cwe_header::MISC_OPTS_DELTAPATCH;
use fwupdate_proto::patch_header::{DiffKind, PatchMeta, PatchSlice, UBI_VOL_ID_RAW};
use fwupdate_proto::status::bad_image_bit;
use fwupdate_proto::{crc32, BadImageMask, ImageKind, InternalStatus};

const PRODUCT_TYPE: u32 = 0x42;

struct SimResolver {
    raw: HashMap<ImageKind, SimFlash>,
}

impl SimResolver {
    fn new() -> Self {
        Self { raw: HashMap::new() }
    }

    fn with_raw(kind: ImageKind, device: SimFlash) -> Self {
        let mut raw = HashMap::new();
        raw.insert(kind, device);
        Self { raw }
    }

    fn device(&self, kind: ImageKind) -> &SimFlash {
        self.raw.get(&kind).expect("device not opened")
    }
}

impl DeviceResolver for SimResolver {
    fn open_raw(&mut self, kind: ImageKind) -> Result<&mut dyn FlashDevice, EngineError> {
        Ok(self
            .raw
            .entry(kind)
            .or_insert_with(|| SimFlash::new(4096, 256, 8)))
    }

    fn read_source_for_patch(&mut self, _kind: ImageKind, len: usize) -> Result<Vec<u8>, EngineError> {
        Ok(vec![0u8; len])
    }
}

fn cfg() -> EngineConfig {
    EngineConfig {
        product_type: PRODUCT_TYPE,
        shape: SystemShape::DualSystem,
        chunk_size: 4096,
        ..EngineConfig::default()
    }
}

/// Builds one leaf header. The DELTAPATCH bit is clear-means-delta, so
/// pass `misc_opts = MISC_OPTS_DELTAPATCH` for a raw body, `0` for a
/// delta one.
fn header_bytes(image_type: &[u8; 4], image_size: u32, misc_opts: u8, image_crc32: u32) -> Vec<u8> {
    let psb = vec![0u8; 256];
    let crc_psb = crc32::checksum(&psb);
    let mut w = Writer::with_capacity(CWE_HEADER_LEN);
    w.bytes(&psb);
    w.u32(crc_psb);
    w.u32(3);
    w.u32(0);
    w.bytes(image_type);
    w.u32(PRODUCT_TYPE);
    w.u32(image_size);
    w.u32(image_crc32);
    w.bytes(&[0u8; 84]);
    w.bytes(&[0u8; 8]);
    w.u32(0);
    w.u8(misc_opts);
    w.bytes(&[0u8; 3]);
    w.u32(0);
    w.u32(0);
    w.u32(0);
    w.u32(0);
    let mut buf = w.into_vec();
    buf.resize(CWE_HEADER_LEN, 0);
    buf
}

/// A single raw USER leaf spanning `peb_count` erase blocks of a 4096-byte
/// erase-size / 256-byte write-size `SimFlash`.
#[test]
fn happy_path_multi_peb_raw_image_downloads_and_lands_on_device() {
    let config = cfg();
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);

    let peb_count = 4usize;
    let payload = vec![0x5Au8; peb_count * 4096];
    let crc = crc32::checksum(&payload);
    let mut stream = header_bytes(b"USER", payload.len() as u32, MISC_OPTS_DELTAPATCH, crc);
    stream.extend_from_slice(&payload);

    let mut resolver = SimResolver::new();
    let mut input = Cursor::new(stream);
    let outcome = session.download(&mut input, &mut resolver).unwrap();

    assert_eq!(outcome, DownloadOutcome::Completed);
    assert_eq!(system.status(), InternalStatus::Ok);
    let landed = resolver.device(ImageKind::User).raw();
    assert_eq!(&landed[..payload.len()], payload.as_slice());
}

#[test]
fn truncated_transfer_suspends_at_exact_byte_offset_and_can_be_queried() {
    let config = cfg();
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);

    let payload = vec![0xAAu8; 4096 * 3];
    let crc = crc32::checksum(&payload);
    let mut stream = header_bytes(b"USER", payload.len() as u32, MISC_OPTS_DELTAPATCH, crc);
    // Cut the stream partway through the second PEB.
    stream.extend_from_slice(&payload[..4096 + 1000]);

    let mut resolver = SimResolver::new();
    let mut input = Cursor::new(stream);
    let outcome = session.download(&mut input, &mut resolver).unwrap();

    match outcome {
        DownloadOutcome::Suspended { resume_position } => {
            assert_eq!(resume_position, CWE_HEADER_LEN as u64 + 4096 + 1000);
        }
        other => panic!("expected Suspended, got {other:?}"),
    }
    assert!(session.get_resume_position() > 0);
    assert_eq!(system.status(), InternalStatus::DwlFailed);
}

#[test]
fn corrupted_body_reports_crc_mismatch_and_caller_marks_the_image_bad() {
    let config = cfg();
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);

    let payload = vec![0x11u8; 4096];
    let wrong_crc = crc32::checksum(&payload) ^ 0xDEAD_BEEF;
    let mut stream = header_bytes(b"USER", payload.len() as u32, MISC_OPTS_DELTAPATCH, wrong_crc);
    stream.extend_from_slice(&payload);

    let mut resolver = SimResolver::new();
    let mut input = Cursor::new(stream);
    let err = session.download(&mut input, &mut resolver).unwrap_err();
    assert!(matches!(err, EngineError::CrcMismatch { .. }));
    assert_eq!(system.status(), InternalStatus::DwlFailed);

    // The caller is responsible for recording the failed image.
    session.set_bad_image(BadImageMask::empty().set(bad_image_bit::USERDATA1), true);
    assert_eq!(session.get_update_status().0, InternalStatus::DwlFailed);
}

/// Modeled on the CWE acceptance rule that a reapplied delta patch must
/// be refused once the live partition no longer matches `orig_crc32` (it
/// now holds the previous patch's *destination* bytes, not its origin).
#[test]
fn reapplying_a_delta_patch_against_its_own_output_is_rejected_as_source_mismatch() {
    let orig = b"the original partition contents, 32by".to_vec();
    let dest = b"the patched partition contents!abc123".to_vec();
    assert_eq!(orig.len(), dest.len());

    let meta = PatchMeta {
        diff_type: DiffKind::NoDiff,
        segment_size: dest.len() as u32,
        num_patches: 1,
        ubi_vol_id: 7,
        ubi_vol_type: 0,
        ubi_vol_flags: 0,
        orig_size: orig.len() as u32,
        orig_crc32: crc32::checksum(&orig),
        dest_size: dest.len() as u32,
        dest_crc32: crc32::checksum(&dest),
    };

    // First application: source matches orig_crc32, patch applies cleanly.
    verify_source(&meta, &orig).unwrap();
    let mut session = PatchSession::begin(meta.clone(), ImageKind::User, orig).unwrap();
    let slice = PatchSlice {
        offset: 0,
        number: 0,
        size: dest.len() as u32,
    };
    session.apply_slice(&slice, &dest).unwrap();
    let reconstructed = session.finish().unwrap();
    assert_eq!(reconstructed, dest);

    // A second application against the now-patched live partition must
    // be refused: the partition no longer matches orig_crc32/orig_size.
    let err = verify_source(&meta, &reconstructed).unwrap_err();
    assert!(matches!(err, EngineError::SourceMismatch(_)));
}

#[test]
fn imgdiff2_patch_is_rejected_against_a_raw_flash_destination() {
    let orig = vec![0u8; 16];
    let dest = vec![1u8; 16];
    let meta = PatchMeta {
        diff_type: DiffKind::Imgdiff2,
        segment_size: 16,
        num_patches: 1,
        ubi_vol_id: UBI_VOL_ID_RAW,
        ubi_vol_type: 0,
        ubi_vol_flags: 0,
        orig_size: orig.len() as u32,
        orig_crc32: crc32::checksum(&orig),
        dest_size: dest.len() as u32,
        dest_crc32: crc32::checksum(&dest),
    };
    let err = PatchSession::begin(meta, ImageKind::User, orig).unwrap_err();
    assert!(matches!(err, EngineError::Unsupported(_)));
}

#[test]
fn bad_block_injected_mid_image_is_skipped_and_image_still_lands_intact() {
    let config = cfg();
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);

    let mut device = SimFlash::new(4096, 256, 8);
    // PEB 1 fails on write: the second of a 3-PEB image should skip to PEB 2.
    device.inject_bad_block_mask(1 << 1, FaultPhase::Write);

    let payload = vec![0x77u8; 4096 * 3];
    let crc = crc32::checksum(&payload);
    let mut stream = header_bytes(b"USER", payload.len() as u32, MISC_OPTS_DELTAPATCH, crc);
    stream.extend_from_slice(&payload);

    let mut resolver = SimResolver::with_raw(ImageKind::User, device);
    let mut input = Cursor::new(stream);
    let outcome = session.download(&mut input, &mut resolver).unwrap();

    assert_eq!(outcome, DownloadOutcome::Completed);
    let landed = resolver.device(ImageKind::User);
    assert!(landed.is_bad(1));
    assert!(!landed.is_bad(2));
}

/// The scrub always targets the half opposite whichever one currently
/// carries a preamble-valid SBL, writes there, then erases the stale
/// half only after the new copy verifies — so a power loss before the
/// new copy's CRC check leaves the old half's preamble untouched.
#[test]
fn sbl_scrub_writes_opposite_half_and_erases_the_stale_one_only_after_verifying() {
    let mut device = SimFlash::new(4096, 256, 8);
    let sbl_v1 = {
        let mut preamble_and_body = fwupdate_engine::writer::SBL_PREAMBLE.to_vec();
        preamble_and_body.extend_from_slice(&[0x01u8; 4096 - 8]);
        preamble_and_body
    };
    // Seed a valid SBL in the low half directly.
    device.write(0, &sbl_v1[..256]).unwrap();
    for (i, chunk) in sbl_v1[256..].chunks(256).enumerate() {
        device.write(256 * (i as u64 + 1), chunk).unwrap();
    }

    let sbl_v2 = {
        let mut preamble_and_body = fwupdate_engine::writer::SBL_PREAMBLE.to_vec();
        preamble_and_body.extend_from_slice(&[0x02u8; 4096 - 8]);
        preamble_and_body
    };
    let crc_v2 = crc32::checksum(&sbl_v2);

    let half = scrub_sbl(&mut device, &sbl_v2, crc_v2).unwrap();
    assert_eq!(half, fwupdate_engine::writer::SblHalf::High);

    // The high half holds the new image...
    let high_bytes = device.read(4 * 4096, sbl_v2.len()).unwrap();
    assert_eq!(high_bytes, sbl_v2);

    // ...and the stale low half has been erased back to 0xFF.
    let low_bytes = device.read(0, sbl_v1.len()).unwrap();
    assert!(low_bytes.iter().all(|&b| b == 0xFF));
}
