// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Download session orchestrator: drives the stream parser over an input
//! reader, routes leaf bodies to the right writer (raw or delta patch),
//! checkpoints on suspension, and owns install/mark-good/status once a
//! download has landed.

use std::io::Read;

use fwupdate_proto::{
    BadImageMask, CweHeader, ImageKind, InternalStatus, PartitionMetadata, PatchMeta, ResumeContext,
};

use crate::config::{EngineConfig, SystemShape};
use crate::error::{EngineError, EngineResult};
use crate::flash::FlashDevice;
use crate::patch::{verify_source, PatchSession};
use crate::platform::Platform;
use crate::resume::ResumeManager;
use crate::stream::{StreamEvent, StreamParser};
use crate::system::SystemState;
use crate::writer::RawWriter;
use fwupdate_proto::partition_meta::PARTITION_META_LEN;
use fwupdate_proto::PatchSlice;

/// Resolves a leaf image type to the raw-flash device it should be
/// written to, and supplies the source bytes a delta patch is applied
/// against. Mirrors the real target only knowing which MTD partition to
/// open once it has seen the leaf's `image_type`.
pub trait DeviceResolver {
    fn open_raw(&mut self, kind: ImageKind) -> EngineResult<&mut dyn FlashDevice>;
    fn read_source_for_patch(&mut self, kind: ImageKind, len: usize) -> EngineResult<Vec<u8>>;

    /// Lands a completed patch session's fully reconstructed UBI volume.
    /// Only a resolver that actually opens `PatchMeta::targets_ubi()`
    /// leaves needs to override this; the default refuses, since a raw
    /// destination never reaches this method (it goes through `open_raw`
    /// instead).
    fn write_patch_to_ubi(
        &mut self,
        kind: ImageKind,
        meta: &PatchMeta,
        data: &[u8],
    ) -> EngineResult<()> {
        let _ = (kind, meta, data);
        Err(EngineError::Unsupported(
            "this resolver has no UBI backend".into(),
        ))
    }

    /// Opens the `swifota` staging partition a single-system deployment
    /// assembles updates into before `install()` copies them onto the
    /// live partitions. Only a `SingleSystem` deployment ever calls this;
    /// the default refuses since a dual-system resolver has no such
    /// partition to open.
    fn open_swifota(&mut self) -> EngineResult<&mut dyn FlashDevice> {
        Err(EngineError::Unsupported(
            "this resolver has no swifota partition".into(),
        ))
    }
}

pub struct DownloadSession<'a> {
    config: &'a EngineConfig,
    system: &'a SystemState,
    resume: ResumeManager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed,
    Suspended { resume_position: u64 },
}

/// Per-leaf state the session keeps while a body is being streamed. Only
/// one of these is live at a time; a raw leaf picks `Raw` immediately, a
/// delta leaf starts as `PendingPatch` until its `PatchMeta` arrives and
/// the source image can be read and verified.
enum LeafSink {
    None,
    Raw {
        kind: ImageKind,
        writer: RawWriter,
        image_crc32: u32,
    },
    PendingPatch {
        kind: ImageKind,
    },
    Patch {
        kind: ImageKind,
        meta: PatchMeta,
        session: PatchSession,
        pending_slice: Option<PatchSlice>,
    },
}

impl<'a> DownloadSession<'a> {
    pub fn new(config: &'a EngineConfig, system: &'a SystemState) -> Self {
        let (a, b) = config.resume_ctx_paths();
        Self {
            config,
            system,
            resume: ResumeManager::new(a, b),
        }
    }

    /// `init_download()`: refuses to start on a desynced pair unless the
    /// deployment explicitly allows it, then clears any stale checkpoint.
    pub fn init_download(&self) -> EngineResult<()> {
        self.system
            .check_sync_allowed(self.config.disable_sync_before_update)?;
        self.resume.clear()?;
        self.system.set_status(InternalStatus::DwlOngoing);
        Ok(())
    }

    pub fn get_resume_position(&self) -> u64 {
        self.resume.resume_position()
    }

    /// Drives the stream parser over `input`, writing each leaf body to
    /// the device the resolver opens for it. Returns `Suspended` once
    /// `input` reaches EOF before the outermost package completes — the
    /// resume checkpoint has already been saved at that point. Returns
    /// `Completed` once every byte has been consumed and every CRC has
    /// verified.
    pub fn download(
        &self,
        input: &mut dyn Read,
        resolver: &mut dyn DeviceResolver,
    ) -> EngineResult<DownloadOutcome> {
        let mut parser = StreamParser::new(self.config.product_type);
        let mut total_read: u64 = 0;
        let mut sink = LeafSink::None;

        loop {
            if parser.is_done() {
                break;
            }
            let want = parser.next_length_to_read(self.config.chunk_size);
            if want == 0 {
                break;
            }

            let mut buf = vec![0u8; want];
            if !fill_exact(input, &mut buf)? {
                if total_read == 0 {
                    return Err(EngineError::Closed);
                }
                self.checkpoint(total_read)?;
                self.system.set_status(InternalStatus::DwlFailed);
                return Ok(DownloadOutcome::Suspended {
                    resume_position: total_read,
                });
            }
            total_read += buf.len() as u64;

            let event = parser.feed(&buf).map_err(|e| self.fail_download(e))?;

            self.handle_event(event, resolver, &mut sink)
                .map_err(|e| self.fail_download(e))?;

            if let Some(kind) = parser.take_finished_leaf() {
                self.finish_leaf_sink(kind, &mut sink, resolver)?;
            }
        }

        parser.verify_complete()?;
        self.resume.clear()?;
        self.system.set_status(InternalStatus::Ok);
        Ok(DownloadOutcome::Completed)
    }

    fn handle_event(
        &self,
        event: StreamEvent,
        resolver: &mut dyn DeviceResolver,
        sink: &mut LeafSink,
    ) -> EngineResult<()> {
        match event {
            StreamEvent::CompositeHeader(_) => Ok(()),
            StreamEvent::LeafHeader {
                kind,
                delta,
                image_size,
                image_crc32,
            } => {
                if delta {
                    *sink = LeafSink::PendingPatch { kind };
                } else {
                    *sink = LeafSink::Raw {
                        kind,
                        writer: RawWriter::begin(image_size as u64, 0),
                        image_crc32,
                    };
                }
                Ok(())
            }
            StreamEvent::RawBodyChunk(bytes) => {
                if let LeafSink::Raw { kind, writer, .. } = sink {
                    let device = resolver.open_raw(*kind)?;
                    writer.write_chunk(device, &bytes)?;
                }
                Ok(())
            }
            StreamEvent::PatchMeta(meta) => {
                let kind = match sink {
                    LeafSink::PendingPatch { kind } => *kind,
                    _ => {
                        return Err(EngineError::Fault(
                            "patch meta with no pending leaf".into(),
                        ))
                    }
                };
                let source = resolver.read_source_for_patch(kind, meta.orig_size as usize)?;
                verify_source(&meta, &source)?;
                let session = PatchSession::begin(meta.clone(), kind, source)?;
                *sink = LeafSink::Patch {
                    kind,
                    meta,
                    session,
                    pending_slice: None,
                };
                Ok(())
            }
            StreamEvent::PatchSliceHeader(slice) => {
                if let LeafSink::Patch { pending_slice, .. } = sink {
                    *pending_slice = Some(slice);
                }
                Ok(())
            }
            StreamEvent::PatchSliceBodyChunk(bytes) => {
                if let LeafSink::Patch {
                    session,
                    pending_slice,
                    ..
                } = sink
                {
                    let slice = pending_slice.take().ok_or_else(|| {
                        EngineError::Fault("patch slice body with no pending slice header".into())
                    })?;
                    session.apply_slice(&slice, &bytes)?;
                }
                Ok(())
            }
        }
    }

    /// Called once the stream parser reports `kind`'s body CRC verified;
    /// finalizes whichever sink was live (raw writer or patch session),
    /// landing the result on the destination device.
    fn finish_leaf_sink(
        &self,
        kind: ImageKind,
        sink: &mut LeafSink,
        resolver: &mut dyn DeviceResolver,
    ) -> EngineResult<()> {
        match std::mem::replace(sink, LeafSink::None) {
            LeafSink::Raw {
                kind: sink_kind,
                writer,
                image_crc32,
            } if sink_kind == kind => {
                writer.finish(image_crc32)?;
                Ok(())
            }
            LeafSink::Patch {
                kind: sink_kind,
                meta,
                session,
                ..
            } if sink_kind == kind => {
                let reconstructed = session.finish()?;
                if meta.targets_ubi() {
                    resolver.write_patch_to_ubi(kind, &meta, &reconstructed)?;
                } else {
                    let device = resolver.open_raw(kind)?;
                    let mut writer = RawWriter::begin(reconstructed.len() as u64, 0);
                    writer.write_chunk(device, &reconstructed)?;
                    writer.finish(meta.dest_crc32)?;
                }
                Ok(())
            }
            other => {
                *sink = other;
                Ok(())
            }
        }
    }

    /// Marks the download failed and, unless the error is one
    /// `EngineError::preserves_resume_ctx` says is safe to resume from
    /// (an environmental fault rather than corrupt-in-flight data), drops
    /// any checkpoint already saved — resuming a CRC/parse failure from
    /// its stale offset would just replay the same corruption.
    fn fail_download(&self, err: EngineError) -> EngineError {
        self.system.set_status(InternalStatus::DwlFailed);
        if !err.preserves_resume_ctx() {
            let _ = self.resume.clear();
        }
        err
    }

    fn checkpoint(&self, total_read: u64) -> EngineResult<()> {
        let ctx = ResumeContext {
            ctx_counter: self.next_counter(),
            image_type: 0,
            image_size: 0,
            image_crc: 0,
            current_image_crc: 0,
            global_crc: 0,
            current_global_crc: 0,
            total_read,
            current_offset: 0,
            full_image_length: total_read as i64,
            misc_opts: 0,
            is_first_nvup_downloaded: false,
            is_modem_downloaded: false,
            is_image_to_be_read: false,
            patch_meta: None,
            patch_slices: Vec::new(),
        };
        self.resume.save(&ctx)
    }

    fn next_counter(&self) -> u32 {
        self.resume
            .load()
            .map(|c| c.ctx_counter.wrapping_add(1))
            .unwrap_or(1)
    }

    pub fn mark_good(&self, ecc: crate::flash::EccStats) -> EngineResult<()> {
        self.system.mark_good(ecc)
    }

    /// Copies the staged image out of the `swifota` partition onto its
    /// live partition, read back from the `PartitionMetadata` header the
    /// download side wrote to PEB 0. Only meaningful for `SingleSystem`;
    /// `install()` skips this entirely on a dual-system deployment.
    fn finalize_swifota(&self, resolver: &mut dyn DeviceResolver) -> EngineResult<()> {
        let header_bytes = {
            let device = resolver.open_swifota()?;
            device.read(0, PARTITION_META_LEN)?
        };
        let meta = PartitionMetadata::parse(&header_bytes)?;
        let header = CweHeader::parse(&meta.cwe_header_raw, self.config.product_type)?;
        let kind = header.kind()?;

        let body = {
            let device = resolver.open_swifota()?;
            device.read(meta.offset as u64, meta.image_size as usize)?
        };

        let device = resolver.open_raw(kind)?;
        let mut writer = RawWriter::begin(body.len() as u64, 0);
        writer.write_chunk(device, &body)?;
        writer.finish(header.image_crc32)?;
        Ok(())
    }

    pub fn install(
        &self,
        mark_good_after: bool,
        platform: &mut impl Platform,
        resolver: &mut dyn DeviceResolver,
    ) -> EngineResult<()> {
        if self.config.shape == SystemShape::SingleSystem {
            self.finalize_swifota(resolver)?;
        }
        self.system
            .install(self.config.shape, mark_good_after, platform)
    }

    pub fn get_update_status(&self) -> (InternalStatus, &'static str) {
        self.system.get_update_status()
    }

    pub fn set_bad_image(&self, mask: BadImageMask, set: bool) {
        for bit in 0u64..64 {
            if mask.is_set(bit) {
                self.system.set_bad_image(bit, set);
            }
        }
    }
}

/// Drains `input` to exactly `buf.len()` bytes, tolerating the partial
/// reads POSIX `read()` permits. Returns `false` only when EOF arrives
/// before any byte of this call has been read.
fn fill_exact(input: &mut dyn Read, buf: &mut [u8]) -> EngineResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..]).map_err(EngineError::Io)?;
        if n == 0 {
            return if filled == 0 {
                Ok(false)
            } else {
                Err(EngineError::Closed)
            };
        }
        filled += n;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemShape;
    use crate::flash::sim::SimFlash;
    use fwupdate_proto::crc32;
    use fwupdate_proto::cursor::Writer;
    use fwupdate_proto::cwe_header::{CWE_HEADER_LEN, MISC_OPTS_DELTAPATCH};
    use std::collections::HashMap;
    use std::io::Cursor;

    struct SimResolver {
        raw: HashMap<ImageKind, SimFlash>,
    }

    impl DeviceResolver for SimResolver {
        fn open_raw(&mut self, kind: ImageKind) -> EngineResult<&mut dyn FlashDevice> {
            Ok(self
                .raw
                .entry(kind)
                .or_insert_with(|| SimFlash::new(4096, 256, 8)))
        }

        fn read_source_for_patch(&mut self, _kind: ImageKind, len: usize) -> EngineResult<Vec<u8>> {
            Ok(vec![0u8; len])
        }
    }

    fn cfg() -> EngineConfig {
        EngineConfig {
            product_type: 0x42,
            shape: SystemShape::DualSystem,
            chunk_size: 4096,
            ..EngineConfig::default()
        }
    }

    fn header_bytes(
        image_type: &[u8; 4],
        image_size: u32,
        misc_opts: u8,
        image_crc32: u32,
    ) -> Vec<u8> {
        let psb = vec![0u8; 256];
        let crc_psb = crc32::checksum(&psb);
        let mut w = Writer::with_capacity(CWE_HEADER_LEN);
        w.bytes(&psb);
        w.u32(crc_psb);
        w.u32(3);
        w.u32(0);
        w.bytes(image_type);
        w.u32(0x42);
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

    #[test]
    fn init_download_clears_prior_resume_state() {
        let config = cfg();
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);
        session.init_download().unwrap();
        assert_eq!(system.status(), InternalStatus::DwlOngoing);
        assert_eq!(session.get_resume_position(), 0);
    }

    #[test]
    fn early_close_is_reported_as_closed() {
        let config = cfg();
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);
        let mut resolver = SimResolver { raw: HashMap::new() };
        let mut input = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            session.download(&mut input, &mut resolver),
            Err(EngineError::Closed)
        ));
    }

    #[test]
    fn full_raw_leaf_downloads_and_completes() {
        let config = cfg();
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);

        let payload = vec![0xAAu8; 4096];
        let crc = crc32::checksum(&payload);
        let mut stream = header_bytes(b"USER", payload.len() as u32, MISC_OPTS_DELTAPATCH, crc);
        stream.extend_from_slice(&payload);

        let mut resolver = SimResolver { raw: HashMap::new() };
        let mut input = Cursor::new(stream);
        let outcome = session.download(&mut input, &mut resolver).unwrap();
        assert_eq!(outcome, DownloadOutcome::Completed);
        assert_eq!(system.status(), InternalStatus::Ok);
    }

    #[test]
    fn truncated_stream_checkpoints_and_suspends() {
        let config = cfg();
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);

        let payload = vec![0xAAu8; 4096];
        let crc = crc32::checksum(&payload);
        let mut stream = header_bytes(b"USER", payload.len() as u32, MISC_OPTS_DELTAPATCH, crc);
        stream.extend_from_slice(&payload[..2048]);

        let mut resolver = SimResolver { raw: HashMap::new() };
        let mut input = Cursor::new(stream);
        let outcome = session.download(&mut input, &mut resolver).unwrap();
        match outcome {
            DownloadOutcome::Suspended { resume_position } => {
                assert_eq!(resume_position, CWE_HEADER_LEN as u64 + 2048);
            }
            other => panic!("expected Suspended, got {other:?}"),
        }
        assert!(session.get_resume_position() > 0);
    }

    /// A completed delta leaf must land its reconstructed bytes on the
    /// raw flash device the resolver opens for it, not just verify them.
    #[test]
    fn delta_leaf_lands_reconstructed_bytes_on_raw_device() {
        use fwupdate_proto::crc32::Crc32Digest;
        use fwupdate_proto::patch_header::{DiffKind, PatchMeta, PatchSlice, UBI_VOL_ID_RAW};

        let config = cfg();
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);

        let dest = vec![0x5Au8; 16];
        let meta = PatchMeta {
            diff_type: DiffKind::NoDiff,
            segment_size: dest.len() as u32,
            num_patches: 1,
            ubi_vol_id: UBI_VOL_ID_RAW,
            ubi_vol_type: 0,
            ubi_vol_flags: 0,
            orig_size: 16,
            orig_crc32: crc32::checksum(&[0u8; 16]),
            dest_size: dest.len() as u32,
            dest_crc32: crc32::checksum(&dest),
        };
        let meta_bytes = meta.encode();
        let slice = PatchSlice {
            offset: 0,
            number: 0,
            size: dest.len() as u32,
        };
        let leaf_body_crc = {
            let mut d = Crc32Digest::new();
            d.update(&meta_bytes);
            d.update(&slice.encode());
            d.update(&dest);
            d.finalize()
        };
        let header = header_bytes(b"USER", 999, 0, leaf_body_crc);

        let mut stream = header;
        stream.extend_from_slice(&meta_bytes);
        stream.extend_from_slice(&slice.encode());
        stream.extend_from_slice(&dest);

        let mut resolver = SimResolver { raw: HashMap::new() };
        let mut input = Cursor::new(stream);
        let outcome = session.download(&mut input, &mut resolver).unwrap();
        assert_eq!(outcome, DownloadOutcome::Completed);

        let landed = resolver.raw.get(&ImageKind::User).unwrap().raw();
        assert_eq!(&landed[..dest.len()], dest.as_slice());
    }

    /// A failure kind `preserves_resume_ctx` does not cover (corrupt
    /// in-flight data) must drop any checkpoint already on disk, since
    /// resuming from it would just replay the same corruption.
    #[test]
    fn fail_download_clears_checkpoint_for_unrecoverable_errors() {
        let config = cfg();
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);
        session.checkpoint(4096).unwrap();
        assert_eq!(session.get_resume_position(), 4096);

        let err = session.fail_download(EngineError::CrcMismatch { expected: 1, got: 2 });
        assert!(matches!(err, EngineError::CrcMismatch { .. }));
        assert_eq!(session.get_resume_position(), 0);
        assert_eq!(system.status(), InternalStatus::DwlFailed);
    }

    /// A failure kind `preserves_resume_ctx` does cover (an environmental
    /// fault unrelated to the data already accepted) must leave the
    /// checkpoint alone so the caller can resume from it.
    #[test]
    fn fail_download_preserves_checkpoint_for_recoverable_errors() {
        let config = cfg();
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);
        session.checkpoint(4096).unwrap();

        let err = session.fail_download(EngineError::IoEccFailure);
        assert!(matches!(err, EngineError::IoEccFailure));
        assert_eq!(session.get_resume_position(), 4096);
        assert_eq!(system.status(), InternalStatus::DwlFailed);
    }

    struct SwifotaResolver {
        swifota: SimFlash,
        raw: HashMap<ImageKind, SimFlash>,
    }

    impl DeviceResolver for SwifotaResolver {
        fn open_raw(&mut self, kind: ImageKind) -> EngineResult<&mut dyn FlashDevice> {
            Ok(self
                .raw
                .entry(kind)
                .or_insert_with(|| SimFlash::new(4096, 256, 8)))
        }

        fn read_source_for_patch(&mut self, _kind: ImageKind, len: usize) -> EngineResult<Vec<u8>> {
            Ok(vec![0u8; len])
        }

        fn open_swifota(&mut self) -> EngineResult<&mut dyn FlashDevice> {
            Ok(&mut self.swifota)
        }
    }

    /// `install()` on a `SingleSystem` deployment must read the staged
    /// image back out of the `swifota` partition's `PartitionMetadata`
    /// header and land it on the live partition before handing off to
    /// the platform reboot — not just request the reboot.
    #[test]
    fn single_system_install_copies_staged_image_out_of_swifota() {
        use fwupdate_proto::partition_meta::PartitionMetadata;
        use fwupdate_proto::partition_meta::{MAGIC_BEGIN, MAGIC_END};
        use crate::platform::RecordingPlatform;

        let mut config = cfg();
        config.shape = SystemShape::SingleSystem;
        let system = SystemState::new();
        let session = DownloadSession::new(&config, &system);

        let body = vec![0x5Au8; 4096];
        let body_crc = crc32::checksum(&body);
        let cwe_header_raw = header_bytes(b"USER", body.len() as u32, MISC_OPTS_DELTAPATCH, body_crc);
        let meta = PartitionMetadata {
            cwe_header_raw,
            magic_begin: MAGIC_BEGIN,
            version: 1,
            offset: 4096,
            logical_block: 1,
            phy_block: 1,
            image_size: body.len() as u32,
            dld_source: 0,
            nb_components: 1,
            reserved: vec![0u8; 108],
            magic_end: MAGIC_END,
        };
        let mut encoded_meta = meta.encode();
        let write_size = 256usize;
        let pad = (write_size - encoded_meta.len() % write_size) % write_size;
        encoded_meta.extend(std::iter::repeat(0xFFu8).take(pad));

        let mut swifota = SimFlash::new(4096, 256, 4);
        swifota.erase(0).unwrap();
        swifota.write(0, &encoded_meta).unwrap();
        swifota.erase(1).unwrap();
        swifota.write(4096, &body).unwrap();

        let mut resolver = SwifotaResolver {
            swifota,
            raw: HashMap::new(),
        };
        let mut platform = RecordingPlatform::default();

        session.install(false, &mut platform, &mut resolver).unwrap();

        let landed = resolver.raw.get(&ImageKind::User).unwrap().raw();
        assert_eq!(&landed[..body.len()], body.as_slice());
        assert!(platform.reboot_requested);
    }
}
