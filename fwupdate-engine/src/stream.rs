// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Stream parser / state machine (C5): turns a flat byte stream into the
//! sequence of header/body events the download session drives the writer
//! with. Never does I/O itself — the caller reads exactly
//! `next_length_to_read()` bytes and hands them to `feed()`.

use fwupdate_proto::cwe_header::CWE_HEADER_LEN;
use fwupdate_proto::crc32::Crc32Digest;
use fwupdate_proto::patch_header::{PATCH_META_READ_LEN, PATCH_SLICE_LEN};
use fwupdate_proto::{CweHeader, ImageKind, PatchMeta, PatchSlice};

use crate::cwe::{expects_delta_patch, load_header, LoadedHeader};
use crate::error::{EngineError, EngineResult};

#[derive(Debug)]
enum ParserState {
    AwaitTopHeader,
    AwaitChildHeader,
    AwaitBody {
        kind: ImageKind,
        header: Box<CweHeader>,
        remaining: u64,
    },
    AwaitPatchMeta {
        kind: ImageKind,
        header: Box<CweHeader>,
    },
    AwaitPatchSlice {
        kind: ImageKind,
        header: Box<CweHeader>,
        meta: PatchMeta,
        slices_done: u32,
    },
    AwaitPatchBody {
        kind: ImageKind,
        header: Box<CweHeader>,
        meta: PatchMeta,
        slices_done: u32,
        slice: PatchSlice,
        remaining: u32,
    },
    Done,
}

/// One parsed event, in the order the underlying bytes arrived.
#[derive(Debug)]
pub enum StreamEvent {
    /// A composite header was parsed; no body of its own follows directly,
    /// only nested child headers.
    CompositeHeader(ImageKind),
    /// A leaf header was parsed; `delta` tells the caller whether the body
    /// that follows is a raw payload or a patch-meta + slices stream.
    LeafHeader {
        kind: ImageKind,
        delta: bool,
        image_size: u32,
        image_crc32: u32,
    },
    RawBodyChunk(Vec<u8>),
    PatchMeta(PatchMeta),
    PatchSliceHeader(PatchSlice),
    PatchSliceBodyChunk(Vec<u8>),
}

/// Drives the header/body alternation and the two running CRC32
/// accumulators (`current_image_crc` over the active leaf body,
/// `current_global_crc` over every byte of the outermost package).
pub struct StreamParser {
    state: ParserState,
    expected_product_type: u32,
    composite_stack: Vec<u64>,
    current_image_crc: Crc32Digest,
    global_crc: Crc32Digest,
    top_image_crc32: Option<u32>,
    finished_leaf: Option<ImageKind>,
}

impl StreamParser {
    pub fn new(expected_product_type: u32) -> Self {
        Self {
            state: ParserState::AwaitTopHeader,
            expected_product_type,
            composite_stack: Vec::new(),
            current_image_crc: Crc32Digest::new(),
            global_crc: Crc32Digest::new(),
            top_image_crc32: None,
            finished_leaf: None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ParserState::Done)
    }

    /// Returns the image type whose body just finished CRC verification
    /// during the last `feed()` call, if any. Consumes the notification —
    /// a second call returns `None` until another leaf finishes.
    pub fn take_finished_leaf(&mut self) -> Option<ImageKind> {
        self.finished_leaf.take()
    }

    /// `length_to_read(chunk_len, mode)`: 400 for any header read, 256 for
    /// a patch-meta read, 12 for a patch-slice header, or
    /// `min(chunk_len, remaining_in_body)` while streaming a body.
    pub fn next_length_to_read(&self, chunk_len: usize) -> usize {
        match &self.state {
            ParserState::AwaitTopHeader | ParserState::AwaitChildHeader => CWE_HEADER_LEN,
            ParserState::AwaitPatchMeta { .. } => PATCH_META_READ_LEN,
            ParserState::AwaitPatchSlice { .. } => PATCH_SLICE_LEN,
            ParserState::AwaitBody { remaining, .. } => chunk_len.min(*remaining as usize),
            ParserState::AwaitPatchBody { remaining, .. } => chunk_len.min(*remaining as usize),
            ParserState::Done => 0,
        }
    }

    fn account_global(&mut self, bytes: &[u8]) {
        self.global_crc.update(bytes);
        if let Some(top) = self.composite_stack.last_mut() {
            *top = top.saturating_sub(bytes.len() as u64);
        }
    }

    /// Feed exactly `next_length_to_read(..)` bytes. Never called with a
    /// short read — the caller drains the input to that exact length first.
    pub fn feed(&mut self, bytes: &[u8]) -> EngineResult<StreamEvent> {
        match std::mem::replace(&mut self.state, ParserState::Done) {
            ParserState::AwaitTopHeader => self.feed_top_header(bytes),
            ParserState::AwaitChildHeader => self.feed_child_header(bytes),
            ParserState::AwaitBody {
                kind,
                header,
                remaining,
            } => self.feed_body(kind, header, remaining, bytes),
            ParserState::AwaitPatchMeta { kind, header } => {
                self.feed_patch_meta(kind, header, bytes)
            }
            ParserState::AwaitPatchSlice {
                kind,
                header,
                meta,
                slices_done,
            } => self.feed_patch_slice_header(kind, header, meta, slices_done, bytes),
            ParserState::AwaitPatchBody {
                kind,
                header,
                meta,
                slices_done,
                slice,
                remaining,
            } => self.feed_patch_slice_body(kind, header, meta, slices_done, slice, remaining, bytes),
            ParserState::Done => Err(EngineError::BadParameter(
                "stream already complete".into(),
            )),
        }
    }

    fn feed_top_header(&mut self, bytes: &[u8]) -> EngineResult<StreamEvent> {
        let header = match load_header(bytes, self.expected_product_type)? {
            LoadedHeader::Composite(h) => h,
            LoadedHeader::Leaf(h) => h,
        };
        self.top_image_crc32 = Some(header.image_crc32);
        self.begin_header(header)
    }

    fn feed_child_header(&mut self, bytes: &[u8]) -> EngineResult<StreamEvent> {
        self.account_global(bytes);
        let header = match load_header(bytes, self.expected_product_type)? {
            LoadedHeader::Composite(h) => h,
            LoadedHeader::Leaf(h) => h,
        };
        self.begin_header(header)
    }

    fn begin_header(&mut self, header: CweHeader) -> EngineResult<StreamEvent> {
        let kind = header.kind()?;
        if kind.is_composite() {
            self.composite_stack.push(header.image_size as u64);
            self.state = ParserState::AwaitChildHeader;
            return Ok(StreamEvent::CompositeHeader(kind));
        }

        self.current_image_crc = Crc32Digest::new();
        let delta = expects_delta_patch(&header, kind);
        let image_size = header.image_size;
        let image_crc32 = header.image_crc32;
        self.state = if delta {
            ParserState::AwaitPatchMeta {
                kind,
                header: Box::new(header),
            }
        } else {
            ParserState::AwaitBody {
                kind,
                header: Box::new(header),
                remaining: image_size as u64,
            }
        };
        Ok(StreamEvent::LeafHeader {
            kind,
            delta,
            image_size,
            image_crc32,
        })
    }

    fn feed_body(
        &mut self,
        kind: ImageKind,
        header: Box<CweHeader>,
        remaining: u64,
        bytes: &[u8],
    ) -> EngineResult<StreamEvent> {
        if bytes.len() as u64 > remaining {
            return Err(EngineError::BadParameter(
                "body chunk longer than remaining image size".into(),
            ));
        }
        self.current_image_crc.update(bytes);
        self.account_global(bytes);
        let remaining = remaining - bytes.len() as u64;

        if remaining == 0 {
            self.finish_leaf(kind, &header)?;
            return Ok(StreamEvent::RawBodyChunk(bytes.to_vec()));
        }

        self.state = ParserState::AwaitBody {
            kind,
            header,
            remaining,
        };
        Ok(StreamEvent::RawBodyChunk(bytes.to_vec()))
    }

    fn feed_patch_meta(
        &mut self,
        kind: ImageKind,
        header: Box<CweHeader>,
        bytes: &[u8],
    ) -> EngineResult<StreamEvent> {
        self.current_image_crc.update(bytes);
        self.account_global(bytes);
        let meta = PatchMeta::parse(bytes)?;
        if meta.num_patches == 0 {
            self.finish_leaf(kind, &header)?;
            return Ok(StreamEvent::PatchMeta(meta));
        }
        self.state = ParserState::AwaitPatchSlice {
            kind,
            header,
            meta: meta.clone(),
            slices_done: 0,
        };
        Ok(StreamEvent::PatchMeta(meta))
    }

    fn feed_patch_slice_header(
        &mut self,
        kind: ImageKind,
        header: Box<CweHeader>,
        meta: PatchMeta,
        slices_done: u32,
        bytes: &[u8],
    ) -> EngineResult<StreamEvent> {
        self.current_image_crc.update(bytes);
        self.account_global(bytes);
        let slice = PatchSlice::parse(bytes)?;
        if slice.size == 0 {
            self.advance_past_slice(kind, header, meta, slices_done)?;
            return Ok(StreamEvent::PatchSliceHeader(slice));
        }
        self.state = ParserState::AwaitPatchBody {
            kind,
            header,
            meta,
            slices_done,
            slice,
            remaining: slice.size,
        };
        Ok(StreamEvent::PatchSliceHeader(slice))
    }

    fn feed_patch_slice_body(
        &mut self,
        kind: ImageKind,
        header: Box<CweHeader>,
        meta: PatchMeta,
        slices_done: u32,
        slice: PatchSlice,
        remaining: u32,
        bytes: &[u8],
    ) -> EngineResult<StreamEvent> {
        if bytes.len() as u32 > remaining {
            return Err(EngineError::BadParameter(
                "patch slice chunk longer than declared slice size".into(),
            ));
        }
        self.current_image_crc.update(bytes);
        self.account_global(bytes);
        let remaining = remaining - bytes.len() as u32;

        if remaining == 0 {
            self.advance_past_slice(kind, header, meta, slices_done + 1)?;
        } else {
            self.state = ParserState::AwaitPatchBody {
                kind,
                header,
                meta,
                slices_done,
                slice,
                remaining,
            };
        }
        Ok(StreamEvent::PatchSliceBodyChunk(bytes.to_vec()))
    }

    fn advance_past_slice(
        &mut self,
        kind: ImageKind,
        header: Box<CweHeader>,
        meta: PatchMeta,
        slices_done: u32,
    ) -> EngineResult<()> {
        if slices_done >= meta.num_patches {
            self.finish_leaf(kind, &header)
        } else {
            self.state = ParserState::AwaitPatchSlice {
                kind,
                header,
                meta,
                slices_done,
            };
            Ok(())
        }
    }

    fn finish_leaf(&mut self, kind: ImageKind, header: &CweHeader) -> EngineResult<()> {
        let digest = std::mem::take(&mut self.current_image_crc);
        let got = digest.finalize();
        if got != header.image_crc32 {
            return Err(EngineError::CrcMismatch {
                expected: header.image_crc32,
                got,
            });
        }
        self.finished_leaf = Some(kind);
        self.advance_after_leaf()
    }

    /// After a leaf body completes, pop any composite containers whose
    /// declared byte count has been fully consumed, then either await the
    /// next sibling header or close out the stream.
    fn advance_after_leaf(&mut self) -> EngineResult<()> {
        while matches!(self.composite_stack.last(), Some(0)) {
            self.composite_stack.pop();
        }
        if self.composite_stack.is_empty() {
            self.state = ParserState::Done;
        } else {
            self.state = ParserState::AwaitChildHeader;
        }
        Ok(())
    }

    /// Call once the underlying input has reached EOF. Verifies the
    /// global CRC if the stream reported itself complete; otherwise the
    /// caller should persist a resume checkpoint instead.
    pub fn verify_complete(&mut self) -> EngineResult<()> {
        if !self.is_done() {
            return Err(EngineError::BadParameter(
                "stream ended before the outermost package completed".into(),
            ));
        }
        if let Some(expected) = self.top_image_crc32 {
            let digest = std::mem::take(&mut self.global_crc);
            let got = digest.finalize();
            if got != expected {
                return Err(EngineError::CrcMismatch { expected, got });
            }
        }
        Ok(())
    }
}
