// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Parse-only errors: malformed bytes, bad magic, CRC mismatches on headers.
//!
//! These never carry I/O context — once bytes are in hand, decoding either
//! succeeds or fails for a reason expressible without touching flash.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("buffer too short: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("crc_psb mismatch: header says {declared:#010x}, computed {computed:#010x}")]
    CrcPsbMismatch { declared: u32, computed: u32 },

    #[error("unsupported header revision {0} (minimum is 3)")]
    HeaderRevTooOld(u32),

    #[error("unknown image type {0:?}")]
    UnknownImageType([u8; 4]),

    #[error("compressed images are not supported (misc_opts COMPRESS bit set)")]
    CompressedUnsupported,

    #[error("APPL image missing APPSIGN signature, got {0:#010x}")]
    BadAppSignature(u32),

    #[error("product_type mismatch: expected {expected:#010x}, got {got:#010x}")]
    ProductTypeMismatch { expected: u32, got: u32 },

    #[error("zero-length image")]
    ZeroLengthImage,

    #[error("unrecognized delta patch magic {0:?}")]
    UnknownDiffType([u8; 16]),
}
