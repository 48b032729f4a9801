// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The engine-wide error taxonomy. Every public API returns `EngineResult`;
//! nothing in this crate panics except on a tagged variant reaching an
//! unreachable arm.

use fwupdate_proto::ParseError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    BadParameter(String),

    #[error("a download is already in progress")]
    Busy,

    #[error("input descriptor closed before any payload was read")]
    Closed,

    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("source mismatch: {0}")]
    SourceMismatch(String),

    #[error("crc mismatch: expected {expected:#010x}, got {got:#010x}")]
    CrcMismatch { expected: u32, got: u32 },

    #[error("flash alignment violation: {0}")]
    IoAlignment(String),

    #[error("ECC failure reported by flash layer")]
    IoEccFailure,

    #[error("flash write failed: {0}")]
    IoWriteFailed(String),

    #[error("operation terminated by caller")]
    Terminated,

    #[error("unexpected failure: {0}")]
    Fault(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether a failure of this kind should keep a previously-saved
    /// resume checkpoint around rather than discard it.
    pub fn preserves_resume_ctx(&self) -> bool {
        matches!(
            self,
            Self::NotPermitted(_) | Self::IoAlignment(_) | Self::IoEccFailure | Self::Terminated
        )
    }
}
