// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The closed set of CWE `image_type` codes this engine understands.
//!
//! Composite types carry a sequence of child CWE descriptors; leaf types
//! carry a raw (or delta-patched) payload. Modeled as a tagged enum rather
//! than a vtable, since the set of kinds is closed and known at compile time.

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    // Composite
    Appl,
    Modm,
    Spkg,
    Boot,
    // Leaf
    Sbl1,
    Dsp2,
    Apps,
    Apbl,
    Syst,
    User,
    Tzon,
    Qrpm,
    Nvup,
}

impl ImageKind {
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Appl | Self::Modm | Self::Spkg | Self::Boot)
    }

    /// Whether this leaf type may arrive as a delta patch instead of a
    /// full raw payload.
    pub fn accepts_delta(self) -> bool {
        matches!(self, Self::User | Self::Dsp2 | Self::Syst)
    }

    pub fn as_tag(self) -> &'static [u8; 4] {
        match self {
            Self::Appl => b"APPL",
            Self::Modm => b"MODM",
            Self::Spkg => b"SPKG",
            Self::Boot => b"BOOT",
            Self::Sbl1 => b"SBL1",
            Self::Dsp2 => b"DSP2",
            Self::Apps => b"APPS",
            Self::Apbl => b"APBL",
            Self::Syst => b"SYST",
            Self::User => b"USER",
            Self::Tzon => b"TZON",
            Self::Qrpm => b"QRPM",
            Self::Nvup => b"NVUP",
        }
    }

    pub fn from_tag(tag: &[u8; 4]) -> Result<Self, ParseError> {
        Ok(match tag {
            b"APPL" => Self::Appl,
            b"MODM" => Self::Modm,
            b"SPKG" => Self::Spkg,
            b"BOOT" => Self::Boot,
            b"SBL1" => Self::Sbl1,
            b"DSP2" => Self::Dsp2,
            b"APPS" => Self::Apps,
            b"APBL" => Self::Apbl,
            b"SYST" => Self::Syst,
            b"USER" => Self::User,
            b"TZON" => Self::Tzon,
            b"QRPM" => Self::Qrpm,
            b"NVUP" => Self::Nvup,
            other => return Err(ParseError::UnknownImageType(*other)),
        })
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_tag()))
    }
}
