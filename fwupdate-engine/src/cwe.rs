// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CWE container parsing (C2): a thin layer over `fwupdate_proto::CweHeader`
//! that supplies the build-time expected product type and classifies the
//! result as composite vs. leaf for the stream parser.

use fwupdate_proto::{CweHeader, ImageKind};

use crate::error::EngineResult;

pub enum LoadedHeader {
    Composite(CweHeader),
    Leaf(CweHeader),
}

/// Decode and validate a 400-byte CWE header. Never touches payload bytes.
pub fn load_header(bytes: &[u8], expected_product_type: u32) -> EngineResult<LoadedHeader> {
    let header = CweHeader::parse(bytes, expected_product_type)?;
    let kind = header.kind()?;
    Ok(if kind.is_composite() {
        LoadedHeader::Composite(header)
    } else {
        LoadedHeader::Leaf(header)
    })
}

/// Whether a leaf header's body should be read as a delta patch rather
/// than a raw payload: the DELTAPATCH misc-opts bit is clear and the
/// image type is one of the types that opt into deltas.
pub fn expects_delta_patch(header: &CweHeader, kind: ImageKind) -> bool {
    header.is_delta_patch() && kind.accepts_delta()
}
