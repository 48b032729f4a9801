// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC-32 (ISO-HDLC / zlib polynomial 0xEDB88320), used for every checksum
//! field in the CWE container and delta patch formats.

use crc::{Crc, CRC_32_ISO_HDLC};

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Incremental digest for streaming CRC accumulation across chunked reads.
pub struct Crc32Digest(crc::Digest<'static, u32>);

impl Crc32Digest {
    pub fn new() -> Self {
        Self(CRC32.digest())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

impl Default for Crc32Digest {
    fn default() -> Self {
        Self::new()
    }
}
