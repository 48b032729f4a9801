// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The `PLATFORM` collaborator: requesting an A/B swap, rebooting, and
//! querying whether the two systems are currently in sync. This engine
//! only requests these actions — it never performs a swap or reboot
//! itself.

use crate::error::EngineResult;

pub trait Platform {
    /// Ask the platform to swap active/passive, optionally also marking
    /// the new side good immediately (`sync`).
    fn request_swap(&mut self, sync: bool) -> EngineResult<()>;

    fn reboot(&mut self) -> EngineResult<()>;

    /// Whether the active and passive systems currently hold identical
    /// content. Always queried fresh — never cached — since a cached
    /// answer could mask a swap that happened out from under this engine.
    fn is_in_sync(&mut self) -> EngineResult<bool>;
}

/// A no-op platform for tests: records requested actions without acting
/// on them.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    pub swap_requests: Vec<bool>,
    pub reboot_requested: bool,
    pub in_sync: bool,
}

impl Platform for RecordingPlatform {
    fn request_swap(&mut self, sync: bool) -> EngineResult<()> {
        self.swap_requests.push(sync);
        Ok(())
    }

    fn reboot(&mut self) -> EngineResult<()> {
        self.reboot_requested = true;
        Ok(())
    }

    fn is_in_sync(&mut self) -> EngineResult<bool> {
        Ok(self.in_sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_platform_tracks_swap_requests() {
        let mut p = RecordingPlatform::default();
        p.request_swap(true).unwrap();
        assert_eq!(p.swap_requests, vec![true]);
    }
}
