// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! System state & install/swap orchestrator (C7): the sync flag, the
//! bad-image bitmap, the current status, and the three independently
//! swappable partition groups. Lives in a `Mutex` so status queries can
//! run concurrently with an in-progress download.

use std::sync::Mutex;

use fwupdate_proto::{BadImageMask, InternalStatus, SyncFlag};

use crate::config::SystemShape;
use crate::error::{EngineError, EngineResult};
use crate::flash::EccStats;
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionGroup {
    Modem,
    Lk,
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSide {
    One,
    Two,
}

impl SystemSide {
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }
}

#[derive(Debug)]
struct Inner {
    sync: SyncFlag,
    bad_image: BadImageMask,
    status: InternalStatus,
    sides: [SystemSide; 3],
}

/// System Shared Data: the process-wide state this engine owns. Accessed
/// only through the methods below, each taking a short critical section.
pub struct SystemState {
    inner: Mutex<Inner>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                sync: SyncFlag::InSync,
                bad_image: BadImageMask::empty(),
                status: InternalStatus::Unknown,
                sides: [SystemSide::One; 3],
            }),
        }
    }
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    fn group_index(group: PartitionGroup) -> usize {
        match group {
            PartitionGroup::Modem => 0,
            PartitionGroup::Lk => 1,
            PartitionGroup::Linux => 2,
        }
    }

    pub fn set_status(&self, status: InternalStatus) {
        self.inner.lock().expect("SystemState mutex poisoned").status = status;
    }

    pub fn status(&self) -> InternalStatus {
        self.inner.lock().expect("SystemState mutex poisoned").status
    }

    /// `init_download`'s desync check: fails `NotPermitted` unless sync is
    /// already established or the deployment explicitly allows updating
    /// a desynced pair.
    pub fn check_sync_allowed(&self, disable_sync_before_update: bool) -> EngineResult<()> {
        let inner = self.inner.lock().expect("SystemState mutex poisoned");
        if inner.sync == SyncFlag::OutOfSync && !disable_sync_before_update {
            return Err(EngineError::NotPermitted(
                "systems are out of sync; update refused".into(),
            ));
        }
        Ok(())
    }

    /// `install(mark_good_after?)`. Single-system finalization is the
    /// caller's responsibility (it owns the swifota writer); this only
    /// updates the status.
    pub fn install(
        &self,
        shape: SystemShape,
        mark_good_after: bool,
        platform: &mut impl Platform,
    ) -> EngineResult<()> {
        let status = if mark_good_after {
            InternalStatus::SwapMgOngoing
        } else {
            InternalStatus::SwapOngoing
        };
        match shape {
            SystemShape::DualSystem => platform.request_swap(mark_good_after)?,
            SystemShape::SingleSystem => platform.reboot()?,
        }
        self.set_status(status);
        Ok(())
    }

    /// `mark_good()`, called after a successful reboot onto the new
    /// system: commits by clearing the bad-image flag and restoring sync.
    pub fn mark_good(&self, ecc: EccStats) -> EngineResult<()> {
        if ecc.failed > 0 {
            return Err(EngineError::IoEccFailure);
        }
        let mut inner = self.inner.lock().expect("SystemState mutex poisoned");
        inner.sync = SyncFlag::InSync;
        inner.status = InternalStatus::Ok;
        Ok(())
    }

    pub fn get_update_status(&self) -> (InternalStatus, &'static str) {
        let status = self.status();
        (status, status.label())
    }

    pub fn set_bad_image(&self, bit: u64, set: bool) {
        let mut inner = self.inner.lock().expect("SystemState mutex poisoned");
        inner.bad_image = if set {
            inner.bad_image.set(bit)
        } else {
            inner.bad_image.clear(bit)
        };
    }

    pub fn bad_image_mask(&self) -> BadImageMask {
        self.inner.lock().expect("SystemState mutex poisoned").bad_image
    }

    pub fn get_system(&self) -> [SystemSide; 3] {
        self.inner.lock().expect("SystemState mutex poisoned").sides
    }

    pub fn set_system(&self, groups: [(PartitionGroup, SystemSide); 3]) {
        let mut inner = self.inner.lock().expect("SystemState mutex poisoned");
        for (group, side) in groups {
            inner.sides[Self::group_index(group)] = side;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RecordingPlatform;
    use fwupdate_proto::status::bad_image_bit;

    #[test]
    fn install_dual_system_requests_swap() {
        let state = SystemState::new();
        let mut platform = RecordingPlatform::default();
        state.install(SystemShape::DualSystem, true, &mut platform).unwrap();
        assert_eq!(platform.swap_requests, vec![true]);
        assert_eq!(state.status(), InternalStatus::SwapMgOngoing);
    }

    #[test]
    fn mark_good_rejects_ecc_failure() {
        let state = SystemState::new();
        let ecc = EccStats {
            corrected: 0,
            failed: 1,
            bad_blocks: 0,
        };
        assert!(matches!(state.mark_good(ecc), Err(EngineError::IoEccFailure)));
    }

    #[test]
    fn mark_good_restores_sync_and_ok_status() {
        let state = SystemState::new();
        state.mark_good(EccStats::default()).unwrap();
        assert_eq!(state.status(), InternalStatus::Ok);
    }

    #[test]
    fn bad_image_mask_round_trips() {
        let state = SystemState::new();
        state.set_bad_image(bad_image_bit::MODEM1, true);
        assert!(state.bad_image_mask().is_set(bad_image_bit::MODEM1));
        state.set_bad_image(bad_image_bit::MODEM1, false);
        assert!(!state.bad_image_mask().is_set(bad_image_bit::MODEM1));
    }

    #[test]
    fn set_system_updates_requested_group_only() {
        let state = SystemState::new();
        state.set_system([
            (PartitionGroup::Modem, SystemSide::Two),
            (PartitionGroup::Lk, SystemSide::One),
            (PartitionGroup::Linux, SystemSide::One),
        ]);
        let sides = state.get_system();
        assert_eq!(sides[0], SystemSide::Two);
        assert_eq!(sides[1], SystemSide::One);
    }
}
