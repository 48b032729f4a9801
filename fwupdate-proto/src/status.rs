// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! System state values kept in the System Shared Data region: the overall
//! install/download status, and the bad-image bitmap with its fixed label
//! table.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalStatus {
    Ok,
    Sbl,
    Mibib,
    Sedb,
    Tz1,
    Tz2,
    Rpm1,
    Rpm2,
    Modem1,
    Modem2,
    Lk1,
    Lk2,
    Kernel1,
    Kernel2,
    RootFs1,
    RootFs2,
    UserData1,
    UserData2,
    CustApp1,
    CustApp2,
    DwlOngoing,
    DwlFailed,
    DwlTimeout,
    SwapMgOngoing,
    SwapOngoing,
    Unknown,
}

impl InternalStatus {
    /// The exact, stable human-readable label for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "No bad image found",
            Self::Sbl => "sbl",
            Self::Mibib => "mibib",
            Self::Sedb => "sedb",
            Self::Tz1 => "tz_1",
            Self::Tz2 => "tz_2",
            Self::Rpm1 => "rpm_1",
            Self::Rpm2 => "rpm_2",
            Self::Modem1 => "modem_1",
            Self::Modem2 => "modem_2",
            Self::Lk1 => "aboot_1",
            Self::Lk2 => "aboot_2",
            Self::Kernel1 => "boot_1",
            Self::Kernel2 => "boot_2",
            Self::RootFs1 => "system_1",
            Self::RootFs2 => "system_2",
            Self::UserData1 => "lefwkro_1",
            Self::UserData2 => "lefwkro_2",
            Self::CustApp1 => "customer0",
            Self::CustApp2 => "customer1",
            Self::DwlOngoing => "Download in progress",
            Self::DwlFailed => "Download failed",
            Self::DwlTimeout => "Download timeout",
            Self::SwapMgOngoing => "Swap and mark good ongoing",
            Self::SwapOngoing => "Swap ongoing",
            Self::Unknown => "Unknown status",
        }
    }
}

/// Bit positions within `BadImageMask`. Bits 3 and 5 are reserved slots in
/// the vendor's original layout (labeled `Reserved1`/`Reserved2`) and are
/// never set by this engine.
pub mod bad_image_bit {
    pub const SBL: u64 = 0;
    pub const MIBIB: u64 = 1;
    pub const RESERVED1: u64 = 2;
    pub const SEDB: u64 = 3;
    pub const RESERVED2: u64 = 4;
    pub const TZ1: u64 = 5;
    pub const TZ2: u64 = 6;
    pub const RPM1: u64 = 7;
    pub const RPM2: u64 = 8;
    pub const MODEM1: u64 = 9;
    pub const MODEM2: u64 = 10;
    pub const LK1: u64 = 11;
    pub const LK2: u64 = 12;
    pub const KERNEL1: u64 = 13;
    pub const KERNEL2: u64 = 14;
    pub const ROOTFS1: u64 = 15;
    pub const ROOTFS2: u64 = 16;
    pub const USERDATA1: u64 = 17;
    pub const USERDATA2: u64 = 18;
    pub const CUSTAPP1: u64 = 19;
    pub const CUSTAPP2: u64 = 20;
}

/// A 64-bit bitmap over image kinds, each bit independently marking an
/// image as bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BadImageMask(pub u64);

impl BadImageMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn is_set(self, bit: u64) -> bool {
        self.0 & (1 << bit) != 0
    }

    pub fn set(self, bit: u64) -> Self {
        Self(self.0 | (1 << bit))
    }

    pub fn clear(self, bit: u64) -> Self {
        Self(self.0 & !(1 << bit))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Whether the active and passive systems are known to hold identical
/// content. Cleared on install/swap, set by `mark_good`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFlag {
    InSync,
    OutOfSync,
}
