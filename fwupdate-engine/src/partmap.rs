// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Static mapping from image type to MTD partition name and active/passive
//! slot. In single-system deployments every image lands in the `swifota`
//! staging partition instead; that case is handled by the caller, not here.

use fwupdate_proto::ImageKind;

pub const SWIFOTA_PARTITION: &str = "swifota";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Active,
    Passive,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Self::Active => Self::Passive,
            Self::Passive => Self::Active,
        }
    }
}

/// Base partition names per leaf image type. Composite types never map
/// directly to a partition — only their leaf children do.
fn base_name(kind: ImageKind) -> Option<&'static str> {
    Some(match kind {
        ImageKind::Sbl1 => "sbl",
        ImageKind::Dsp2 => "modem",
        ImageKind::Apps => "aboot",
        ImageKind::Apbl => "aboot",
        ImageKind::Syst => "system",
        ImageKind::User => "lefwkro",
        ImageKind::Tzon => "tz",
        ImageKind::Qrpm => "rpm",
        ImageKind::Nvup => "customer",
        ImageKind::Appl | ImageKind::Modm | ImageKind::Spkg | ImageKind::Boot => return None,
    })
}

/// Resolve `(image_type, active/passive)` to a concrete dual-system
/// partition name, e.g. `lefwkro2` for `(USER, Passive)` when the active
/// side has no suffix.
pub fn partition_name(kind: ImageKind, slot: Slot) -> Option<String> {
    let base = base_name(kind)?;
    Some(match slot {
        Slot::Active => base.to_string(),
        Slot::Passive => format!("{base}2"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_maps_to_lefwkro() {
        assert_eq!(
            partition_name(ImageKind::User, Slot::Active).as_deref(),
            Some("lefwkro")
        );
        assert_eq!(
            partition_name(ImageKind::User, Slot::Passive).as_deref(),
            Some("lefwkro2")
        );
    }

    #[test]
    fn composite_types_have_no_partition() {
        assert!(partition_name(ImageKind::Appl, Slot::Active).is_none());
    }

    #[test]
    fn slot_other_round_trips() {
        assert_eq!(Slot::Active.other(), Slot::Passive);
        assert_eq!(Slot::Passive.other(), Slot::Active);
    }
}
