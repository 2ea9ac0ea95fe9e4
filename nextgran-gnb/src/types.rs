//! Identifiers shared by the DU and CU-CP procedures
//!
//! Entity handles (`DuHandle`, `CellHandle`, `UeHandle`) are only ever
//! produced by a registry and are generation checked. The plain indexes
//! (`DuIndex`, `CellIndex`, `UeIndex`) are what travels in messages; they may
//! be stale and must be resolved through the owning registry before use.

use std::fmt;

use nextgran_async::{EntityHandle, EntityKind};
use serde::{Deserialize, Serialize};

/// DU entity kind
#[derive(Debug)]
pub struct Du;

impl EntityKind for Du {
    const NAME: &'static str = "du";
}

/// Cell entity kind
#[derive(Debug)]
pub struct Cell;

impl EntityKind for Cell {
    const NAME: &'static str = "cell";
}

/// UE entity kind
#[derive(Debug)]
pub struct Ue;

impl EntityKind for Ue {
    const NAME: &'static str = "ue";
}

/// Handle of a DU connected to the CU-CP
pub type DuHandle = EntityHandle<Du>;
/// Handle of a served cell
pub type CellHandle = EntityHandle<Cell>;
/// Handle of a UE
pub type UeHandle = EntityHandle<Ue>;

macro_rules! wire_index {
    ($(#[$meta:meta])* $name:ident, $repr:ty, $kind:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            /// Number of distinct indexes the wire form can carry
            pub const MAX_ENTITIES: usize = <$repr>::MAX as usize + 1;

            /// Caps a registry capacity at what the wire form can address.
            pub fn clamp_capacity(capacity: usize) -> usize {
                capacity.min(Self::MAX_ENTITIES)
            }

            /// Returns the index as a registry slot number
            pub fn as_usize(&self) -> usize {
                self.0 as usize
            }
        }

        impl From<EntityHandle<$kind>> for $name {
            fn from(handle: EntityHandle<$kind>) -> Self {
                // Registries of this kind are built with `clamp_capacity`.
                debug_assert!(handle.index() < Self::MAX_ENTITIES);
                Self(handle.index() as $repr)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

wire_index!(
    /// DU index as carried in messages
    DuIndex,
    u16,
    Du
);
wire_index!(
    /// Cell index as carried in messages
    CellIndex,
    u8,
    Cell
);
wire_index!(
    /// UE index as carried in messages
    UeIndex,
    u16,
    Ue
);

/// Signalling radio bearer identity (0..=3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SrbId(pub u8);

impl SrbId {
    /// SRB0, used before the UE context exists
    pub const SRB0: SrbId = SrbId(0);
    /// SRB1
    pub const SRB1: SrbId = SrbId(1);
    /// SRB2
    pub const SRB2: SrbId = SrbId(2);

    /// Returns true for a valid SRB identity
    pub fn is_valid(&self) -> bool {
        self.0 <= 3
    }
}

impl fmt::Display for SrbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SRB{}", self.0)
    }
}

/// Data radio bearer identity (1..=32)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrbId(pub u8);

impl DrbId {
    /// Returns true for a valid DRB identity
    pub fn is_valid(&self) -> bool {
        (1..=32).contains(&self.0)
    }
}

impl fmt::Display for DrbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DRB{}", self.0)
    }
}

/// F1AP cause values used by the implemented procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum F1apCause {
    /// Radio network: cell not available
    CellNotAvailable,
    /// Radio network: unknown or inconsistent UE identity
    UnknownUeId,
    /// Radio network: normal release
    NormalRelease,
    /// Misc: not enough resources
    ResourcesUnavailable,
    /// Protocol: message not compatible with receiver state
    MessageNotCompatible,
    /// Misc: unspecified
    Unspecified,
}

impl fmt::Display for F1apCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            F1apCause::CellNotAvailable => write!(f, "radio-network/cell-not-available"),
            F1apCause::UnknownUeId => write!(f, "radio-network/unknown-ue-id"),
            F1apCause::NormalRelease => write!(f, "radio-network/normal-release"),
            F1apCause::ResourcesUnavailable => write!(f, "misc/not-enough-resources"),
            F1apCause::MessageNotCompatible => write!(f, "protocol/message-not-compatible"),
            F1apCause::Unspecified => write!(f, "misc/unspecified"),
        }
    }
}
