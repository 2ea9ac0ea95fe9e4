//! Typed F1AP and RRC messages
//!
//! These are the decoded forms the procedures work with. Every F1AP message
//! carries the transaction id of the procedure it belongs to; UE-associated
//! messages also carry the UE index assigned by the CU-CP.

use bytes::Bytes;
use nextgran_async::TransactionId;
use serde::{Deserialize, Serialize};

use crate::types::{DrbId, F1apCause, SrbId, UeIndex};

/// A cell offered by the DU in F1 Setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedCell {
    /// NR Cell Identity
    pub nci: u64,
    /// Physical cell id
    pub pci: u16,
    /// Tracking area code
    pub tac: u32,
}

/// F1 Setup Request (DU -> CU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct F1SetupRequest {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// gNB-DU ID
    pub gnb_du_id: u64,
    /// gNB-DU name
    pub gnb_du_name: String,
    /// Served cells
    pub served_cells: Vec<ServedCell>,
}

/// F1 Setup Response (CU -> DU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct F1SetupResponse {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// gNB-CU name
    pub gnb_cu_name: String,
    /// NCIs of the cells to activate
    pub cells_to_activate: Vec<u64>,
}

/// F1 Setup Failure (CU -> DU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct F1SetupFailure {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// Failure cause
    pub cause: F1apCause,
    /// Ticks the DU must wait before retrying
    pub time_to_wait: Option<u64>,
}

/// UE Context Setup Request (CU -> DU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeContextSetupRequest {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// UE index at the CU-CP
    pub ue_index: UeIndex,
    /// NCI of the serving cell
    pub pcell_nci: u64,
    /// SRBs to set up
    pub srbs: Vec<SrbId>,
    /// DRBs to set up
    pub drbs: Vec<DrbId>,
    /// Encoded RRC message for the UE
    #[serde(with = "hex_bytes")]
    pub rrc_container: Bytes,
}

/// UE Context Setup Response (DU -> CU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeContextSetupResponse {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// UE index at the CU-CP
    pub ue_index: UeIndex,
    /// DRBs the DU failed to set up
    #[serde(default)]
    pub drbs_failed: Vec<DrbId>,
}

/// UE Context Setup Failure (DU -> CU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeContextSetupFailure {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// UE index at the CU-CP
    pub ue_index: UeIndex,
    /// Failure cause
    pub cause: F1apCause,
}

/// UE Context Release Command (CU -> DU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeContextReleaseCommand {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// UE index at the CU-CP
    pub ue_index: UeIndex,
    /// Release cause
    pub cause: F1apCause,
    /// Encoded RRC Release for the UE
    #[serde(with = "hex_bytes")]
    pub rrc_container: Bytes,
}

/// UE Context Release Complete (DU -> CU)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeContextReleaseComplete {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// UE index at the CU-CP
    pub ue_index: UeIndex,
}

/// F1AP message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum F1apMessage {
    /// F1 Setup Request
    F1SetupRequest(F1SetupRequest),
    /// F1 Setup Response
    F1SetupResponse(F1SetupResponse),
    /// F1 Setup Failure
    F1SetupFailure(F1SetupFailure),
    /// UE Context Setup Request
    UeContextSetupRequest(UeContextSetupRequest),
    /// UE Context Setup Response
    UeContextSetupResponse(UeContextSetupResponse),
    /// UE Context Setup Failure
    UeContextSetupFailure(UeContextSetupFailure),
    /// UE Context Release Command
    UeContextReleaseCommand(UeContextReleaseCommand),
    /// UE Context Release Complete
    UeContextReleaseComplete(UeContextReleaseComplete),
}

impl F1apMessage {
    /// Transaction id of the procedure the message belongs to
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            F1apMessage::F1SetupRequest(m) => m.transaction_id,
            F1apMessage::F1SetupResponse(m) => m.transaction_id,
            F1apMessage::F1SetupFailure(m) => m.transaction_id,
            F1apMessage::UeContextSetupRequest(m) => m.transaction_id,
            F1apMessage::UeContextSetupResponse(m) => m.transaction_id,
            F1apMessage::UeContextSetupFailure(m) => m.transaction_id,
            F1apMessage::UeContextReleaseCommand(m) => m.transaction_id,
            F1apMessage::UeContextReleaseComplete(m) => m.transaction_id,
        }
    }

    /// UE index for UE-associated messages
    pub fn ue_index(&self) -> Option<UeIndex> {
        match self {
            F1apMessage::UeContextSetupRequest(m) => Some(m.ue_index),
            F1apMessage::UeContextSetupResponse(m) => Some(m.ue_index),
            F1apMessage::UeContextSetupFailure(m) => Some(m.ue_index),
            F1apMessage::UeContextReleaseCommand(m) => Some(m.ue_index),
            F1apMessage::UeContextReleaseComplete(m) => Some(m.ue_index),
            _ => None,
        }
    }

    /// Returns true for successful and unsuccessful outcomes
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            F1apMessage::F1SetupResponse(_)
                | F1apMessage::F1SetupFailure(_)
                | F1apMessage::UeContextSetupResponse(_)
                | F1apMessage::UeContextSetupFailure(_)
                | F1apMessage::UeContextReleaseComplete(_)
        )
    }

    /// Message name for logs
    pub fn name(&self) -> &'static str {
        match self {
            F1apMessage::F1SetupRequest(_) => "F1 Setup Request",
            F1apMessage::F1SetupResponse(_) => "F1 Setup Response",
            F1apMessage::F1SetupFailure(_) => "F1 Setup Failure",
            F1apMessage::UeContextSetupRequest(_) => "UE Context Setup Request",
            F1apMessage::UeContextSetupResponse(_) => "UE Context Setup Response",
            F1apMessage::UeContextSetupFailure(_) => "UE Context Setup Failure",
            F1apMessage::UeContextReleaseCommand(_) => "UE Context Release Command",
            F1apMessage::UeContextReleaseComplete(_) => "UE Context Release Complete",
        }
    }
}

/// RRC message carried in F1AP RRC containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RrcMessage {
    /// RRC Setup establishing SRB1
    RrcSetup {
        /// RRC transaction identifier (0..=3)
        rrc_transaction_id: u8,
    },
    /// RRC Reconfiguration adding bearers
    RrcReconfiguration {
        /// RRC transaction identifier (0..=3)
        rrc_transaction_id: u8,
        /// SRBs to add
        srbs_to_add: Vec<SrbId>,
        /// DRBs to add
        drbs_to_add: Vec<DrbId>,
    },
    /// RRC Release
    RrcRelease {
        /// RRC transaction identifier (0..=3)
        rrc_transaction_id: u8,
    },
}

impl RrcMessage {
    /// Message name for logs
    pub fn name(&self) -> &'static str {
        match self {
            RrcMessage::RrcSetup { .. } => "RRC Setup",
            RrcMessage::RrcReconfiguration { .. } => "RRC Reconfiguration",
            RrcMessage::RrcRelease { .. } => "RRC Release",
        }
    }
}

/// RRC containers are carried as hex strings in text encodings.
mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
