//! Codec and transport boundaries
//!
//! The procedures never touch wire bytes. Outbound messages are handed to an
//! [`F1apMessageNotifier`]; the [`EncodingNotifier`] adapter encodes them with
//! an [`F1apCodec`] and passes the PDU to a [`PduNotifier`] (the transport).
//! Inbound PDUs go the other way through [`crate::f1ap::F1apRouter`].
//!
//! [`YamlCodec`] is a text encoding of the typed messages, used where no
//! ASN.1 codec is plugged in.

use std::sync::Arc;

use bytes::Bytes;
use nextgran_async::TransactionId;
use nextgran_common::{log_pdu, Direction, Protocol};
use thiserror::Error;

use super::messages::{F1apMessage, RrcMessage};

/// A PDU that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode error: {reason}")]
pub struct DecodeError {
    /// Transaction id, if it could still be recovered from the PDU
    pub transaction_id: Option<TransactionId>,
    /// What went wrong
    pub reason: String,
}

impl DecodeError {
    /// Creates a decode error with no recoverable transaction id.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            transaction_id: None,
            reason: reason.into(),
        }
    }
}

/// F1AP codec collaborator
pub trait F1apCodec: Send + Sync {
    /// Decodes one F1AP PDU.
    fn decode(&self, pdu: &[u8]) -> Result<F1apMessage, DecodeError>;
    /// Encodes one F1AP message.
    fn encode(&self, msg: &F1apMessage) -> Bytes;
}

/// RRC codec collaborator
pub trait RrcCodec: Send + Sync {
    /// Decodes one RRC PDU.
    fn decode(&self, pdu: &[u8]) -> Result<RrcMessage, DecodeError>;
    /// Encodes one RRC message.
    fn encode(&self, msg: &RrcMessage) -> Bytes;
}

/// Receiver of outbound typed F1AP messages
pub trait F1apMessageNotifier: Send + Sync {
    /// Sends `msg` to the peer.
    fn on_new_message(&self, msg: F1apMessage);
}

/// Receiver of outbound encoded PDUs (the transport)
pub trait PduNotifier: Send + Sync {
    /// Sends `pdu` to the peer.
    fn on_new_pdu(&self, pdu: Bytes);
}

/// Encodes outbound messages and forwards the PDUs to a transport.
pub struct EncodingNotifier {
    codec: Arc<dyn F1apCodec>,
    transport: Arc<dyn PduNotifier>,
}

impl EncodingNotifier {
    /// Creates a notifier encoding with `codec` and sending to `transport`.
    pub fn new(codec: Arc<dyn F1apCodec>, transport: Arc<dyn PduNotifier>) -> Self {
        Self { codec, transport }
    }
}

impl F1apMessageNotifier for EncodingNotifier {
    fn on_new_message(&self, msg: F1apMessage) {
        let pdu = self.codec.encode(&msg);
        log_pdu(Protocol::F1ap, Direction::Tx, msg.name(), &pdu);
        self.transport.on_new_pdu(pdu);
    }
}

/// Text codec for F1AP and RRC messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl YamlCodec {
    /// Best effort extraction of `transaction_id` from a PDU that failed to
    /// decode as a message.
    fn recover_transaction_id(pdu: &[u8]) -> Option<TransactionId> {
        let value: serde_yaml::Value = serde_yaml::from_slice(pdu).ok()?;
        let body = match value {
            serde_yaml::Value::Tagged(tagged) => tagged.value,
            serde_yaml::Value::Mapping(map) => map.into_iter().next()?.1,
            _ => return None,
        };
        let id = body.get("transaction_id")?.as_u64()?;
        TransactionId::try_from(id).ok()
    }
}

impl F1apCodec for YamlCodec {
    fn decode(&self, pdu: &[u8]) -> Result<F1apMessage, DecodeError> {
        serde_yaml::from_slice(pdu).map_err(|e| DecodeError {
            transaction_id: Self::recover_transaction_id(pdu),
            reason: e.to_string(),
        })
    }

    fn encode(&self, msg: &F1apMessage) -> Bytes {
        // Serializing these plain data types into a string cannot fail.
        Bytes::from(serde_yaml::to_string(msg).unwrap_or_default())
    }
}

impl RrcCodec for YamlCodec {
    fn decode(&self, pdu: &[u8]) -> Result<RrcMessage, DecodeError> {
        let msg: RrcMessage =
            serde_yaml::from_slice(pdu).map_err(|e| DecodeError::new(e.to_string()))?;
        log_pdu(Protocol::Rrc, Direction::Rx, msg.name(), pdu);
        Ok(msg)
    }

    fn encode(&self, msg: &RrcMessage) -> Bytes {
        let pdu = Bytes::from(serde_yaml::to_string(msg).unwrap_or_default());
        log_pdu(Protocol::Rrc, Direction::Tx, msg.name(), &pdu);
        pdu
    }
}
