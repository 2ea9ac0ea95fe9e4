//! Inbound F1AP routing
//!
//! Decodes PDUs arriving from the peer and hands the typed message to the
//! node's handler. A PDU that fails to decode is not dropped silently when the
//! transaction it answers can still be identified: the handler gets it as a
//! negative outcome for that transaction.

use std::sync::Arc;

use nextgran_async::TransactionId;
use nextgran_common::{log_pdu, Direction, Protocol};
use tracing::warn;

use super::codec::{DecodeError, F1apCodec};
use super::messages::F1apMessage;

/// Node-side consumer of decoded F1AP messages
pub trait F1apMessageHandler: Send + Sync {
    /// Handles a decoded message.
    fn handle_message(&self, msg: F1apMessage);

    /// Handles a PDU that failed to decode but could be attributed to
    /// `transaction_id`.
    fn handle_decode_error(&self, transaction_id: TransactionId, error: DecodeError);
}

/// Decodes inbound PDUs and dispatches them to a handler.
pub struct F1apRouter {
    codec: Arc<dyn F1apCodec>,
    handler: Arc<dyn F1apMessageHandler>,
}

impl F1apRouter {
    /// Creates a router decoding with `codec` and dispatching to `handler`.
    pub fn new(codec: Arc<dyn F1apCodec>, handler: Arc<dyn F1apMessageHandler>) -> Self {
        Self { codec, handler }
    }

    /// Handles one inbound PDU. Returns false if it was dropped.
    pub fn handle_pdu(&self, pdu: &[u8]) -> bool {
        match self.codec.decode(pdu) {
            Ok(msg) => {
                log_pdu(Protocol::F1ap, Direction::Rx, msg.name(), pdu);
                self.handler.handle_message(msg);
                true
            }
            Err(err) => match err.transaction_id {
                Some(id) => {
                    warn!("Undecodable F1AP PDU for transaction {}: {}", id, err.reason);
                    self.handler.handle_decode_error(id, err);
                    true
                }
                None => {
                    warn!("Dropping undecodable F1AP PDU ({} bytes): {}", pdu.len(), err.reason);
                    false
                }
            },
        }
    }
}
