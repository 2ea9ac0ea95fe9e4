//! Protocol transactions
//!
//! A procedure that sends a request registers a transaction first, puts the
//! transaction id in the request, and then awaits the transaction. Whoever
//! decodes the peer's answer looks the id up and resolves it.
//!
//! ```text
//!   procedure                 manager                    inbound path
//!   ─────────                 ───────                    ────────────
//!   create() ───────────────▶ id 7 pending
//!   send request(id 7)
//!   wait(timer, cancel) ...
//!                             set_response(7, msg) ◀──── decoded response
//!   ◀──── Ok(msg)             id 7 free
//! ```
//!
//! Exactly one of response, timer expiry and cancellation resumes the
//! procedure. The others are ignored: a response arriving after the timeout
//! finds no pending id and is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::TransactionError;
use crate::task::CancelSignal;
use crate::timer::UniqueTimer;

/// Transaction identifier carried in request and response messages.
pub type TransactionId = u32;

/// Highest transaction id handed out; ids wrap around after it.
pub const MAX_TRANSACTION_ID: TransactionId = 255;

type Outcome<R> = Result<R, TransactionError>;

struct Waiter<R> {
    serial: u64,
    tx: oneshot::Sender<Outcome<R>>,
}

struct PendingTable<R> {
    next_id: TransactionId,
    next_serial: u64,
    waiting: HashMap<TransactionId, Waiter<R>>,
}

/// Allocates transaction ids and routes outcomes to the awaiting procedure.
pub struct ProtocolTransactionManager<R> {
    name: &'static str,
    table: Arc<Mutex<PendingTable<R>>>,
}

impl<R> Clone for ProtocolTransactionManager<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            table: self.table.clone(),
        }
    }
}

impl<R: Send + 'static> ProtocolTransactionManager<R> {
    /// Creates a manager; `name` identifies it in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            table: Arc::new(Mutex::new(PendingTable {
                next_id: 0,
                next_serial: 0,
                waiting: HashMap::new(),
            })),
        }
    }

    /// Registers a new pending transaction under the next free id.
    pub fn create(&self) -> Result<ProtocolTransaction<R>, TransactionError> {
        let mut table = self.table.lock();
        let nof_ids = MAX_TRANSACTION_ID as usize + 1;
        if table.waiting.len() >= nof_ids {
            return Err(TransactionError::IdsExhausted);
        }

        let mut id = table.next_id;
        while table.waiting.contains_key(&id) {
            id = if id == MAX_TRANSACTION_ID { 0 } else { id + 1 };
        }
        table.next_id = if id == MAX_TRANSACTION_ID { 0 } else { id + 1 };

        let serial = table.next_serial;
        table.next_serial += 1;

        let (tx, rx) = oneshot::channel();
        table.waiting.insert(id, Waiter { serial, tx });

        Ok(ProtocolTransaction {
            id,
            serial,
            rx,
            table: self.table.clone(),
        })
    }

    /// Resolves transaction `id` with a response.
    ///
    /// Returns false if no transaction with that id is pending, in which case
    /// the response is dropped.
    pub fn set_response(&self, id: TransactionId, response: R) -> bool {
        self.resolve(id, Ok(response))
    }

    /// Resolves transaction `id` with a negative outcome.
    pub fn set_failure(&self, id: TransactionId, reason: impl Into<String>) -> bool {
        self.resolve(id, Err(TransactionError::Negative(reason.into())))
    }

    /// Number of transactions awaiting an outcome.
    pub fn nof_pending(&self) -> usize {
        self.table.lock().waiting.len()
    }

    /// Returns true if `id` is awaiting an outcome.
    pub fn is_pending(&self, id: TransactionId) -> bool {
        self.table.lock().waiting.contains_key(&id)
    }

    /// Resolves every pending transaction with [`TransactionError::Abandoned`].
    pub fn cancel_all(&self) {
        let waiting: Vec<Waiter<R>> = self.table.lock().waiting.drain().map(|(_, w)| w).collect();
        if !waiting.is_empty() {
            debug!("{}: abandoning {} pending transactions", self.name, waiting.len());
        }
        for waiter in waiting {
            let _ = waiter.tx.send(Err(TransactionError::Abandoned));
        }
    }

    fn resolve(&self, id: TransactionId, outcome: Outcome<R>) -> bool {
        let waiter = self.table.lock().waiting.remove(&id);
        match waiter {
            Some(waiter) => waiter.tx.send(outcome).is_ok(),
            None => {
                debug!("{}: ignoring outcome for unknown transaction {}", self.name, id);
                false
            }
        }
    }
}

impl<R> std::fmt::Debug for ProtocolTransactionManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolTransactionManager")
            .field("name", &self.name)
            .field("pending", &self.table.lock().waiting.len())
            .finish()
    }
}

/// A pending transaction. Dropping it frees the id.
#[must_use = "a transaction that is never awaited only occupies an id"]
pub struct ProtocolTransaction<R> {
    id: TransactionId,
    serial: u64,
    rx: oneshot::Receiver<Outcome<R>>,
    table: Arc<Mutex<PendingTable<R>>>,
}

impl<R> ProtocolTransaction<R> {
    /// Id to put in the outgoing request.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Awaits the outcome, racing it against `timer` armed for `ticks` and
    /// against `cancel`. The timer is stopped before returning.
    pub async fn wait(
        mut self,
        timer: &mut UniqueTimer,
        ticks: u64,
        cancel: &CancelSignal,
    ) -> Result<R, TransactionError> {
        let expiry = timer.wait(ticks);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransactionError::Cancelled),
            outcome = &mut self.rx => outcome.unwrap_or(Err(TransactionError::Abandoned)),
            _ = expiry => Err(TransactionError::Timeout { ticks }),
        };
        timer.stop();
        outcome
    }

    /// Awaits the outcome without supervision.
    pub async fn response(mut self) -> Result<R, TransactionError> {
        (&mut self.rx).await.unwrap_or(Err(TransactionError::Abandoned))
    }
}

impl<R> Drop for ProtocolTransaction<R> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        // The id may already belong to a newer transaction.
        if table
            .waiting
            .get(&self.id)
            .is_some_and(|waiter| waiter.serial == self.serial)
        {
            table.waiting.remove(&self.id);
        }
    }
}

impl<R> std::fmt::Debug for ProtocolTransaction<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolTransaction").field("id", &self.id).finish()
    }
}
