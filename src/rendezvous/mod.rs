
use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time;

use crate::error::{Error, Result};
use crate::event::ExecutionEvent;

/// Thread-safe mailbox pairing execution frames with waiting callers,
/// keyed by transaction id.
///
/// A transaction is registered before its invocation frame is sent, so a
/// result can never arrive unannounced; a result that lands before the
/// waiter is buffered until the first reader consumes it, after which the
/// transaction is forgotten. A waiter that times out abandons its id:
/// transaction ids are never reused, so a late execution frame finds no
/// slot and is discarded.
#[derive(Default)]
pub struct RendezvousStore {
    slots: Mutex<HashMap<i64, Slot>>,
}

enum Slot {
    /// Registered, nobody waiting yet.
    Pending,
    /// A caller is parked on the receiver half.
    Waiting(oneshot::Sender<ExecutionEvent>),
    /// The result arrived before the waiter.
    Delivered(ExecutionEvent),
}

impl RendezvousStore {
    pub fn new() -> Self {
        RendezvousStore::default()
    }

    /// Announces a transaction. Must precede the send of its invocation
    /// frame.
    pub fn register(&self, transaction_id: i64) {
        self.slots.lock().insert(transaction_id, Slot::Pending);
    }

    /// Completes a transaction. Idempotent: surplus posts and posts for
    /// unknown or abandoned ids are dropped.
    pub fn post(&self, event: ExecutionEvent) {
        let transaction_id = event.transaction_id;
        let mut slots = self.slots.lock();
        match slots.remove(&transaction_id) {
            None => {
                log::trace!("dropping execution frame for unknown transaction {transaction_id}");
            }
            Some(Slot::Delivered(prior)) => {
                slots.insert(transaction_id, Slot::Delivered(prior));
                log::trace!("dropping surplus execution frame for transaction {transaction_id}");
            }
            Some(Slot::Pending) => {
                slots.insert(transaction_id, Slot::Delivered(event));
            }
            Some(Slot::Waiting(waiter)) => {
                if waiter.send(event).is_err() {
                    log::trace!("waiter for transaction {transaction_id} left before delivery");
                }
            }
        }
    }

    /// Blocks until the transaction's execution frame is posted or the
    /// deadline expires. Safe to call from any task; each transaction has
    /// exactly one waiter.
    pub async fn wait(
        &self,
        transaction_id: i64,
        timeout: Option<Duration>,
    ) -> Result<ExecutionEvent> {
        let receiver = {
            let mut slots = self.slots.lock();
            match slots.remove(&transaction_id) {
                None => return Err(Error::ErrUnknownTransaction(transaction_id)),
                Some(Slot::Delivered(event)) => return Ok(event),
                Some(Slot::Waiting(prior)) => {
                    // Exactly-one-waiter invariant: leave the prior waiter
                    // in place and refuse the second.
                    slots.insert(transaction_id, Slot::Waiting(prior));
                    return Err(Error::ErrUnknownTransaction(transaction_id));
                }
                Some(Slot::Pending) => {
                    let (sender, receiver) = oneshot::channel();
                    slots.insert(transaction_id, Slot::Waiting(sender));
                    receiver
                }
            }
        };

        let outcome = match timeout {
            Some(deadline) => match time::timeout(deadline, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    self.slots.lock().remove(&transaction_id);
                    return Err(Error::ErrResponseTimeout);
                }
            },
            None => receiver.await,
        };

        outcome.map_err(|_| Error::ErrUnknownTransaction(transaction_id))
    }

    pub fn contains_pending(&self, transaction_id: i64) -> bool {
        matches!(
            self.slots.lock().get(&transaction_id),
            Some(Slot::Pending) | Some(Slot::Waiting(_))
        )
    }

    pub fn contains_delivered(&self, transaction_id: i64) -> bool {
        matches!(
            self.slots.lock().get(&transaction_id),
            Some(Slot::Delivered(_))
        )
    }
}
