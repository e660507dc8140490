//! Append-only transfer event log.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{TransferEvent, TransferEventType, TransferId, TransferRequest};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, LedgerTransaction, NewTransferEvent};

/// Records one event per accepted transfer attempt.
#[derive(Debug, Clone)]
pub struct EventLog {
    store: Arc<dyn LedgerStore>,
}

impl EventLog {
    /// Creates a new `EventLog` over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Appends a `TransferProcessed` event for `request` under a freshly
    /// generated transfer ID. The store assigns the sequence ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn append(
        &self,
        tx: &mut dyn LedgerTransaction,
        request: &TransferRequest,
        now: DateTime<Utc>,
    ) -> Result<TransferEvent, LedgerError> {
        tx.append_transfer_event(NewTransferEvent {
            transfer_id: TransferId::new(),
            from_account_id: request.source,
            to_account_id: request.destination,
            amount: request.amount,
            event_type: TransferEventType::TransferProcessed,
            created_at: now,
        })
        .await
    }

    /// Looks up a committed event by transfer ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn find(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<TransferEvent>, LedgerError> {
        self.store.find_transfer_event(transfer_id).await
    }
}
