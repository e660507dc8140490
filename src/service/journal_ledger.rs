//! Double-entry journal: the paired debit/credit entries of each transfer.

use std::sync::Arc;

use crate::domain::{AccountId, EntryType, JournalEntry, JournalTotals, TransferEvent, TransferId};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, LedgerTransaction, NewJournalEntry};

/// Writes and reads journal entries.
#[derive(Debug, Clone)]
pub struct JournalLedger {
    store: Arc<dyn LedgerStore>,
}

impl JournalLedger {
    /// Creates a new `JournalLedger` over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Books `event` as a debit on its source and a credit on its
    /// destination, in that order. Returns `(debit, credit)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn record_transfer(
        &self,
        tx: &mut dyn LedgerTransaction,
        event: &TransferEvent,
    ) -> Result<(JournalEntry, JournalEntry), LedgerError> {
        let debit = tx
            .append_journal_entry(entry_for(event, event.from_account_id, EntryType::Debit))
            .await?;
        let credit = tx
            .append_journal_entry(entry_for(event, event.to_account_id, EntryType::Credit))
            .await?;
        Ok((debit, credit))
    }

    /// Lists the committed entries of one transfer, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn entries_for_transfer(
        &self,
        transfer_id: TransferId,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        self.store.journal_entries_for_transfer(transfer_id).await
    }

    /// Returns one page of an account's entries, newest first, together
    /// with the account's total entry count.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn entries_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<JournalEntry>, u64), LedgerError> {
        let entries = self
            .store
            .journal_entries_for_account(account_id, limit, offset)
            .await?;
        let total = self
            .store
            .count_journal_entries_for_account(account_id)
            .await?;
        Ok((entries, total))
    }

    /// Sums committed entries by type, ledger-wide or for one account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn totals(
        &self,
        account_id: Option<AccountId>,
    ) -> Result<JournalTotals, LedgerError> {
        self.store.journal_totals(account_id).await
    }
}

fn entry_for(
    event: &TransferEvent,
    account_id: AccountId,
    entry_type: EntryType,
) -> NewJournalEntry {
    NewJournalEntry {
        transfer_id: event.transfer_id,
        account_id,
        amount: event.amount,
        entry_type,
        source_event_id: event.event_id,
        created_at: event.created_at,
    }
}
