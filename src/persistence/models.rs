//! Insert payloads for the append-only tables.
//!
//! The store assigns `event_id` / `entry_id` on insert and hands back the
//! full domain record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    AccountId, EntryType, JournalEntry, TransferEvent, TransferEventType, TransferId,
};

/// A transfer event not yet written to the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransferEvent {
    /// Generated transfer identifier.
    pub transfer_id: TransferId,
    /// Debited account.
    pub from_account_id: AccountId,
    /// Credited account.
    pub to_account_id: AccountId,
    /// Amount moved.
    pub amount: Decimal,
    /// Event type tag.
    pub event_type: TransferEventType,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewTransferEvent {
    /// Attaches the store-assigned sequence ID.
    #[must_use]
    pub fn into_event(self, event_id: i64) -> TransferEvent {
        TransferEvent {
            event_id,
            transfer_id: self.transfer_id,
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount: self.amount,
            event_type: self.event_type,
            created_at: self.created_at,
        }
    }
}

/// A journal entry not yet written to the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJournalEntry {
    /// Transfer this entry belongs to.
    pub transfer_id: TransferId,
    /// Account the entry is booked against.
    pub account_id: AccountId,
    /// Amount.
    pub amount: Decimal,
    /// Debit or credit.
    pub entry_type: EntryType,
    /// Sequence ID of the originating transfer event.
    pub source_event_id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewJournalEntry {
    /// Attaches the store-assigned entry ID.
    #[must_use]
    pub fn into_entry(self, entry_id: i64) -> JournalEntry {
        JournalEntry {
            entry_id,
            transfer_id: self.transfer_id,
            account_id: self.account_id,
            amount: self.amount,
            entry_type: self.entry_type,
            source_event_id: self.source_event_id,
            created_at: self.created_at,
        }
    }
}
