//! Journal entries: the double-entry projection of transfer events.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{AccountId, TransferId};
use crate::error::LedgerError;

/// Side of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Money leaving an account.
    Debit,
    /// Money entering an account.
    Credit,
}

impl EntryType {
    /// Returns the entry type as stored in the journal.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    /// Parses a stored entry type tag.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] for an unknown tag.
    pub fn parse(tag: &str) -> Result<Self, LedgerError> {
        match tag {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            other => Err(LedgerError::Internal(format!(
                "unknown journal entry type {other:?}"
            ))),
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a transfer in the journal. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    /// Store-assigned entry ID.
    pub entry_id: i64,
    /// Transfer this entry belongs to.
    pub transfer_id: TransferId,
    /// Account the entry is booked against.
    pub account_id: AccountId,
    /// Amount, identical on both sides of a transfer.
    pub amount: Decimal,
    /// Debit or credit.
    pub entry_type: EntryType,
    /// Sequence ID of the originating transfer event.
    pub source_event_id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Sums of journal amounts split by entry type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JournalTotals {
    /// Sum of all debit amounts.
    pub debits: Decimal,
    /// Sum of all credit amounts.
    pub credits: Decimal,
}

impl JournalTotals {
    /// Adds `amount` to the bucket for `entry_type`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the sum leaves the decimal range.
    pub fn add(&mut self, entry_type: EntryType, amount: Decimal) -> Result<(), LedgerError> {
        let bucket = match entry_type {
            EntryType::Debit => &mut self.debits,
            EntryType::Credit => &mut self.credits,
        };
        *bucket = bucket.checked_add(amount).ok_or_else(|| {
            LedgerError::Internal(format!("journal {entry_type} total overflowed"))
        })?;
        Ok(())
    }

    /// Returns `debits - credits`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the difference leaves the decimal
    /// range.
    pub fn difference(&self) -> Result<Decimal, LedgerError> {
        self.debits
            .checked_sub(self.credits)
            .ok_or_else(|| LedgerError::Internal("journal difference overflowed".to_string()))
    }
}
