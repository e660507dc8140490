//! Transfer requests and the immutable transfer events they produce.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{AccountId, TransferId, money};
use crate::error::LedgerError;

/// Kind of transfer event recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferEventType {
    /// Funds moved from one account to another.
    TransferProcessed,
}

impl TransferEventType {
    /// Returns the event type as stored in the event log.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransferProcessed => "TransferProcessed",
        }
    }

    /// Parses a stored event type tag.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] for an unknown tag.
    pub fn parse(tag: &str) -> Result<Self, LedgerError> {
        match tag {
            "TransferProcessed" => Ok(Self::TransferProcessed),
            other => Err(LedgerError::Internal(format!(
                "unknown transfer event type {other:?}"
            ))),
        }
    }
}

impl fmt::Display for TransferEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to move `amount` from `source` to `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    /// Account to debit.
    pub source: AccountId,
    /// Account to credit.
    pub destination: AccountId,
    /// Amount to move; strictly positive.
    pub amount: Decimal,
}

impl TransferRequest {
    /// Checks the request-local rules: positive amount, distinct accounts.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if a rule is broken.
    pub fn validate(&self) -> Result<(), LedgerError> {
        money::ensure_transfer_amount(self.amount)?;
        if self.source == self.destination {
            return Err(LedgerError::Validation(
                "source and destination accounts cannot be the same".to_string(),
            ));
        }
        Ok(())
    }
}

/// Immutable, append-only record of an accepted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEvent {
    /// Store-assigned sequence ID.
    pub event_id: i64,
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

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ids() -> (AccountId, AccountId) {
        let (Ok(a), Ok(b)) = (AccountId::new(1), AccountId::new(2)) else {
            panic!("valid ids");
        };
        (a, b)
    }

    #[test]
    fn rejects_same_account() {
        let (a, _) = ids();
        let req = TransferRequest {
            source: a,
            destination: a,
            amount: dec!(10),
        };
        let Err(LedgerError::Validation(msg)) = req.validate() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("cannot be the same"));
    }

    #[test]
    fn rejects_non_positive_amount() {
        let (a, b) = ids();
        for amount in [dec!(0), dec!(-50)] {
            let req = TransferRequest {
                source: a,
                destination: b,
                amount,
            };
            assert!(matches!(req.validate(), Err(LedgerError::Validation(_))));
        }
    }

    #[test]
    fn event_type_tag_round_trips() {
        let tag = TransferEventType::TransferProcessed.as_str();
        assert!(matches!(
            TransferEventType::parse(tag),
            Ok(TransferEventType::TransferProcessed)
        ));
        assert!(TransferEventType::parse("Refund").is_err());
    }
}
