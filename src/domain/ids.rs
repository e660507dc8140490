//! Type-safe identifiers for accounts and transfers.
//!
//! [`AccountId`] wraps a positive `i64` supplied by the client at account
//! creation. [`TransferId`] wraps a server-generated UUID v4 so that transfer
//! identifiers cannot be confused with other UUIDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Identity of a ledger account.
///
/// Always strictly positive. The inner value is `i64` because that is the
/// widest integer the storage layer maps natively (`BIGINT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct AccountId(i64);

impl AccountId {
    /// Creates an `AccountId`, rejecting zero and negative values.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if `raw` is not strictly positive.
    pub fn new(raw: i64) -> Result<Self, LedgerError> {
        if raw <= 0 {
            return Err(LedgerError::Validation(format!(
                "account id must be a positive integer, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for AccountId {
    type Error = LedgerError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<AccountId> for i64 {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl FromStr for AccountId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s.trim().parse().map_err(|_| {
            LedgerError::Validation(format!("account id must be a positive integer, got {s:?}"))
        })?;
        Self::new(raw)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of one accepted transfer.
///
/// Wraps a UUID v4. Generated once per transfer attempt that reaches the
/// event log and shared by the event and both journal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(uuid::Uuid);

impl TransferId {
    /// Creates a new random `TransferId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `TransferId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for TransferId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<TransferId> for uuid::Uuid {
    fn from(id: TransferId) -> Self {
        id.0
    }
}
