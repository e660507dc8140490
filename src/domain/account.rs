//! Accounts and their versioned balance snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::AccountId;

/// A ledger account.
///
/// Immutable after creation apart from `updated_at`. The opening balance is
/// kept so the account can be reconciled against its journal history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Client-assigned identity.
    pub id: AccountId,
    /// Balance the account was created with.
    pub opening_balance: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account stamped with `now`.
    #[must_use]
    pub fn new(id: AccountId, opening_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id,
            opening_balance,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Current balance of one account, guarded by a version counter.
///
/// The version starts at 1 and increases by exactly one per accepted
/// mutation. A new snapshot is only ever produced through
/// [`AccountBalance::advance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    /// Account this balance belongs to.
    pub account_id: AccountId,
    /// Current balance.
    pub balance: Decimal,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Sequence ID of the last transfer event applied (0 if none).
    pub last_event_id: i64,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// Version assigned to a freshly created balance row.
    pub const INITIAL_VERSION: i64 = 1;

    /// Builds the initial snapshot for a newly created account.
    #[must_use]
    pub fn opening(account_id: AccountId, balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            balance,
            version: Self::INITIAL_VERSION,
            last_event_id: 0,
            updated_at: now,
        }
    }

    /// Returns the successor snapshot carrying `balance` and the next version.
    #[must_use]
    pub fn advance(&self, balance: Decimal, event_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            account_id: self.account_id,
            balance,
            version: self.version + 1,
            last_event_id: event_id,
            updated_at: now,
        }
    }
}
