//! Account DTOs: creation, lookup, journal history, and reconciliation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::PaginationMeta;
use crate::domain::JournalEntry;
use crate::service::{AccountReconciliation, AccountState};

/// Request body for `POST /accounts`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    /// Client-chosen account ID; must be a positive integer.
    pub account_id: i64,
    /// Opening balance (decimal string or number, at most 8 decimals).
    #[schema(value_type = String, example = "100.00")]
    pub initial_balance: Decimal,
}

/// Account details with its current balance snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountResponse {
    /// Account ID.
    pub account_id: i64,
    /// Current balance (decimal string).
    #[schema(value_type = String, example = "70.00")]
    pub balance: Decimal,
    /// Balance the account was opened with.
    #[schema(value_type = String)]
    pub opening_balance: Decimal,
    /// Optimistic concurrency version; 1 for a fresh account.
    pub version: i64,
    /// Sequence ID of the last transfer event applied (0 if none).
    pub last_event_id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last balance update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<AccountState> for AccountResponse {
    fn from(state: AccountState) -> Self {
        Self {
            account_id: state.account.id.get(),
            balance: state.balance.balance,
            opening_balance: state.account.opening_balance,
            version: state.balance.version,
            last_event_id: state.balance.last_event_id,
            created_at: state.account.created_at,
            updated_at: state.balance.updated_at,
        }
    }
}

/// One journal entry as exposed over HTTP.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JournalEntryDto {
    /// Entry ID.
    pub entry_id: i64,
    /// Transfer the entry belongs to.
    pub transfer_id: uuid::Uuid,
    /// Account the entry is booked against.
    pub account_id: i64,
    /// Amount (decimal string).
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// `debit` or `credit`.
    pub entry_type: String,
    /// Sequence ID of the originating transfer event.
    pub source_event_id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<JournalEntry> for JournalEntryDto {
    fn from(entry: JournalEntry) -> Self {
        Self {
            entry_id: entry.entry_id,
            transfer_id: *entry.transfer_id.as_uuid(),
            account_id: entry.account_id.get(),
            amount: entry.amount,
            entry_type: entry.entry_type.as_str().to_string(),
            source_event_id: entry.source_event_id,
            created_at: entry.created_at,
        }
    }
}

/// Response body for `GET /accounts/{account_id}/entries`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountEntriesResponse {
    /// Entries on this page, newest first.
    pub data: Vec<JournalEntryDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Response body for `GET /accounts/{account_id}/reconciliation`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconciliationResponse {
    /// Account checked.
    pub account_id: i64,
    /// Opening balance.
    #[schema(value_type = String)]
    pub opening_balance: Decimal,
    /// Sum of credits booked to the account.
    #[schema(value_type = String)]
    pub total_credits: Decimal,
    /// Sum of debits booked to the account.
    #[schema(value_type = String)]
    pub total_debits: Decimal,
    /// `opening_balance + total_credits - total_debits`.
    #[schema(value_type = String)]
    pub expected_balance: Decimal,
    /// Balance currently held.
    #[schema(value_type = String)]
    pub actual_balance: Decimal,
    /// Whether expected and actual agree.
    pub is_consistent: bool,
}

impl From<AccountReconciliation> for ReconciliationResponse {
    fn from(r: AccountReconciliation) -> Self {
        Self {
            account_id: r.account_id.get(),
            opening_balance: r.opening_balance,
            total_credits: r.total_credits,
            total_debits: r.total_debits,
            expected_balance: r.expected_balance,
            actual_balance: r.actual_balance,
            is_consistent: r.is_consistent,
        }
    }
}
