//! Transfer DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::account_dto::JournalEntryDto;
use crate::domain::{AccountBalance, TransferEvent};
use crate::service::{TransferDetails, TransferReceipt};

/// Request body for `POST /transactions`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransferRequest {
    /// Account to debit.
    pub source_account_id: i64,
    /// Account to credit.
    pub destination_account_id: i64,
    /// Amount to move; strictly positive, at most 8 decimals.
    #[schema(value_type = String, example = "30.00")]
    pub amount: Decimal,
}

/// A transfer event as exposed over HTTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferEventDto {
    /// Server-assigned sequence ID.
    pub event_id: i64,
    /// Transfer identifier.
    pub transfer_id: uuid::Uuid,
    /// Debited account.
    pub source_account_id: i64,
    /// Credited account.
    pub destination_account_id: i64,
    /// Amount moved (decimal string).
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Event type tag.
    pub event_type: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<TransferEvent> for TransferEventDto {
    fn from(event: TransferEvent) -> Self {
        Self {
            event_id: event.event_id,
            transfer_id: *event.transfer_id.as_uuid(),
            source_account_id: event.from_account_id.get(),
            destination_account_id: event.to_account_id.get(),
            amount: event.amount,
            event_type: event.event_type.as_str().to_string(),
            created_at: event.created_at,
        }
    }
}

/// Post-transfer balance of one side.
#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceDto {
    /// Account ID.
    pub account_id: i64,
    /// Balance after the transfer (decimal string).
    #[schema(value_type = String)]
    pub balance: Decimal,
    /// Version after the transfer.
    pub version: i64,
}

impl From<AccountBalance> for BalanceDto {
    fn from(balance: AccountBalance) -> Self {
        Self {
            account_id: balance.account_id.get(),
            balance: balance.balance,
            version: balance.version,
        }
    }
}

/// Response body for `POST /transactions` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferReceiptResponse {
    /// The committed transfer event.
    pub event: TransferEventDto,
    /// Debit and credit entries, in that order.
    pub entries: Vec<JournalEntryDto>,
    /// Source balance after the transfer.
    pub source: BalanceDto,
    /// Destination balance after the transfer.
    pub destination: BalanceDto,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

impl From<TransferReceipt> for TransferReceiptResponse {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            event: receipt.event.into(),
            entries: vec![receipt.debit.into(), receipt.credit.into()],
            source: receipt.source_balance.into(),
            destination: receipt.destination_balance.into(),
            attempts: receipt.attempts,
        }
    }
}

/// Response body for `GET /transactions/{transfer_id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferDetailsResponse {
    /// The transfer event.
    pub event: TransferEventDto,
    /// Its journal entries, debit first.
    pub entries: Vec<JournalEntryDto>,
}

impl From<TransferDetails> for TransferDetailsResponse {
    fn from(details: TransferDetails) -> Self {
        Self {
            event: details.event.into(),
            entries: details.entries.into_iter().map(Into::into).collect(),
        }
    }
}
