//! Transfer handlers: execute and look up.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{CreateTransferRequest, TransferDetailsResponse, TransferReceiptResponse};
use crate::app_state::AppState;
use crate::domain::{AccountId, TransferId, TransferRequest};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::Cancellation;

/// `POST /transactions` — Move funds between two accounts.
///
/// The transfer is retried on optimistic lock conflicts within the request
/// deadline.
///
/// # Errors
///
/// Returns [`LedgerError`] on validation failure, a missing account,
/// insufficient funds, exhausted retries, or a passed deadline.
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    tag = "Transfers",
    summary = "Execute a transfer",
    description = "Atomically debits the source and credits the destination, recording one transfer event and a debit/credit journal pair. Concurrent modifications are retried up to the configured bound with exponential backoff.",
    request_body = CreateTransferRequest,
    responses(
        (status = 201, description = "Transfer settled", body = TransferReceiptResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 409, description = "Retries exhausted under contention", body = ErrorResponse),
        (status = 422, description = "Insufficient balance", body = ErrorResponse),
        (status = 504, description = "Request deadline exceeded", body = ErrorResponse),
    )
)]
pub async fn create_transfer(
    State(state): State<AppState>,
    payload: Result<Json<CreateTransferRequest>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Json(req) = payload.map_err(|e| LedgerError::Validation(e.body_text()))?;
    let request = TransferRequest {
        source: AccountId::new(req.source_account_id)?,
        destination: AccountId::new(req.destination_account_id)?,
        amount: req.amount,
    };

    let cancel = Cancellation::with_timeout(state.request_timeout);
    let receipt = state
        .ledger_service
        .process_transfer(request, &cancel)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransferReceiptResponse::from(receipt)),
    ))
}

/// `GET /transactions/{transfer_id}` — Transfer event and journal entries.
///
/// # Errors
///
/// Returns [`LedgerError::TransferNotFound`] if no such transfer exists.
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{transfer_id}",
    tag = "Transfers",
    summary = "Get a transfer",
    description = "Returns the transfer event together with its debit and credit journal entries.",
    params(
        ("transfer_id" = uuid::Uuid, Path, description = "Transfer UUID"),
    ),
    responses(
        (status = 200, description = "Transfer details", body = TransferDetailsResponse),
        (status = 404, description = "Transfer not found", body = ErrorResponse),
    )
)]
pub async fn get_transfer(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let details = state
        .ledger_service
        .get_transfer(TransferId::from_uuid(id))
        .await?;
    Ok(Json(TransferDetailsResponse::from(details)))
}

/// Transfer routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transactions", post(create_transfer))
        .route("/transactions/{transfer_id}", get(get_transfer))
}
