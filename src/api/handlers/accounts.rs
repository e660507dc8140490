//! Account handlers: create, get, journal history, reconciliation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    AccountEntriesResponse, AccountResponse, CreateAccountRequest, JournalEntryDto,
    PaginationParams, ReconciliationResponse,
};
use crate::app_state::AppState;
use crate::domain::AccountId;
use crate::error::{ErrorResponse, LedgerError};

/// `POST /accounts` — Create an account with an opening balance.
///
/// # Errors
///
/// Returns [`LedgerError`] on an invalid body, a negative balance, or a
/// duplicate account ID.
#[utoipa::path(
    post,
    path = "/api/v1/accounts",
    tag = "Accounts",
    summary = "Create an account",
    description = "Creates an account with a client-chosen positive ID and a non-negative opening balance. The balance snapshot starts at version 1.",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Account already exists", body = ErrorResponse),
    )
)]
pub async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, LedgerError> {
    let Json(req) = payload.map_err(|e| LedgerError::Validation(e.body_text()))?;
    let id = AccountId::new(req.account_id)?;

    let created = state
        .ledger_service
        .create_account(id, req.initial_balance)
        .await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(created))))
}

/// `GET /accounts/{account_id}` — Account details and current balance.
///
/// # Errors
///
/// Returns [`LedgerError::AccountNotFound`] if the account does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}",
    tag = "Accounts",
    summary = "Get an account",
    description = "Returns the account and its current balance snapshot, including the optimistic concurrency version.",
    params(
        ("account_id" = i64, Path, description = "Account ID"),
    ),
    responses(
        (status = 200, description = "Account details", body = AccountResponse),
        (status = 400, description = "Malformed account ID", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let id: AccountId = account_id.parse()?;
    let account = state.ledger_service.get_account(id).await?;
    Ok(Json(AccountResponse::from(account)))
}

/// `GET /accounts/{account_id}/entries` — Paginated journal history.
///
/// # Errors
///
/// Returns [`LedgerError::AccountNotFound`] if the account does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}/entries",
    tag = "Accounts",
    summary = "List an account's journal entries",
    description = "Returns the debit and credit entries booked against the account, newest first.",
    params(
        ("account_id" = i64, Path, description = "Account ID"),
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Journal page", body = AccountEntriesResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn list_account_entries(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let id: AccountId = account_id.parse()?;
    let params = params.clamped();

    let (entries, total) = state
        .ledger_service
        .account_entries(id, params.per_page, params.offset())
        .await?;

    Ok(Json(AccountEntriesResponse {
        data: entries.into_iter().map(JournalEntryDto::from).collect(),
        pagination: params.meta(total),
    }))
}

/// `GET /accounts/{account_id}/reconciliation` — Balance vs. journal check.
///
/// # Errors
///
/// Returns [`LedgerError::AccountNotFound`] if the account does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}/reconciliation",
    tag = "Accounts",
    summary = "Reconcile an account",
    description = "Checks that the current balance equals the opening balance plus credits minus debits recorded in the journal. Read-only; never corrects.",
    params(
        ("account_id" = i64, Path, description = "Account ID"),
    ),
    responses(
        (status = 200, description = "Reconciliation result", body = ReconciliationResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn reconcile_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let id: AccountId = account_id.parse()?;
    let reconciliation = state.ledger_service.reconcile_account(id).await?;
    Ok(Json(ReconciliationResponse::from(reconciliation)))
}

/// Account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/{account_id}", get(get_account))
        .route("/accounts/{account_id}/entries", get(list_account_entries))
        .route(
            "/accounts/{account_id}/reconciliation",
            get(reconcile_account),
        )
}
