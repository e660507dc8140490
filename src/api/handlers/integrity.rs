//! Integrity check handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::IntegrityResponse;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, LedgerError};

/// `GET /integrity/check` — Verify that journal debits equal credits.
///
/// A failed check is still a `200`; `is_valid` carries the verdict.
///
/// # Errors
///
/// Returns [`LedgerError::Persistence`] if the journal cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/integrity/check",
    tag = "Integrity",
    summary = "Check double-entry integrity",
    description = "Sums all journal entries by type and reports whether total debits equal total credits. Read-only.",
    responses(
        (status = 200, description = "Integrity report", body = IntegrityResponse),
        (status = 500, description = "Journal unavailable", body = ErrorResponse),
    )
)]
pub async fn check_integrity(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, LedgerError> {
    let report = state.ledger_service.verify_integrity().await?;
    Ok(Json(IntegrityResponse::from(report)))
}

/// Integrity routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/integrity/check", get(check_integrity))
}
