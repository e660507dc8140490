//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::service::LedgerService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Ledger service for all business logic.
    pub ledger_service: Arc<LedgerService>,
    /// Deadline applied to each transfer, retries included.
    pub request_timeout: Duration,
}
