//! OpenAPI document for the ledger API.
//!
//! - Swagger UI: `/docs` (feature `swagger-ui`)
//! - OpenAPI JSON: `/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::api::dto::{
    AccountEntriesResponse, AccountResponse, BalanceDto, CreateAccountRequest,
    CreateTransferRequest, IntegrityResponse, JournalEntryDto, PaginationMeta,
    ReconciliationResponse, TransferDetailsResponse, TransferEventDto, TransferReceiptResponse,
};
use crate::api::handlers::system::HealthResponse;
use crate::error::{ErrorBody, ErrorResponse};

/// Generated API documentation.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Ledger Gateway API",
        description = "Double-entry ledger with optimistic-concurrency transfer settlement.",
        license(name = "MIT")
    ),
    paths(
        crate::api::handlers::system::health_handler,
        crate::api::handlers::accounts::create_account,
        crate::api::handlers::accounts::get_account,
        crate::api::handlers::accounts::list_account_entries,
        crate::api::handlers::accounts::reconcile_account,
        crate::api::handlers::transfers::create_transfer,
        crate::api::handlers::transfers::get_transfer,
        crate::api::handlers::integrity::check_integrity,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            ErrorBody,
            CreateAccountRequest,
            AccountResponse,
            JournalEntryDto,
            AccountEntriesResponse,
            PaginationMeta,
            ReconciliationResponse,
            CreateTransferRequest,
            TransferEventDto,
            BalanceDto,
            TransferReceiptResponse,
            TransferDetailsResponse,
            IntegrityResponse,
        )
    ),
    tags(
        (name = "System", description = "Health"),
        (name = "Accounts", description = "Account creation, balances, and history"),
        (name = "Transfers", description = "Fund transfers between accounts"),
        (name = "Integrity", description = "Read-only ledger audits"),
    )
)]
pub struct ApiDoc;
