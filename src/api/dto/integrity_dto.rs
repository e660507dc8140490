//! Integrity check DTOs.

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::service::IntegrityReport;

/// Response body for `GET /integrity/check`.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntegrityResponse {
    /// Sum of all debit entries (decimal string).
    #[schema(value_type = String)]
    pub total_debits: Decimal,
    /// Sum of all credit entries (decimal string).
    #[schema(value_type = String)]
    pub total_credits: Decimal,
    /// `total_debits - total_credits`.
    #[schema(value_type = String)]
    pub difference: Decimal,
    /// `true` iff debits equal credits.
    pub is_valid: bool,
}

impl From<IntegrityReport> for IntegrityResponse {
    fn from(report: IntegrityReport) -> Self {
        Self {
            total_debits: report.total_debits,
            total_credits: report.total_credits,
            difference: report.difference,
            is_valid: report.is_valid,
        }
    }
}
