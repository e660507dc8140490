//! Money rules shared by account creation and transfers.
//!
//! Amounts and balances are [`Decimal`]s with at most [`MONEY_SCALE`]
//! fractional digits and fewer than [`MONEY_INTEGER_DIGITS`] integer digits,
//! matching the `NUMERIC(20,8)` storage columns.

use rust_decimal::Decimal;

use super::AccountId;
use crate::error::LedgerError;

/// Maximum number of fractional digits accepted for any amount or balance.
pub const MONEY_SCALE: u32 = 8;

/// Integer digits available in the storage columns.
pub const MONEY_INTEGER_DIGITS: u32 = 12;

/// Exclusive upper bound on the magnitude of any amount or balance,
/// `10^MONEY_INTEGER_DIGITS`.
#[must_use]
pub fn money_limit() -> Decimal {
    Decimal::from(10_i64.pow(MONEY_INTEGER_DIGITS))
}

/// Checks that `amount` is strictly positive and representable.
///
/// # Errors
///
/// Returns [`LedgerError::Validation`] for zero, negative, oversized or
/// over-precise amounts.
pub fn ensure_transfer_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(
            "transfer amount must be positive".to_string(),
        ));
    }
    ensure_magnitude(amount, "transfer amount")?;
    ensure_scale(amount, "transfer amount")
}

/// Checks that an opening balance is non-negative and representable.
///
/// # Errors
///
/// Returns [`LedgerError::Validation`] for negative, oversized or
/// over-precise balances.
pub fn ensure_opening_balance(balance: Decimal) -> Result<(), LedgerError> {
    if balance.is_sign_negative() && !balance.is_zero() {
        return Err(LedgerError::Validation(
            "initial balance cannot be negative".to_string(),
        ));
    }
    ensure_magnitude(balance, "initial balance")?;
    ensure_scale(balance, "initial balance")
}

/// Checks that a balance produced by a transfer still fits the storage
/// columns.
///
/// # Errors
///
/// Returns [`LedgerError::Validation`] if `balance` reaches [`money_limit`].
pub fn ensure_resulting_balance(
    account_id: AccountId,
    balance: Decimal,
) -> Result<(), LedgerError> {
    ensure_magnitude(balance, &format!("balance of account {account_id}"))
}

fn ensure_magnitude(value: Decimal, what: &str) -> Result<(), LedgerError> {
    let limit = money_limit();
    if value.abs() >= limit {
        return Err(LedgerError::Validation(format!(
            "{what} must be below {limit}, got {value}"
        )));
    }
    Ok(())
}

fn ensure_scale(value: Decimal, what: &str) -> Result<(), LedgerError> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::Validation(format!(
            "{what} supports at most {MONEY_SCALE} decimal places, got {value}"
        )));
    }
    Ok(())
}
