//! Read-only ledger audits.
//!
//! Nothing here writes or corrects; a failed check is reported and logged.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::AccountId;
use crate::error::LedgerError;

use super::{AccountRegistry, BalanceProjection, JournalLedger};

/// Outcome of the global debits-equal-credits check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Sum of all debit entries.
    pub total_debits: Decimal,
    /// Sum of all credit entries.
    pub total_credits: Decimal,
    /// `total_debits - total_credits`.
    pub difference: Decimal,
    /// `true` iff `difference` is zero.
    pub is_valid: bool,
}

/// Outcome of checking one account's balance against its journal history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountReconciliation {
    /// Account checked.
    pub account_id: AccountId,
    /// Balance the account was opened with.
    pub opening_balance: Decimal,
    /// Sum of credits booked to the account.
    pub total_credits: Decimal,
    /// Sum of debits booked to the account.
    pub total_debits: Decimal,
    /// `opening_balance + total_credits - total_debits`.
    pub expected_balance: Decimal,
    /// Balance currently held by the projection.
    pub actual_balance: Decimal,
    /// `true` iff expected and actual agree.
    pub is_consistent: bool,
}

/// Audits the journal against itself and against the balance projection.
#[derive(Debug, Clone)]
pub struct IntegrityVerifier {
    accounts: AccountRegistry,
    balances: BalanceProjection,
    journal: JournalLedger,
}

impl IntegrityVerifier {
    /// Creates a verifier from its collaborators.
    #[must_use]
    pub fn new(
        accounts: AccountRegistry,
        balances: BalanceProjection,
        journal: JournalLedger,
    ) -> Self {
        Self {
            accounts,
            balances,
            journal,
        }
    }

    /// Sums every journal entry by type and checks debits equal credits.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Persistence`] on backend failure.
    /// - [`LedgerError::Internal`] if the totals leave the decimal range.
    pub async fn verify_double_bookkeeping(&self) -> Result<IntegrityReport, LedgerError> {
        let totals = self.journal.totals(None).await?;
        let difference = totals.difference()?;
        let report = IntegrityReport {
            total_debits: totals.debits,
            total_credits: totals.credits,
            difference,
            is_valid: difference.is_zero(),
        };

        if report.is_valid {
            tracing::info!(
                total_debits = %report.total_debits,
                total_credits = %report.total_credits,
                "double-entry integrity check passed"
            );
        } else {
            tracing::warn!(
                total_debits = %report.total_debits,
                total_credits = %report.total_credits,
                difference = %report.difference,
                "double-entry integrity check failed"
            );
        }
        Ok(report)
    }

    /// Checks `current_balance == opening + credits - debits` for one
    /// account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] if the account does not exist.
    /// - [`LedgerError::Persistence`] on backend failure.
    pub async fn reconcile_account(
        &self,
        account_id: AccountId,
    ) -> Result<AccountReconciliation, LedgerError> {
        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let balance = self
            .balances
            .get_balance(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let totals = self.journal.totals(Some(account_id)).await?;

        let expected_balance = account
            .opening_balance
            .checked_add(totals.credits)
            .and_then(|sum| sum.checked_sub(totals.debits))
            .ok_or_else(|| {
                LedgerError::Internal(format!(
                    "expected balance of account {account_id} overflowed"
                ))
            })?;
        let reconciliation = AccountReconciliation {
            account_id,
            opening_balance: account.opening_balance,
            total_credits: totals.credits,
            total_debits: totals.debits,
            expected_balance,
            actual_balance: balance.balance,
            is_consistent: expected_balance == balance.balance,
        };

        if !reconciliation.is_consistent {
            tracing::warn!(
                account_id = %account_id,
                expected = %expected_balance,
                actual = %balance.balance,
                "account balance disagrees with journal"
            );
        }
        Ok(reconciliation)
    }
}
