//! Account registry: creation and lookup of ledger accounts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Account, AccountBalance, AccountId, money};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, LedgerTransaction};

/// Creates accounts and answers existence checks.
///
/// Owns account identity: an ID is accepted once and never reused.
#[derive(Debug, Clone)]
pub struct AccountRegistry {
    store: Arc<dyn LedgerStore>,
}

impl AccountRegistry {
    /// Creates a new `AccountRegistry` over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Creates an account and its opening balance row inside `tx`.
    ///
    /// The balance row starts at version 1 with no applied event.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] if `initial_balance` is negative or
    ///   over-precise.
    /// - [`LedgerError::AlreadyExists`] if `id` is taken.
    /// - [`LedgerError::Persistence`] on backend failure.
    pub async fn create_account(
        &self,
        tx: &mut dyn LedgerTransaction,
        id: AccountId,
        initial_balance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(Account, AccountBalance), LedgerError> {
        money::ensure_opening_balance(initial_balance)?;

        if tx.account_exists(id).await? {
            return Err(LedgerError::AlreadyExists(id));
        }

        let account = Account::new(id, initial_balance, now);
        let balance = AccountBalance::opening(id, initial_balance, now);
        tx.insert_account(&account).await?;
        tx.insert_balance(&balance).await?;
        Ok((account, balance))
    }

    /// Loads a committed account. Carries no balance information.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.store.get_account(id).await
    }

    /// Returns `true` if `id` exists as seen from `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn exists(
        &self,
        tx: &mut dyn LedgerTransaction,
        id: AccountId,
    ) -> Result<bool, LedgerError> {
        tx.account_exists(id).await
    }
}
