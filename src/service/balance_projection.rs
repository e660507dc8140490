//! Balance projection: versioned balance snapshots and the conditional write
//! that guards them.

use std::sync::Arc;

use crate::domain::{AccountBalance, AccountId};
use crate::error::{LedgerError, VersionConflict};
use crate::persistence::{LedgerStore, LedgerTransaction};

/// Reads and conditionally rewrites account balances.
///
/// [`BalanceProjection::conditional_update`] is the only way a balance
/// changes after account creation.
#[derive(Debug, Clone)]
pub struct BalanceProjection {
    store: Arc<dyn LedgerStore>,
}

impl BalanceProjection {
    /// Creates a new `BalanceProjection` over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Returns the committed balance snapshot of `account_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn get_balance(
        &self,
        account_id: AccountId,
    ) -> Result<Option<AccountBalance>, LedgerError> {
        self.store.get_balance(account_id).await
    }

    /// Returns the balance snapshot of `account_id` as seen from `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn read(
        &self,
        tx: &mut dyn LedgerTransaction,
        account_id: AccountId,
    ) -> Result<Option<AccountBalance>, LedgerError> {
        tx.get_balance(account_id).await
    }

    /// Writes `next` only if the stored version still equals
    /// `expected_version`.
    ///
    /// `next.version` must be `expected_version + 1`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Conflict`] if no row matched the version.
    /// - [`LedgerError::Internal`] if `next` does not advance the version by
    ///   exactly one.
    /// - [`LedgerError::Persistence`] on backend failure.
    pub async fn conditional_update(
        &self,
        tx: &mut dyn LedgerTransaction,
        next: &AccountBalance,
        expected_version: i64,
    ) -> Result<(), LedgerError> {
        if next.version != expected_version + 1 {
            return Err(LedgerError::Internal(format!(
                "balance of account {} must advance from version {expected_version} to {}, got {}",
                next.account_id,
                expected_version + 1,
                next.version
            )));
        }

        let rows = tx.update_balance_if_version(next, expected_version).await?;
        if rows == 0 {
            tracing::debug!(
                account_id = %next.account_id,
                version = expected_version,
                "optimistic lock violation"
            );
            return Err(VersionConflict {
                account_id: next.account_id,
                expected_version,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Account;
    use crate::persistence::InMemoryStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn seeded() -> (Arc<dyn LedgerStore>, AccountBalance) {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryStore::new());
        let Ok(id) = AccountId::new(1) else {
            panic!("valid id");
        };
        let now = Utc::now();
        let opening = AccountBalance::opening(id, dec!(100), now);
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        assert!(tx.insert_account(&Account::new(id, dec!(100), now)).await.is_ok());
        assert!(tx.insert_balance(&opening).await.is_ok());
        assert!(tx.commit().await.is_ok());
        (store, opening)
    }

    #[tokio::test]
    async fn update_advances_version() {
        let (store, opening) = seeded().await;
        let projection = BalanceProjection::new(Arc::clone(&store));
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let next = opening.advance(dec!(60), 1, Utc::now());
        assert!(projection.conditional_update(tx.as_mut(), &next, 1).await.is_ok());
        assert!(tx.commit().await.is_ok());

        let Ok(Some(stored)) = projection.get_balance(opening.account_id).await else {
            panic!("balance missing");
        };
        assert_eq!(stored.version, 2);
        assert_eq!(stored.balance, dec!(60));
        assert_eq!(stored.last_event_id, 1);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let (store, opening) = seeded().await;
        let projection = BalanceProjection::new(Arc::clone(&store));

        let Ok(mut first) = store.begin().await else {
            panic!("begin failed");
        };
        let next = opening.advance(dec!(90), 1, Utc::now());
        assert!(projection.conditional_update(first.as_mut(), &next, 1).await.is_ok());
        assert!(first.commit().await.is_ok());

        let Ok(mut second) = store.begin().await else {
            panic!("begin failed");
        };
        let stale = opening.advance(dec!(80), 2, Utc::now());
        let Err(LedgerError::Conflict(conflict)) =
            projection.conditional_update(second.as_mut(), &stale, 1).await
        else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.expected_version, 1);
        assert_eq!(conflict.account_id, opening.account_id);
    }

    #[tokio::test]
    async fn skipping_a_version_is_rejected() {
        let (store, opening) = seeded().await;
        let projection = BalanceProjection::new(Arc::clone(&store));
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let mut next = opening.advance(dec!(1), 1, Utc::now());
        next.version += 1;
        assert!(matches!(
            projection.conditional_update(tx.as_mut(), &next, 1).await,
            Err(LedgerError::Internal(_))
        ));
    }
}
