//! Transfer processor: one transfer attempt as a single atomic unit.
//!
//! # Attempt lifecycle
//!
//! 1. validate the request, both accounts, and the source balance,
//! 2. append the transfer event,
//! 3. book the debit and credit journal entries,
//! 4. conditionally update the source balance, then the destination,
//! 5. commit.
//!
//! Any failure rolls the whole transaction back. Balances are always read
//! and written source first, destination second.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::domain::{
    AccountBalance, AccountId, JournalEntry, TransferEvent, TransferRequest, money,
};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, LedgerTransaction};

use super::{AccountRegistry, BalanceProjection, EventLog, JournalLedger};

/// Everything a committed transfer produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    /// The transfer event.
    pub event: TransferEvent,
    /// Debit entry on the source account.
    pub debit: JournalEntry,
    /// Credit entry on the destination account.
    pub credit: JournalEntry,
    /// Source balance after the transfer.
    pub source_balance: AccountBalance,
    /// Destination balance after the transfer.
    pub destination_balance: AccountBalance,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Orchestrates the registry, projection, event log, and journal for one
/// transfer attempt.
#[derive(Debug, Clone)]
pub struct TransferProcessor {
    store: Arc<dyn LedgerStore>,
    accounts: AccountRegistry,
    balances: BalanceProjection,
    events: EventLog,
    journal: JournalLedger,
}

impl TransferProcessor {
    /// Creates a processor from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: AccountRegistry,
        balances: BalanceProjection,
        events: EventLog,
        journal: JournalLedger,
    ) -> Self {
        Self {
            store,
            accounts,
            balances,
            events,
            journal,
        }
    }

    /// Runs one attempt in its own transaction: begin, [`process`], commit.
    /// Rolls back on any error.
    ///
    /// [`process`]: TransferProcessor::process
    ///
    /// # Errors
    ///
    /// Any error from [`TransferProcessor::process`], or
    /// [`LedgerError::Persistence`] if begin or commit fails.
    pub async fn execute(&self, request: &TransferRequest) -> Result<TransferReceipt, LedgerError> {
        let mut tx = self.store.begin().await?;
        match self.process(tx.as_mut(), request).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "transfer rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Performs validation and all four writes inside `tx`. Does not commit.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for a non-positive amount or
    ///   identical accounts.
    /// - [`LedgerError::AccountNotFound`] if either account is missing.
    /// - [`LedgerError::InsufficientBalance`] if the source cannot cover the
    ///   amount.
    /// - [`LedgerError::Conflict`] if either balance changed since it was
    ///   read.
    /// - [`LedgerError::Persistence`] on backend failure.
    #[tracing::instrument(
        skip(self, tx, request),
        fields(
            source = %request.source,
            destination = %request.destination,
            amount = %request.amount
        )
    )]
    pub async fn process(
        &self,
        tx: &mut dyn LedgerTransaction,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, LedgerError> {
        request.validate()?;

        for id in [request.source, request.destination] {
            if !self.accounts.exists(tx, id).await? {
                return Err(LedgerError::AccountNotFound(id));
            }
        }

        let source = self.read_balance(tx, request.source).await?;
        if source.balance < request.amount {
            return Err(LedgerError::InsufficientBalance {
                account_id: request.source,
                available: source.balance,
                requested: request.amount,
            });
        }
        let destination = self.read_balance(tx, request.destination).await?;

        let debited = source.balance.checked_sub(request.amount).ok_or_else(|| {
            LedgerError::Internal(format!("balance underflow on account {}", request.source))
        })?;
        let credited = destination
            .balance
            .checked_add(request.amount)
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "balance of account {} would overflow",
                    request.destination
                ))
            })?;
        money::ensure_resulting_balance(request.destination, credited)?;

        let now = Utc::now();
        let event = self.events.append(tx, request, now).await?;
        let (debit, credit) = self.journal.record_transfer(tx, &event).await?;

        let source_balance = source.advance(debited, event.event_id, now);
        self.balances
            .conditional_update(tx, &source_balance, source.version)
            .await?;
        let destination_balance = destination.advance(credited, event.event_id, now);
        self.balances
            .conditional_update(tx, &destination_balance, destination.version)
            .await?;

        Ok(TransferReceipt {
            event,
            debit,
            credit,
            source_balance,
            destination_balance,
            attempts: 1,
        })
    }

    async fn read_balance(
        &self,
        tx: &mut dyn LedgerTransaction,
        id: AccountId,
    ) -> Result<AccountBalance, LedgerError> {
        self.balances
            .read(tx, id)
            .await?
            .ok_or_else(|| LedgerError::Internal(format!("account {id} has no balance row")))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EntryType;
    use crate::persistence::InMemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn id(raw: i64) -> AccountId {
        let Ok(id) = AccountId::new(raw) else {
            panic!("valid id");
        };
        id
    }

    fn request(source: i64, destination: i64, amount: Decimal) -> TransferRequest {
        TransferRequest {
            source: id(source),
            destination: id(destination),
            amount,
        }
    }

    async fn setup(accounts: &[(i64, Decimal)]) -> (Arc<dyn LedgerStore>, TransferProcessor) {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryStore::new());
        let registry = AccountRegistry::new(Arc::clone(&store));
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        for (raw, balance) in accounts {
            assert!(
                registry
                    .create_account(tx.as_mut(), id(*raw), *balance, Utc::now())
                    .await
                    .is_ok()
            );
        }
        assert!(tx.commit().await.is_ok());

        let processor = TransferProcessor::new(
            Arc::clone(&store),
            registry,
            BalanceProjection::new(Arc::clone(&store)),
            EventLog::new(Arc::clone(&store)),
            JournalLedger::new(Arc::clone(&store)),
        );
        (store, processor)
    }

    async fn balance(store: &Arc<dyn LedgerStore>, raw: i64) -> AccountBalance {
        let Ok(Some(balance)) = store.get_balance(id(raw)).await else {
            panic!("balance missing");
        };
        balance
    }

    #[tokio::test]
    async fn transfer_moves_funds_and_books_both_sides() {
        let (store, processor) = setup(&[(1, dec!(100)), (2, dec!(50))]).await;

        let Ok(receipt) = processor.execute(&request(1, 2, dec!(30))).await else {
            panic!("transfer failed");
        };

        let source = balance(&store, 1).await;
        let destination = balance(&store, 2).await;
        assert_eq!((source.balance, source.version), (dec!(70), 2));
        assert_eq!((destination.balance, destination.version), (dec!(80), 2));
        assert_eq!(source.last_event_id, receipt.event.event_id);

        assert_eq!(receipt.debit.entry_type, EntryType::Debit);
        assert_eq!(receipt.debit.account_id, id(1));
        assert_eq!(receipt.credit.entry_type, EntryType::Credit);
        assert_eq!(receipt.credit.account_id, id(2));
        assert_eq!(receipt.debit.amount, receipt.credit.amount);
        assert_eq!(receipt.debit.source_event_id, receipt.event.event_id);
        assert_eq!(receipt.credit.transfer_id, receipt.event.transfer_id);

        let Ok(entries) = store
            .journal_entries_for_transfer(receipt.event.transfer_id)
            .await
        else {
            panic!("lookup failed");
        };
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_no_trace() {
        let (store, processor) = setup(&[(1, dec!(20)), (2, dec!(0))]).await;

        let result = processor.execute(&request(1, 2, dec!(50))).await;
        let Err(LedgerError::InsufficientBalance {
            available,
            requested,
            ..
        }) = result
        else {
            panic!("expected insufficient balance");
        };
        assert_eq!((available, requested), (dec!(20), dec!(50)));

        assert_eq!(balance(&store, 1).await.version, 1);
        assert_eq!(balance(&store, 2).await.version, 1);
        let Ok(totals) = store.journal_totals(None).await else {
            panic!("totals failed");
        };
        assert_eq!(totals.debits, Decimal::ZERO);
    }

    #[tokio::test]
    async fn exact_balance_can_be_spent() {
        let (store, processor) = setup(&[(1, dec!(20)), (2, dec!(0))]).await;
        assert!(processor.execute(&request(1, 2, dec!(20))).await.is_ok());
        assert_eq!(balance(&store, 1).await.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn missing_accounts_are_reported_source_first() {
        let (_store, processor) = setup(&[(1, dec!(20))]).await;
        let Err(LedgerError::AccountNotFound(missing)) =
            processor.execute(&request(9, 8, dec!(1))).await
        else {
            panic!("expected not found");
        };
        assert_eq!(missing, id(9));

        let Err(LedgerError::AccountNotFound(missing)) =
            processor.execute(&request(1, 8, dec!(1))).await
        else {
            panic!("expected not found");
        };
        assert_eq!(missing, id(8));
    }

    #[tokio::test]
    async fn validation_runs_before_existence_checks() {
        let (_store, processor) = setup(&[]).await;
        assert!(matches!(
            processor.execute(&request(1, 1, dec!(5))).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            processor.execute(&request(1, 2, dec!(0))).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn amounts_and_balances_beyond_storage_range_are_rejected() {
        let (store, processor) =
            setup(&[(1, dec!(999999999999)), (2, dec!(999999999999))]).await;

        assert!(matches!(
            processor.execute(&request(1, 2, dec!(1000000000000))).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            processor
                .execute(&request(1, 2, (Decimal::MAX / dec!(2)).trunc()))
                .await,
            Err(LedgerError::Validation(_))
        ));
        // Each side fits, the credited balance would not.
        assert!(matches!(
            processor.execute(&request(1, 2, dec!(1))).await,
            Err(LedgerError::Validation(_))
        ));

        assert_eq!(balance(&store, 1).await.version, 1);
        assert_eq!(balance(&store, 2).await.version, 1);
        let Ok(totals) = store.journal_totals(None).await else {
            panic!("totals failed");
        };
        assert_eq!(totals.debits, Decimal::ZERO);
    }

    /// Two attempts read account 1 at the same version; the second to write
    /// loses and nothing of it survives.
    #[tokio::test]
    async fn concurrent_attempts_on_same_source_conflict() {
        let (store, processor) = setup(&[(1, dec!(100)), (2, dec!(0)), (3, dec!(0))]).await;

        let (Ok(mut first), Ok(mut second)) = (store.begin().await, store.begin().await) else {
            panic!("begin failed");
        };

        let Ok(_) = processor.process(first.as_mut(), &request(1, 2, dec!(10))).await else {
            panic!("first attempt failed");
        };
        let Err(LedgerError::Conflict(conflict)) =
            processor.process(second.as_mut(), &request(1, 3, dec!(10))).await
        else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.account_id, id(1));
        assert_eq!(conflict.expected_version, 1);

        assert!(second.rollback().await.is_ok());
        assert!(first.commit().await.is_ok());

        // A fresh attempt rereads version 2 and lands on 3.
        assert!(processor.execute(&request(1, 3, dec!(10))).await.is_ok());
        let source = balance(&store, 1).await;
        assert_eq!((source.balance, source.version), (dec!(80), 3));
        assert_eq!(balance(&store, 3).await.balance, dec!(10));

        let Ok(totals) = store.journal_totals(None).await else {
            panic!("totals failed");
        };
        assert_eq!(totals.debits, dec!(20));
        assert!(matches!(totals.difference(), Ok(d) if d.is_zero()));
    }
}
