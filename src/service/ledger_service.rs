//! Ledger service: the entry point used by the HTTP layer.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{
    Account, AccountBalance, AccountId, JournalEntry, TransferEvent, TransferId, TransferRequest,
};
use crate::error::LedgerError;
use crate::persistence::LedgerStore;

use super::{
    AccountReconciliation, AccountRegistry, BalanceProjection, Cancellation, EventLog,
    IntegrityReport, IntegrityVerifier, JournalLedger, RetryCoordinator, RetryPolicy,
    TransferProcessor, TransferReceipt,
};

/// An account together with its current balance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountState {
    /// The account.
    pub account: Account,
    /// Its balance snapshot.
    pub balance: AccountBalance,
}

/// A committed transfer and its journal entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferDetails {
    /// The transfer event.
    pub event: TransferEvent,
    /// Its entries, debit first.
    pub entries: Vec<JournalEntry>,
}

/// Wires the ledger components over one store.
///
/// Every component receives the store at construction; nothing is global.
#[derive(Debug, Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    accounts: AccountRegistry,
    balances: BalanceProjection,
    events: EventLog,
    journal: JournalLedger,
    processor: TransferProcessor,
    retry: RetryCoordinator,
    verifier: IntegrityVerifier,
}

impl LedgerService {
    /// Creates a service over `store` retrying transfers under `policy`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        let accounts = AccountRegistry::new(Arc::clone(&store));
        let balances = BalanceProjection::new(Arc::clone(&store));
        let events = EventLog::new(Arc::clone(&store));
        let journal = JournalLedger::new(Arc::clone(&store));
        let processor = TransferProcessor::new(
            Arc::clone(&store),
            accounts.clone(),
            balances.clone(),
            events.clone(),
            journal.clone(),
        );
        let verifier = IntegrityVerifier::new(accounts.clone(), balances.clone(), journal.clone());
        Self {
            store,
            accounts,
            balances,
            events,
            journal,
            processor,
            retry: RetryCoordinator::new(policy),
            verifier,
        }
    }

    /// Creates an account with `initial_balance` in its own transaction.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for a negative or over-precise balance.
    /// - [`LedgerError::AlreadyExists`] if `id` is taken.
    /// - [`LedgerError::Persistence`] on backend failure.
    #[tracing::instrument(skip(self), fields(account_id = %id))]
    pub async fn create_account(
        &self,
        id: AccountId,
        initial_balance: Decimal,
    ) -> Result<AccountState, LedgerError> {
        let mut tx = self.store.begin().await?;
        match self
            .accounts
            .create_account(tx.as_mut(), id, initial_balance, Utc::now())
            .await
        {
            Ok((account, balance)) => {
                tx.commit().await?;
                tracing::info!(initial_balance = %initial_balance, "account created");
                Ok(AccountState { account, balance })
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "account creation rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Returns an account and its current balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] if the account does not exist.
    /// - [`LedgerError::Persistence`] on backend failure.
    pub async fn get_account(&self, id: AccountId) -> Result<AccountState, LedgerError> {
        let account = self
            .accounts
            .get_account(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))?;
        let balance = self
            .balances
            .get_balance(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))?;
        Ok(AccountState { account, balance })
    }

    /// Moves funds between two accounts, retrying whole attempts on
    /// optimistic lock conflicts.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`], [`LedgerError::AccountNotFound`],
    ///   [`LedgerError::InsufficientBalance`] from the first failing attempt.
    /// - [`LedgerError::ExhaustedRetries`] once the retry bound is reached.
    /// - [`LedgerError::Cancelled`] / [`LedgerError::DeadlineExceeded`] if
    ///   `cancel` fires.
    /// - [`LedgerError::Persistence`] on backend failure.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(source = %request.source, destination = %request.destination)
    )]
    pub async fn process_transfer(
        &self,
        request: TransferRequest,
        cancel: &Cancellation,
    ) -> Result<TransferReceipt, LedgerError> {
        let processor = &self.processor;
        let pending = &request;
        let (mut receipt, attempts) = self
            .retry
            .run(cancel, move |_| processor.execute(pending))
            .await?;
        receipt.attempts = attempts;

        tracing::info!(
            transfer_id = %receipt.event.transfer_id,
            amount = %request.amount,
            attempts,
            "transfer settled"
        );
        Ok(receipt)
    }

    /// Looks up a committed transfer and its journal entries.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TransferNotFound`] if no such transfer exists.
    /// - [`LedgerError::Persistence`] on backend failure.
    pub async fn get_transfer(
        &self,
        transfer_id: TransferId,
    ) -> Result<TransferDetails, LedgerError> {
        let event = self
            .events
            .find(transfer_id)
            .await?
            .ok_or(LedgerError::TransferNotFound(transfer_id))?;
        let entries = self.journal.entries_for_transfer(transfer_id).await?;
        Ok(TransferDetails { event, entries })
    }

    /// Returns one page of an account's journal entries, newest first, and
    /// the account's total entry count.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] if the account does not exist.
    /// - [`LedgerError::Persistence`] on backend failure.
    pub async fn account_entries(
        &self,
        id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<JournalEntry>, u64), LedgerError> {
        if self.accounts.get_account(id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(id));
        }
        self.journal.entries_for_account(id, limit, offset).await
    }

    /// Runs the global double-entry check.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        self.verifier.verify_double_bookkeeping().await
    }

    /// Reconciles one account's balance against its journal history.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] if the account does not exist.
    /// - [`LedgerError::Persistence`] on backend failure.
    pub async fn reconcile_account(
        &self,
        id: AccountId,
    ) -> Result<AccountReconciliation, LedgerError> {
        self.verifier.reconcile_account(id).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::JournalTotals;
    use crate::persistence::{InMemoryStore, LedgerTransaction, NewJournalEntry, NewTransferEvent};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    /// In-memory store whose transactions yield to the scheduler before
    /// every call, so transfers joined on one task advance step by step.
    #[derive(Debug, Default)]
    struct SteppingStore {
        inner: InMemoryStore,
    }

    struct SteppingTransaction {
        inner: Box<dyn LedgerTransaction>,
    }

    #[async_trait]
    impl LedgerStore for SteppingStore {
        async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
            let inner = self.inner.begin().await?;
            Ok(Box::new(SteppingTransaction { inner }))
        }

        async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
            self.inner.get_account(id).await
        }

        async fn get_balance(&self, id: AccountId) -> Result<Option<AccountBalance>, LedgerError> {
            self.inner.get_balance(id).await
        }

        async fn find_transfer_event(
            &self,
            transfer_id: TransferId,
        ) -> Result<Option<TransferEvent>, LedgerError> {
            self.inner.find_transfer_event(transfer_id).await
        }

        async fn journal_entries_for_transfer(
            &self,
            transfer_id: TransferId,
        ) -> Result<Vec<JournalEntry>, LedgerError> {
            self.inner.journal_entries_for_transfer(transfer_id).await
        }

        async fn journal_entries_for_account(
            &self,
            account_id: AccountId,
            limit: u32,
            offset: u32,
        ) -> Result<Vec<JournalEntry>, LedgerError> {
            self.inner
                .journal_entries_for_account(account_id, limit, offset)
                .await
        }

        async fn count_journal_entries_for_account(
            &self,
            account_id: AccountId,
        ) -> Result<u64, LedgerError> {
            self.inner.count_journal_entries_for_account(account_id).await
        }

        async fn journal_totals(
            &self,
            account_id: Option<AccountId>,
        ) -> Result<JournalTotals, LedgerError> {
            self.inner.journal_totals(account_id).await
        }
    }

    #[async_trait]
    impl LedgerTransaction for SteppingTransaction {
        async fn account_exists(&mut self, id: AccountId) -> Result<bool, LedgerError> {
            tokio::task::yield_now().await;
            self.inner.account_exists(id).await
        }

        async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
            tokio::task::yield_now().await;
            self.inner.insert_account(account).await
        }

        async fn get_balance(
            &mut self,
            id: AccountId,
        ) -> Result<Option<AccountBalance>, LedgerError> {
            tokio::task::yield_now().await;
            self.inner.get_balance(id).await
        }

        async fn insert_balance(&mut self, balance: &AccountBalance) -> Result<(), LedgerError> {
            tokio::task::yield_now().await;
            self.inner.insert_balance(balance).await
        }

        async fn update_balance_if_version(
            &mut self,
            balance: &AccountBalance,
            expected_version: i64,
        ) -> Result<u64, LedgerError> {
            tokio::task::yield_now().await;
            self.inner
                .update_balance_if_version(balance, expected_version)
                .await
        }

        async fn append_transfer_event(
            &mut self,
            event: NewTransferEvent,
        ) -> Result<TransferEvent, LedgerError> {
            tokio::task::yield_now().await;
            self.inner.append_transfer_event(event).await
        }

        async fn append_journal_entry(
            &mut self,
            entry: NewJournalEntry,
        ) -> Result<JournalEntry, LedgerError> {
            tokio::task::yield_now().await;
            self.inner.append_journal_entry(entry).await
        }

        async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
            tokio::task::yield_now().await;
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
            tokio::task::yield_now().await;
            self.inner.rollback().await
        }
    }

    fn id(raw: i64) -> AccountId {
        let Ok(id) = AccountId::new(raw) else {
            panic!("valid id");
        };
        id
    }

    fn service() -> LedgerService {
        LedgerService::new(Arc::new(InMemoryStore::new()), RetryPolicy::default())
    }

    fn transfer(source: i64, destination: i64, amount: Decimal) -> TransferRequest {
        TransferRequest {
            source: id(source),
            destination: id(destination),
            amount,
        }
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let service = service();
        let Ok(created) = service.create_account(id(1), dec!(100)).await else {
            panic!("create failed");
        };
        assert_eq!(created.balance.version, 1);

        let Ok(state) = service.get_account(id(1)).await else {
            panic!("get failed");
        };
        assert_eq!(state.balance.balance, dec!(100));
        assert_eq!(state.balance.last_event_id, 0);

        assert!(matches!(
            service.create_account(id(1), dec!(100)).await,
            Err(LedgerError::AlreadyExists(_))
        ));
        assert!(matches!(
            service.get_account(id(2)).await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn transfer_lookup_and_history() {
        let service = service();
        assert!(service.create_account(id(1), dec!(100)).await.is_ok());
        assert!(service.create_account(id(2), dec!(50)).await.is_ok());

        let Ok(receipt) = service
            .process_transfer(transfer(1, 2, dec!(30)), &Cancellation::never())
            .await
        else {
            panic!("transfer failed");
        };
        assert_eq!(receipt.attempts, 1);

        let Ok(details) = service.get_transfer(receipt.event.transfer_id).await else {
            panic!("lookup failed");
        };
        assert_eq!(details.event, receipt.event);
        assert_eq!(details.entries, vec![receipt.debit.clone(), receipt.credit.clone()]);

        assert!(
            service
                .process_transfer(transfer(2, 1, dec!(5)), &Cancellation::never())
                .await
                .is_ok()
        );
        let Ok((page, total)) = service.account_entries(id(1), 1, 0).await else {
            panic!("history failed");
        };
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert!(page.iter().all(|e| e.entry_id > receipt.debit.entry_id));

        assert!(matches!(
            service.get_transfer(TransferId::new()).await,
            Err(LedgerError::TransferNotFound(_))
        ));
        assert!(matches!(
            service.account_entries(id(9), 10, 0).await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn integrity_holds_after_settled_transfers() {
        let service = service();
        assert!(service.create_account(id(1), dec!(100)).await.is_ok());
        assert!(service.create_account(id(2), dec!(50)).await.is_ok());
        assert!(service.create_account(id(3), dec!(0)).await.is_ok());

        for (s, d, amount) in [(1, 2, dec!(30)), (1, 3, dec!(10)), (2, 3, dec!(0.125))] {
            assert!(
                service
                    .process_transfer(transfer(s, d, amount), &Cancellation::never())
                    .await
                    .is_ok()
            );
        }
        // Rejected transfers leave nothing behind.
        assert!(
            service
                .process_transfer(transfer(3, 1, dec!(1000)), &Cancellation::never())
                .await
                .is_err()
        );

        let Ok(report) = service.verify_integrity().await else {
            panic!("check failed");
        };
        assert!(report.is_valid);
        assert_eq!(report.total_debits, dec!(40.125));

        for raw in 1..=3 {
            let Ok(reconciliation) = service.reconcile_account(id(raw)).await else {
                panic!("reconcile failed");
            };
            assert!(reconciliation.is_consistent, "account {raw} inconsistent");
        }
    }

    /// Two transfers out of account 1 read it at version 2 together. One
    /// settles on its first attempt; the other conflicts, rereads and lands
    /// account 1 on version 4.
    #[tokio::test]
    async fn racing_transfers_from_one_source_settle_in_turn() {
        let store = Arc::new(SteppingStore::default());
        let service = LedgerService::new(store, RetryPolicy::default());
        for (raw, balance) in [(1, dec!(100)), (2, dec!(0)), (3, dec!(0))] {
            assert!(service.create_account(id(raw), balance).await.is_ok());
        }
        let cancel = Cancellation::never();
        assert!(
            service
                .process_transfer(transfer(1, 2, dec!(10)), &cancel)
                .await
                .is_ok()
        );

        let (left, right) = tokio::join!(
            service.process_transfer(transfer(1, 2, dec!(10)), &cancel),
            service.process_transfer(transfer(1, 3, dec!(10)), &cancel),
        );
        let (Ok(left), Ok(right)) = (left, right) else {
            panic!("both transfers should settle");
        };

        let mut attempts = [left.attempts, right.attempts];
        attempts.sort_unstable();
        assert_eq!(attempts, [1, 2]);
        let mut versions = [left.source_balance.version, right.source_balance.version];
        versions.sort_unstable();
        assert_eq!(versions, [3, 4]);

        let Ok(source) = service.get_account(id(1)).await else {
            panic!("get failed");
        };
        assert_eq!((source.balance.balance, source.balance.version), (dec!(70), 4));
        let Ok(report) = service.verify_integrity().await else {
            panic!("check failed");
        };
        assert!(report.is_valid);
        assert_eq!(report.total_debits, dec!(30));
    }

    /// Many concurrent transfers over a small set of accounts: every one
    /// either settles or is rejected cleanly, money is conserved, and the
    /// journal balances.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_conserve_money() {
        let service = Arc::new(LedgerService::new(
            Arc::new(InMemoryStore::new()),
            RetryPolicy::new(10, std::time::Duration::from_millis(1)),
        ));
        for raw in 1..=4 {
            assert!(service.create_account(id(raw), dec!(1000)).await.is_ok());
        }

        let mut handles = Vec::new();
        for n in 0..64_i64 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                let source = n % 4 + 1;
                let destination = (n + 1) % 4 + 1;
                let request = transfer(source, destination, dec!(3));
                service
                    .process_transfer(request, &Cancellation::never())
                    .await
            }));
        }

        let mut settled = 0;
        for handle in handles {
            let Ok(result) = handle.await else {
                panic!("task panicked");
            };
            match result {
                Ok(_) => settled += 1,
                Err(LedgerError::ExhaustedRetries { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(settled > 0);

        let mut total = Decimal::ZERO;
        let mut versions = 0;
        for raw in 1..=4 {
            let Ok(state) = service.get_account(id(raw)).await else {
                panic!("get failed");
            };
            total += state.balance.balance;
            versions += state.balance.version - 1;
            let Ok(reconciliation) = service.reconcile_account(id(raw)).await else {
                panic!("reconcile failed");
            };
            assert!(reconciliation.is_consistent);
        }
        assert_eq!(total, dec!(4000));
        // Each settled transfer bumps exactly two versions.
        assert_eq!(versions, 2 * settled);

        let Ok(report) = service.verify_integrity().await else {
            panic!("check failed");
        };
        assert!(report.is_valid);
        assert_eq!(report.total_debits, dec!(3) * Decimal::from(settled));
    }
}
