//! In-memory ledger backend.
//!
//! Intended for tests and for running the service without PostgreSQL
//! (`PERSISTENCE_ENABLED=false`). Not optimized for performance.
//!
//! Committed state lives behind one mutex. A transaction stages its writes
//! privately and publishes them in a single step on commit, so readers never
//! observe half a transfer.
//!
//! Row-level write conflicts are modelled with claims. An open transaction
//! that writes a balance row (or inserts an account ID) owns it until it
//! commits, rolls back, or is dropped. Contention never blocks:
//!
//! - A second insert of the same account ID gets
//!   [`LedgerError::AlreadyExists`].
//! - Balance rows go to the transaction that began first. A younger writer
//!   sees zero rows affected. An older writer takes the row over and wounds
//!   the younger owner, whose later writes match nothing and whose commit
//!   fails with [`LedgerError::Conflict`].
//!
//! Two transfers crossing the same pair of accounts in opposite directions
//! therefore end with exactly one of them committed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::{
    Account, AccountBalance, AccountId, JournalEntry, JournalTotals, TransferEvent, TransferId,
};
use crate::error::{LedgerError, VersionConflict};

use super::models::{NewJournalEntry, NewTransferEvent};
use super::store::{LedgerStore, LedgerTransaction};

#[derive(Debug, Default)]
struct LedgerState {
    accounts: BTreeMap<AccountId, Account>,
    balances: BTreeMap<AccountId, AccountBalance>,
    events: Vec<TransferEvent>,
    entries: Vec<JournalEntry>,
    last_event_id: i64,
    last_entry_id: i64,
    /// Begin order of transactions; lower is older.
    last_ticket: u64,
    /// Account IDs inserted by a still-open transaction.
    reserved_accounts: HashSet<AccountId>,
    /// Balance rows written by a still-open transaction, keyed to its ticket.
    claimed_balances: HashMap<AccountId, u64>,
    /// Open transactions that lost a balance row to an older one.
    wounded: HashMap<u64, AccountId>,
}

fn lock_state(state: &Mutex<LedgerState>) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
    state
        .lock()
        .map_err(|_| LedgerError::Persistence("in-memory ledger lock poisoned".to_string()))
}

/// Mutex-backed [`LedgerStore`].
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let ticket = {
            let mut state = lock_state(&self.state)?;
            state.last_ticket += 1;
            state.last_ticket
        };
        Ok(Box::new(InMemoryTransaction::new(
            Arc::clone(&self.state),
            ticket,
        )))
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let state = lock_state(&self.state)?;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn get_balance(&self, id: AccountId) -> Result<Option<AccountBalance>, LedgerError> {
        let state = lock_state(&self.state)?;
        Ok(state.balances.get(&id).cloned())
    }

    async fn find_transfer_event(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<TransferEvent>, LedgerError> {
        let state = lock_state(&self.state)?;
        Ok(state
            .events
            .iter()
            .find(|e| e.transfer_id == transfer_id)
            .cloned())
    }

    async fn journal_entries_for_transfer(
        &self,
        transfer_id: TransferId,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let state = lock_state(&self.state)?;
        let mut entries: Vec<JournalEntry> = state
            .entries
            .iter()
            .filter(|e| e.transfer_id == transfer_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.entry_id);
        Ok(entries)
    }

    async fn journal_entries_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let state = lock_state(&self.state)?;
        let mut entries: Vec<&JournalEntry> = state
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .collect();
        entries.sort_by(|a, b| b.entry_id.cmp(&a.entry_id));
        Ok(entries
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_journal_entries_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<u64, LedgerError> {
        let state = lock_state(&self.state)?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .count() as u64)
    }

    async fn journal_totals(
        &self,
        account_id: Option<AccountId>,
    ) -> Result<JournalTotals, LedgerError> {
        let state = lock_state(&self.state)?;
        let mut totals = JournalTotals::default();
        for entry in state
            .entries
            .iter()
            .filter(|e| account_id.is_none_or(|id| e.account_id == id))
        {
            totals.add(entry.entry_type, entry.amount)?;
        }
        Ok(totals)
    }
}

/// Staged writes of one open transaction.
#[derive(Debug)]
struct InMemoryTransaction {
    state: Arc<Mutex<LedgerState>>,
    ticket: u64,
    accounts: Vec<Account>,
    balances: BTreeMap<AccountId, AccountBalance>,
    events: Vec<TransferEvent>,
    entries: Vec<JournalEntry>,
    reserved_accounts: Vec<AccountId>,
    claimed_balances: Vec<AccountId>,
    open: bool,
}

impl InMemoryTransaction {
    fn new(state: Arc<Mutex<LedgerState>>, ticket: u64) -> Self {
        Self {
            state,
            ticket,
            accounts: Vec::new(),
            balances: BTreeMap::new(),
            events: Vec::new(),
            entries: Vec::new(),
            reserved_accounts: Vec::new(),
            claimed_balances: Vec::new(),
            open: true,
        }
    }

    /// Drops every claim this transaction holds.
    fn release(&mut self, state: &mut LedgerState) {
        for id in self.reserved_accounts.drain(..) {
            state.reserved_accounts.remove(&id);
        }
        for id in self.claimed_balances.drain(..) {
            // A row taken over by an older transaction is no longer ours.
            if state.claimed_balances.get(&id) == Some(&self.ticket) {
                state.claimed_balances.remove(&id);
            }
        }
        state.wounded.remove(&self.ticket);
        self.open = false;
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let state = Arc::clone(&self.state);
        if let Ok(mut guard) = state.lock() {
            self.release(&mut guard);
        }
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn account_exists(&mut self, id: AccountId) -> Result<bool, LedgerError> {
        if self.accounts.iter().any(|a| a.id == id) {
            return Ok(true);
        }
        let state = lock_state(&self.state)?;
        Ok(state.accounts.contains_key(&id))
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        {
            let mut state = lock_state(&self.state)?;
            if state.accounts.contains_key(&account.id)
                || state.reserved_accounts.contains(&account.id)
            {
                return Err(LedgerError::AlreadyExists(account.id));
            }
            state.reserved_accounts.insert(account.id);
        }
        self.reserved_accounts.push(account.id);
        self.accounts.push(account.clone());
        Ok(())
    }

    async fn get_balance(&mut self, id: AccountId) -> Result<Option<AccountBalance>, LedgerError> {
        if let Some(staged) = self.balances.get(&id) {
            return Ok(Some(staged.clone()));
        }
        let state = lock_state(&self.state)?;
        Ok(state.balances.get(&id).cloned())
    }

    async fn insert_balance(&mut self, balance: &AccountBalance) -> Result<(), LedgerError> {
        let id = balance.account_id;
        {
            let mut state = lock_state(&self.state)?;
            if state.balances.contains_key(&id) || state.claimed_balances.contains_key(&id) {
                return Err(LedgerError::Persistence(format!(
                    "balance row for account {id} already exists"
                )));
            }
            state.claimed_balances.insert(id, self.ticket);
        }
        self.claimed_balances.push(id);
        self.balances.insert(id, balance.clone());
        Ok(())
    }

    async fn update_balance_if_version(
        &mut self,
        balance: &AccountBalance,
        expected_version: i64,
    ) -> Result<u64, LedgerError> {
        let id = balance.account_id;
        let mut state = lock_state(&self.state)?;
        if state.wounded.contains_key(&self.ticket) {
            return Ok(0);
        }

        // Row already owned by this transaction.
        if let Some(staged) = self.balances.get(&id) {
            if staged.version != expected_version {
                return Ok(0);
            }
            self.balances.insert(id, balance.clone());
            return Ok(1);
        }

        let matches = state
            .balances
            .get(&id)
            .is_some_and(|current| current.version == expected_version);
        if !matches {
            return Ok(0);
        }
        match state.claimed_balances.get(&id).copied() {
            Some(owner) if owner < self.ticket => return Ok(0),
            Some(owner) => {
                tracing::debug!(
                    account_id = %id,
                    winner = self.ticket,
                    loser = owner,
                    "balance row taken over by older transaction"
                );
                state.wounded.insert(owner, id);
            }
            None => {}
        }
        state.claimed_balances.insert(id, self.ticket);
        drop(state);

        self.claimed_balances.push(id);
        self.balances.insert(id, balance.clone());
        Ok(1)
    }

    async fn append_transfer_event(
        &mut self,
        event: NewTransferEvent,
    ) -> Result<TransferEvent, LedgerError> {
        let event_id = {
            let mut state = lock_state(&self.state)?;
            state.last_event_id += 1;
            state.last_event_id
        };
        let event = event.into_event(event_id);
        self.events.push(event.clone());
        Ok(event)
    }

    async fn append_journal_entry(
        &mut self,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, LedgerError> {
        let entry_id = {
            let mut state = lock_state(&self.state)?;
            state.last_entry_id += 1;
            state.last_entry_id
        };
        let entry = entry.into_entry(entry_id);
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let mut this = self;
        let state = Arc::clone(&this.state);
        let mut guard = lock_state(&state)?;
        if let Some(account_id) = guard.wounded.get(&this.ticket).copied() {
            let expected_version = guard.balances.get(&account_id).map_or(0, |b| b.version);
            this.release(&mut guard);
            return Err(LedgerError::Conflict(VersionConflict {
                account_id,
                expected_version,
            }));
        }
        for account in this.accounts.drain(..) {
            guard.accounts.insert(account.id, account);
        }
        for (id, balance) in std::mem::take(&mut this.balances) {
            guard.balances.insert(id, balance);
        }
        guard.events.append(&mut this.events);
        guard.entries.append(&mut this.entries);
        this.release(&mut guard);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        let mut this = self;
        let state = Arc::clone(&this.state);
        let mut guard = lock_state(&state)?;
        this.release(&mut guard);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn id(raw: i64) -> AccountId {
        let Ok(id) = AccountId::new(raw) else {
            panic!("valid id");
        };
        id
    }

    async fn seed(store: &InMemoryStore, raw: i64) -> AccountBalance {
        let now = Utc::now();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let account = Account::new(id(raw), dec!(100), now);
        let balance = AccountBalance::opening(id(raw), dec!(100), now);
        assert!(tx.insert_account(&account).await.is_ok());
        assert!(tx.insert_balance(&balance).await.is_ok());
        assert!(tx.commit().await.is_ok());
        balance
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let store = InMemoryStore::new();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let now = Utc::now();
        assert!(
            tx.insert_account(&Account::new(id(1), dec!(5), now))
                .await
                .is_ok()
        );
        assert!(matches!(tx.account_exists(id(1)).await, Ok(true)));
        assert!(matches!(store.get_account(id(1)).await, Ok(None)));

        assert!(tx.commit().await.is_ok());
        assert!(matches!(store.get_account(id(1)).await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn rollback_discards_writes_and_releases_claims() {
        let store = InMemoryStore::new();
        let opening = seed(&store, 1).await;

        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let next = opening.advance(dec!(1), 0, Utc::now());
        assert!(matches!(tx.update_balance_if_version(&next, 1).await, Ok(1)));
        assert!(tx.rollback().await.is_ok());

        let Ok(Some(stored)) = store.get_balance(id(1)).await else {
            panic!("balance missing");
        };
        assert_eq!(stored, opening);

        // The row is writable again.
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        assert!(matches!(tx.update_balance_if_version(&next, 1).await, Ok(1)));
    }

    #[tokio::test]
    async fn dropping_a_transaction_rolls_back() {
        let store = InMemoryStore::new();
        let opening = seed(&store, 1).await;
        {
            let Ok(mut tx) = store.begin().await else {
                panic!("begin failed");
            };
            let next = opening.advance(dec!(1), 0, Utc::now());
            assert!(matches!(tx.update_balance_if_version(&next, 1).await, Ok(1)));
        }
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let next = opening.advance(dec!(2), 0, Utc::now());
        assert!(matches!(tx.update_balance_if_version(&next, 1).await, Ok(1)));
    }

    #[tokio::test]
    async fn stale_version_matches_zero_rows() {
        let store = InMemoryStore::new();
        let opening = seed(&store, 1).await;
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let next = opening.advance(dec!(1), 0, Utc::now());
        assert!(matches!(tx.update_balance_if_version(&next, 7).await, Ok(0)));
    }

    #[tokio::test]
    async fn second_writer_on_same_row_matches_zero_rows() {
        let store = InMemoryStore::new();
        let opening = seed(&store, 1).await;

        let (Ok(mut first), Ok(mut second)) = (store.begin().await, store.begin().await) else {
            panic!("begin failed");
        };
        let a = opening.advance(dec!(90), 0, Utc::now());
        let b = opening.advance(dec!(80), 0, Utc::now());
        assert!(matches!(first.update_balance_if_version(&a, 1).await, Ok(1)));
        assert!(matches!(second.update_balance_if_version(&b, 1).await, Ok(0)));
        assert!(first.commit().await.is_ok());

        // After the winner commits the loser's version is stale.
        assert!(matches!(second.update_balance_if_version(&b, 1).await, Ok(0)));
        let Ok(Some(stored)) = store.get_balance(id(1)).await else {
            panic!("balance missing");
        };
        assert_eq!(stored.version, 2);
        assert_eq!(stored.balance, dec!(90));
    }

    #[tokio::test]
    async fn crossed_writers_leave_exactly_one_commit() {
        let store = InMemoryStore::new();
        let one = seed(&store, 1).await;
        let two = seed(&store, 2).await;
        let now = Utc::now();

        // 1 -> 2 and 2 -> 1 by 10, each debiting its own source first.
        let (Ok(mut older), Ok(mut younger)) = (store.begin().await, store.begin().await) else {
            panic!("begin failed");
        };
        let debit_one = one.advance(dec!(90), 0, now);
        let credit_one = one.advance(dec!(110), 0, now);
        let debit_two = two.advance(dec!(90), 0, now);
        let credit_two = two.advance(dec!(110), 0, now);
        assert!(matches!(older.update_balance_if_version(&debit_one, 1).await, Ok(1)));
        assert!(matches!(younger.update_balance_if_version(&debit_two, 1).await, Ok(1)));

        assert!(matches!(younger.update_balance_if_version(&credit_one, 1).await, Ok(0)));
        assert!(matches!(older.update_balance_if_version(&credit_two, 1).await, Ok(1)));

        assert!(matches!(younger.commit().await, Err(LedgerError::Conflict(_))));
        assert!(older.commit().await.is_ok());

        let (Ok(Some(one)), Ok(Some(two))) =
            (store.get_balance(id(1)).await, store.get_balance(id(2)).await)
        else {
            panic!("balance missing");
        };
        assert_eq!((one.balance, one.version), (dec!(90), 2));
        assert_eq!((two.balance, two.version), (dec!(110), 2));
    }

    #[tokio::test]
    async fn wounded_writer_fails_even_after_winner_commits() {
        let store = InMemoryStore::new();
        let one = seed(&store, 1).await;
        let two = seed(&store, 2).await;
        let now = Utc::now();
        let debit_one = one.advance(dec!(90), 0, now);
        let credit_one = one.advance(dec!(110), 0, now);
        let debit_two = two.advance(dec!(90), 0, now);
        let credit_two = two.advance(dec!(110), 0, now);

        let (Ok(mut older), Ok(mut younger)) = (store.begin().await, store.begin().await) else {
            panic!("begin failed");
        };
        assert!(matches!(younger.update_balance_if_version(&debit_two, 1).await, Ok(1)));
        assert!(matches!(older.update_balance_if_version(&debit_one, 1).await, Ok(1)));
        assert!(matches!(older.update_balance_if_version(&credit_two, 1).await, Ok(1)));
        assert!(older.commit().await.is_ok());

        assert!(matches!(younger.update_balance_if_version(&credit_one, 1).await, Ok(0)));
        let Err(LedgerError::Conflict(conflict)) = younger.commit().await else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.account_id, id(2));

        // The loser left no claim behind.
        let Ok(Some(current)) = store.get_balance(id(2)).await else {
            panic!("balance missing");
        };
        assert_eq!(current.balance, dec!(110));
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let next = current.advance(dec!(105), 0, now);
        assert!(matches!(tx.update_balance_if_version(&next, 2).await, Ok(1)));
    }

    #[tokio::test]
    async fn duplicate_account_is_rejected_across_open_transactions() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let (Ok(mut first), Ok(mut second)) = (store.begin().await, store.begin().await) else {
            panic!("begin failed");
        };
        assert!(
            first
                .insert_account(&Account::new(id(3), dec!(0), now))
                .await
                .is_ok()
        );
        assert!(matches!(
            second
                .insert_account(&Account::new(id(3), dec!(0), now))
                .await,
            Err(LedgerError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn sequence_ids_are_assigned_by_the_store() {
        let store = InMemoryStore::new();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let new_event = NewTransferEvent {
            transfer_id: TransferId::new(),
            from_account_id: id(1),
            to_account_id: id(2),
            amount: dec!(1),
            event_type: crate::domain::TransferEventType::TransferProcessed,
            created_at: Utc::now(),
        };
        let (Ok(e1), Ok(e2)) = (
            tx.append_transfer_event(new_event.clone()).await,
            tx.append_transfer_event(new_event).await,
        ) else {
            panic!("append failed");
        };
        assert_eq!(e1.event_id, 1);
        assert_eq!(e2.event_id, 2);
    }
}
