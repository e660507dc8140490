//! Storage contract consumed by the ledger core.
//!
//! The core never talks to a database directly. It needs exactly four
//! things from a backend:
//!
//! - an atomic transaction scope with commit/rollback spanning many writes,
//! - unique-key enforcement on account identity,
//! - a conditional update reporting how many rows it touched,
//! - an aggregate sum grouped by journal entry type.
//!
//! [`LedgerStore`] is the shared handle; [`LedgerTransaction`] is one open
//! transaction. Both are object-safe so services hold
//! `Arc<dyn LedgerStore>` and work against `&mut dyn LedgerTransaction`.
//!
//! ## Implementation Requirements
//!
//! Implementations must:
//! - make every write in a transaction invisible until `commit` returns,
//! - discard all writes on `rollback` or when the transaction is dropped,
//! - report `0` from [`LedgerTransaction::update_balance_if_version`] when the
//!   stored version differs from the expected one, or when the write loses
//!   the row to a concurrent transaction (a backend may instead abort with
//!   [`LedgerError::Conflict`]),
//! - resolve writers contending for the same rows so that at least one of
//!   them can commit,
//! - return [`LedgerError::AlreadyExists`] from
//!   [`LedgerTransaction::insert_account`] on a duplicate ID.

use std::fmt;

use async_trait::async_trait;

use crate::domain::{
    Account, AccountBalance, AccountId, JournalEntry, JournalTotals, TransferEvent, TransferId,
};
use crate::error::LedgerError;

use super::models::{NewJournalEntry, NewTransferEvent};

/// Shared handle to a ledger backend.
///
/// Reads on this trait see committed state only and run outside any
/// transfer's transaction.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Opens a new atomic transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if the backend is unavailable.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError>;

    /// Loads an account by ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    /// Loads the committed balance snapshot of an account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn get_balance(&self, id: AccountId) -> Result<Option<AccountBalance>, LedgerError>;

    /// Loads a transfer event by its transfer ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn find_transfer_event(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<TransferEvent>, LedgerError>;

    /// Lists the journal entries of one transfer, ordered by entry ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn journal_entries_for_transfer(
        &self,
        transfer_id: TransferId,
    ) -> Result<Vec<JournalEntry>, LedgerError>;

    /// Lists journal entries booked against one account, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn journal_entries_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<JournalEntry>, LedgerError>;

    /// Counts journal entries booked against one account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn count_journal_entries_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<u64, LedgerError>;

    /// Sums journal amounts grouped by entry type, across the whole ledger
    /// or for one account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn journal_totals(
        &self,
        account_id: Option<AccountId>,
    ) -> Result<JournalTotals, LedgerError>;
}

/// One open atomic transaction against a [`LedgerStore`].
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Returns `true` if the account exists (committed or written earlier in
    /// this transaction).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn account_exists(&mut self, id: AccountId) -> Result<bool, LedgerError>;

    /// Inserts a new account row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadyExists`] on a duplicate ID and
    /// [`LedgerError::Persistence`] on backend failure.
    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// Reads the current balance snapshot of an account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn get_balance(&mut self, id: AccountId) -> Result<Option<AccountBalance>, LedgerError>;

    /// Inserts the opening balance row of a new account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn insert_balance(&mut self, balance: &AccountBalance) -> Result<(), LedgerError>;

    /// Overwrites a balance row only if its stored version equals
    /// `expected_version`. Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Conflict`] if the backend aborted the write in favour
    ///   of a concurrent transaction.
    /// - [`LedgerError::Persistence`] on backend failure.
    ///
    /// A version mismatch is not an error here; it is reported as `Ok(0)`.
    async fn update_balance_if_version(
        &mut self,
        balance: &AccountBalance,
        expected_version: i64,
    ) -> Result<u64, LedgerError>;

    /// Appends a transfer event; the store assigns its sequence ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn append_transfer_event(
        &mut self,
        event: NewTransferEvent,
    ) -> Result<TransferEvent, LedgerError>;

    /// Appends a journal entry; the store assigns its entry ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on backend failure.
    async fn append_journal_entry(
        &mut self,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, LedgerError>;

    /// Makes every write of this transaction visible atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if a concurrent transaction took
    /// over one of this transaction's rows, or [`LedgerError::Persistence`]
    /// if the commit fails. Nothing is applied in either case.
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    /// Discards every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if the backend reports a failure
    /// while rolling back.
    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}
