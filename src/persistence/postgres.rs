//! PostgreSQL implementation of the ledger store.
//!
//! Every [`LedgerTransaction`] wraps one `sqlx` transaction. Optimistic
//! concurrency relies on the row count of a `WHERE version = $n` update;
//! PostgreSQL row locks make a second writer wait for the first to finish,
//! after which its version predicate no longer matches. Writers that lock
//! the same pair of rows in opposite order deadlock instead; the transaction
//! PostgreSQL aborts is reported as a version conflict so it gets retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::{
    Account, AccountBalance, AccountId, EntryType, JournalEntry, JournalTotals, TransferEvent,
    TransferEventType, TransferId,
};
use crate::error::{LedgerError, VersionConflict};

use super::models::{NewJournalEntry, NewTransferEvent};
use super::store::{LedgerStore, LedgerTransaction};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

type AccountRow = (i64, Decimal, DateTime<Utc>, DateTime<Utc>);
type BalanceRow = (i64, Decimal, i64, i64, DateTime<Utc>);
type EventRow = (i64, Uuid, i64, i64, Decimal, String, DateTime<Utc>);
type EntryRow = (i64, Uuid, i64, Decimal, String, i64, DateTime<Utc>);

/// PostgreSQL-backed [`LedgerStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(map_sqlx_error)?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    /// Creates the ledger tables, indexes, and append-only triggers if they
    /// do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if a statement fails.
    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!("ledger schema applied");
        Ok(())
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, opening_balance, created_at, updated_at FROM accounts WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(account_from_row).transpose()
    }

    async fn get_balance(&self, id: AccountId) -> Result<Option<AccountBalance>, LedgerError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT account_id, balance, version, last_event_id, updated_at \
             FROM account_balances WHERE account_id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(balance_from_row).transpose()
    }

    async fn find_transfer_event(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<TransferEvent>, LedgerError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, transfer_id, from_account_id, to_account_id, amount, event_type, created_at \
             FROM transfer_events WHERE transfer_id = $1",
        )
        .bind(transfer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(event_from_row).transpose()
    }

    async fn journal_entries_for_transfer(
        &self,
        transfer_id: TransferId,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT entry_id, transfer_id, account_id, amount, entry_type, source_event_id, created_at \
             FROM journal_entries WHERE transfer_id = $1 ORDER BY entry_id ASC",
        )
        .bind(transfer_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn journal_entries_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT entry_id, transfer_id, account_id, amount, entry_type, source_event_id, created_at \
             FROM journal_entries WHERE account_id = $1 \
             ORDER BY entry_id DESC LIMIT $2 OFFSET $3",
        )
        .bind(account_id.get())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn count_journal_entries_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<u64, LedgerError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM journal_entries WHERE account_id = $1",
        )
        .bind(account_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn journal_totals(
        &self,
        account_id: Option<AccountId>,
    ) -> Result<JournalTotals, LedgerError> {
        let rows = if let Some(id) = account_id {
            sqlx::query_as::<_, (String, Decimal)>(
                "SELECT entry_type, COALESCE(SUM(amount), 0) FROM journal_entries \
                 WHERE account_id = $1 GROUP BY entry_type",
            )
            .bind(id.get())
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, (String, Decimal)>(
                "SELECT entry_type, COALESCE(SUM(amount), 0) FROM journal_entries \
                 GROUP BY entry_type",
            )
            .fetch_all(&self.pool)
            .await
        }
        .map_err(map_sqlx_error)?;

        let mut totals = JournalTotals::default();
        for (tag, sum) in rows {
            totals.add(EntryType::parse(&tag)?, sum)?;
        }
        Ok(totals)
    }
}

/// One open `sqlx` transaction. Dropping it without commit rolls back.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerTransaction for PostgresTransaction {
    async fn account_exists(&mut self, id: AccountId) -> Result<bool, LedgerError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)",
        )
        .bind(id.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(exists)
    }

    #[tracing::instrument(skip_all, fields(account_id = %account.id))]
    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO accounts (id, opening_balance, created_at, updated_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(account.id.get())
        .bind(account.opening_balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyExists(account.id)
            } else {
                map_sqlx_error(e)
            }
        })?;
        Ok(())
    }

    async fn get_balance(&mut self, id: AccountId) -> Result<Option<AccountBalance>, LedgerError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT account_id, balance, version, last_event_id, updated_at \
             FROM account_balances WHERE account_id = $1",
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(balance_from_row).transpose()
    }

    async fn insert_balance(&mut self, balance: &AccountBalance) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO account_balances (account_id, balance, version, last_event_id, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(balance.account_id.get())
        .bind(balance.balance)
        .bind(balance.version)
        .bind(balance.last_event_id)
        .bind(balance.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        fields(account_id = %balance.account_id, version = balance.version, expected_version = expected_version)
    )]
    async fn update_balance_if_version(
        &mut self,
        balance: &AccountBalance,
        expected_version: i64,
    ) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            "UPDATE account_balances \
             SET balance = $1, version = $2, last_event_id = $3, updated_at = $4 \
             WHERE account_id = $5 AND version = $6",
        )
        .bind(balance.balance)
        .bind(balance.version)
        .bind(balance.last_event_id)
        .bind(balance.updated_at)
        .bind(balance.account_id.get())
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_concurrency_abort(&e) {
                tracing::debug!(error = %e, "balance update aborted by concurrent writer");
                LedgerError::Conflict(VersionConflict {
                    account_id: balance.account_id,
                    expected_version,
                })
            } else {
                map_sqlx_error(e)
            }
        })?;

        Ok(result.rows_affected())
    }

    async fn append_transfer_event(
        &mut self,
        event: NewTransferEvent,
    ) -> Result<TransferEvent, LedgerError> {
        let event_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO transfer_events \
             (transfer_id, from_account_id, to_account_id, amount, event_type, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING event_id",
        )
        .bind(event.transfer_id.as_uuid())
        .bind(event.from_account_id.get())
        .bind(event.to_account_id.get())
        .bind(event.amount)
        .bind(event.event_type.as_str())
        .bind(event.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(event.into_event(event_id))
    }

    async fn append_journal_entry(
        &mut self,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, LedgerError> {
        let entry_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO journal_entries \
             (transfer_id, account_id, amount, entry_type, source_event_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING entry_id",
        )
        .bind(entry.transfer_id.as_uuid())
        .bind(entry.account_id.get())
        .bind(entry.amount)
        .bind(entry.entry_type.as_str())
        .bind(entry.source_event_id)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(entry.into_entry(entry_id))
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> LedgerError {
    tracing::error!(error = %err, "ledger storage failure");
    LedgerError::Persistence(err.to_string())
}

/// `deadlock_detected` and `serialization_failure`.
fn is_concurrency_abort_code(code: &str) -> bool {
    matches!(code, "40P01" | "40001")
}

fn is_concurrency_abort(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err
            .code()
            .as_deref()
            .is_some_and(is_concurrency_abort_code);
    }
    false
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.is_unique_violation();
    }
    false
}

fn stored_account_id(raw: i64) -> Result<AccountId, LedgerError> {
    AccountId::new(raw)
        .map_err(|_| LedgerError::Internal(format!("stored account id {raw} is invalid")))
}

fn account_from_row(row: AccountRow) -> Result<Account, LedgerError> {
    let (id, opening_balance, created_at, updated_at) = row;
    Ok(Account {
        id: stored_account_id(id)?,
        opening_balance,
        created_at,
        updated_at,
    })
}

fn balance_from_row(row: BalanceRow) -> Result<AccountBalance, LedgerError> {
    let (account_id, balance, version, last_event_id, updated_at) = row;
    Ok(AccountBalance {
        account_id: stored_account_id(account_id)?,
        balance,
        version,
        last_event_id,
        updated_at,
    })
}

fn event_from_row(row: EventRow) -> Result<TransferEvent, LedgerError> {
    let (event_id, transfer_id, from, to, amount, event_type, created_at) = row;
    Ok(TransferEvent {
        event_id,
        transfer_id: TransferId::from_uuid(transfer_id),
        from_account_id: stored_account_id(from)?,
        to_account_id: stored_account_id(to)?,
        amount,
        event_type: TransferEventType::parse(&event_type)?,
        created_at,
    })
}

fn entry_from_row(row: EntryRow) -> Result<JournalEntry, LedgerError> {
    let (entry_id, transfer_id, account_id, amount, entry_type, source_event_id, created_at) = row;
    Ok(JournalEntry {
        entry_id,
        transfer_id: TransferId::from_uuid(transfer_id),
        account_id: stored_account_id(account_id)?,
        amount,
        entry_type: EntryType::parse(&entry_type)?,
        source_event_id,
        created_at,
    })
}
