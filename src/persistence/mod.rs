//! Persistence layer: the storage contract and its two backends.
//!
//! [`LedgerStore`] / [`LedgerTransaction`] describe what the ledger core
//! needs from storage. [`PostgresStore`] is the durable backend;
//! [`InMemoryStore`] backs tests and database-less runs.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::InMemoryStore;
pub use models::{NewJournalEntry, NewTransferEvent};
pub use postgres::PostgresStore;
pub use store::{LedgerStore, LedgerTransaction};
