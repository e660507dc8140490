//! # ledger-gateway
//!
//! REST service for a double-entry ledger with optimistic-concurrency
//! transfer settlement.
//!
//! Every accepted transfer is recorded as one immutable transfer event and
//! a pair of journal entries (debit on the source, credit on the
//! destination), and moves two versioned balance snapshots forward inside a
//! single storage transaction. Concurrent writers to the same balance are
//! detected through the version counter and retried with bounded
//! exponential backoff.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── LedgerService (service/)
//!     │     ├── RetryCoordinator
//!     │     ├── TransferProcessor
//!     │     │     ├── AccountRegistry
//!     │     │     ├── BalanceProjection
//!     │     │     ├── EventLog
//!     │     │     └── JournalLedger
//!     │     └── IntegrityVerifier
//!     │
//!     ├── LedgerStore / LedgerTransaction (persistence/)
//!     │
//!     └── PostgreSQL  |  in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
