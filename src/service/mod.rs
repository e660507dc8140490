//! Service layer: the ledger components and the facade that wires them.
//!
//! [`AccountRegistry`], [`BalanceProjection`], [`EventLog`] and
//! [`JournalLedger`] each own one concern and receive the store at
//! construction. [`TransferProcessor`] composes them into one atomic
//! transfer attempt, [`RetryCoordinator`] repeats attempts on conflicts,
//! and [`IntegrityVerifier`] audits the result. [`LedgerService`] is what
//! the HTTP layer talks to.

pub mod account_registry;
pub mod balance_projection;
pub mod event_log;
pub mod integrity;
pub mod journal_ledger;
pub mod ledger_service;
pub mod retry;
pub mod transfer_processor;

pub use account_registry::AccountRegistry;
pub use balance_projection::BalanceProjection;
pub use event_log::EventLog;
pub use integrity::{AccountReconciliation, IntegrityReport, IntegrityVerifier};
pub use journal_ledger::JournalLedger;
pub use ledger_service::{AccountState, LedgerService, TransferDetails};
pub use retry::{CancelHandle, Cancellation, RetryCoordinator, RetryPolicy};
pub use transfer_processor::{TransferProcessor, TransferReceipt};
