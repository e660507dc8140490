//! Domain layer: ledger entities and the rules they carry on their own.
//!
//! This module contains account identity and balance snapshots, transfer
//! requests and events, journal entries, and the money rules shared by
//! every write path. Nothing here touches storage.

pub mod account;
pub mod ids;
pub mod journal;
pub mod money;
pub mod transfer;

pub use account::{Account, AccountBalance};
pub use ids::{AccountId, TransferId};
pub use journal::{EntryType, JournalEntry, JournalTotals};
pub use transfer::{TransferEvent, TransferEventType, TransferRequest};
