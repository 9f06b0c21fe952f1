//! # BurrowDB Core
//!
//! An embedded key/value engine with bounded, isolated transactions.
//!
//! ## Model
//!
//! - Keys and values are byte strings.
//! - A [`Transaction`] buffers inserts and erases in a pending log that only
//!   it can see. [`Transaction::commit`] applies the log to the store as one
//!   atomic, journaled batch; [`Transaction::abort`] discards it.
//! - At most [`Config::max_transactions`] transactions may be active at a
//!   time. A `begin` beyond that fails with
//!   [`CoreError::ResourceLimitReached`] and changes nothing.
//! - Operations given no transaction are auto-committed on their own.
//!
//! ## Durability
//!
//! Every committed batch is appended to a checksummed journal and replayed
//! on open. A frame torn by a crash is dropped; any other damage refuses the
//! open. If a journal write fails the store stops accepting writes until the
//! database is reopened.
//!
//! ## Example
//!
//! ```rust
//! use burrow_core::{CoreError, Database};
//!
//! let db = Database::open_in_memory().unwrap();
//!
//! let txn = db.begin().unwrap();
//! db.insert(Some(&txn), b"apple", b"red").unwrap();
//! db.insert(None, b"kiwi", b"green").unwrap();
//!
//! assert_eq!(db.key_count(Some(&txn)).unwrap(), 2);
//! assert_eq!(db.key_count(None).unwrap(), 1);
//!
//! txn.abort().unwrap();
//! assert!(matches!(db.find(None, b"apple"), Err(CoreError::NotFound)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod dir;
mod error;
pub mod journal;
mod stats;
mod store;
mod transaction;
mod types;

pub use config::{ClosePolicy, Config};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use store::{RecoveryReport, StoreStatistics};
pub use transaction::{InsertMode, Transaction, TransactionState};
pub use types::{Operation, SequenceNumber, TransactionId};

pub use dir::journal_path;
pub use store::{rebuild, statistics_of, CommittedMap};

// Backends callers need to open a database on.
pub use burrow_storage::{FileBackend, MemoryBackend, StorageBackend};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
