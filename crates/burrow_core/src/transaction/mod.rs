//! Transactions.
//!
//! A transaction collects inserts and erases in a pending log that only it
//! can see. Commit applies the whole log to the store as one journaled
//! batch; abort throws it away. A database admits at most
//! `max_transactions` active transactions at a time.

mod handle;
mod manager;
mod state;

pub use handle::Transaction;
pub(crate) use manager::TransactionManager;
pub use state::{InsertMode, TransactionState};
