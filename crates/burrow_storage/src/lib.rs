//! # BurrowDB Storage
//!
//! Byte-store backends for BurrowDB.
//!
//! A backend is an append-only sequence of bytes with random-access reads.
//! It knows nothing about journal frames, keys or transactions; the
//! `burrow_core` journal owns every byte of interpretation.
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - ephemeral storage, cheaply cloneable to simulate a reopen
//! - [`FileBackend`] - persistent storage on a single file
//! - [`FaultyBackend`] - wrapper that fails appends on demand, for crash tests
//!
//! ## Example
//!
//! ```rust
//! use burrow_storage::{MemoryBackend, StorageBackend};
//!
//! let mut backend = MemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultSwitch, FaultyBackend};
pub use file::FileBackend;
pub use memory::MemoryBackend;
