//! Database directory layout.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK          # advisory lock, held while the database is open
//! └─ journal.log   # committed batches
//! ```

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// An opened database directory.
///
/// Holds the exclusive lock for as long as it lives.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens (or creates) the directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - `Io` with `NotFound` if the directory is missing and
    ///   `create_if_missing` is off
    /// - `InvalidConfig` if `error_if_exists` is on and a journal exists
    /// - `DatabaseLocked` if another handle holds the lock
    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        if !path.exists() {
            if !config.create_if_missing {
                return Err(CoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("database directory does not exist: {}", path.display()),
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "not a directory: {}",
                path.display()
            )));
        }
        if config.error_if_exists && path.join(JOURNAL_FILE).exists() {
            return Err(CoreError::invalid_config(format!(
                "database already exists: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the journal path.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        journal_path(&self.path)
    }
}

/// Returns where the journal of the database at `path` lives.
///
/// Used by read-only tooling that must not take the lock.
#[must_use]
pub fn journal_path(path: &Path) -> PathBuf {
    path.join(JOURNAL_FILE)
}
