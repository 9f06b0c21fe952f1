//! CLI command implementations.

pub mod dump;
pub mod info;
pub mod verify;

use burrow_core::journal::{Journal, Replay};
use burrow_core::journal_path;
use burrow_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// A journal opened without taking the database lock.
pub struct ReadOnlyJournal {
    /// Size on disk in bytes.
    pub size: u64,
    /// Everything the scan found.
    pub replay: Replay,
}

/// Opens and replays the journal of the database at `path`.
///
/// Nothing is written; a torn tail is reported, not cut.
pub fn read_journal(path: &Path) -> Result<ReadOnlyJournal, Box<dyn std::error::Error>> {
    let file = journal_path(path);
    if !file.exists() {
        return Err(format!("no database found at {}", path.display()).into());
    }
    let backend = FileBackend::open_read_only(&file)?;
    let size = backend.size()?;
    let replay = Journal::new(Box::new(backend), false).replay()?;
    Ok(ReadOnlyJournal { size, replay })
}

/// Renders bytes as lowercase hex.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use burrow_core::Database;
    use tempfile::TempDir;

    /// A closed database with `pairs` committed, one auto-commit each.
    pub fn database_with(pairs: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        for (k, v) in pairs {
            db.insert(None, k.as_bytes(), v.as_bytes()).unwrap();
        }
        db.close().unwrap();
        dir
    }
}
