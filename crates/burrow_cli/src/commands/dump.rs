//! Dump command implementation.

use super::{hex, read_journal};
use crate::Format;
use burrow_core::rebuild;
use serde::Serialize;
use std::path::Path;

/// One committed pair, hex encoded.
#[derive(Debug, Serialize)]
pub struct DumpEntry {
    /// Key bytes as hex.
    pub key: String,
    /// Value bytes as hex.
    pub value: String,
}

/// Returns up to `limit` committed pairs in key order.
pub fn collect(path: &Path, limit: Option<usize>) -> Result<Vec<DumpEntry>, Box<dyn std::error::Error>> {
    let journal = read_journal(path)?;
    let (committed, _) = rebuild(journal.replay)?;
    Ok(committed
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(k, v)| DumpEntry {
            key: hex(k),
            value: hex(v),
        })
        .collect())
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let entries = collect(path, limit)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Text => {
            for entry in &entries {
                println!("{} => {}", entry.key, entry.value);
            }
            println!("({} pairs)", entries.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::database_with;

    #[test]
    fn dumps_in_key_order_with_limit() {
        let dir = database_with(&[("b", "\x02"), ("a", "\x01"), ("c", "\x03")]);

        let all = collect(dir.path(), None).unwrap();
        let keys: Vec<_> = all.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["61", "62", "63"]);
        assert_eq!(all[0].value, "01");

        assert_eq!(collect(dir.path(), Some(2)).unwrap().len(), 2);
    }
}
