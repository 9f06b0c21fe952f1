//! Info command implementation.

use super::{format_size, read_journal};
use crate::Format;
use burrow_core::{rebuild, statistics_of};
use serde::Serialize;
use std::path::Path;

/// Database summary.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Database path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Complete frames in the journal.
    pub frame_count: usize,
    /// Sequence of the last frame.
    pub last_sequence: u64,
    /// Bytes of an incomplete trailing frame.
    pub torn_bytes: u64,
    /// Committed keys.
    pub key_count: u64,
    /// Key size statistics.
    pub keys: SizeStats,
    /// Record size statistics.
    pub records: SizeStats,
}

/// Total, smallest and largest size of a set of byte strings.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SizeStats {
    /// Sum of sizes.
    pub total: u64,
    /// Smallest size.
    pub min: u64,
    /// Largest size.
    pub max: u64,
}

/// Gathers the summary for the database at `path`.
pub fn collect(path: &Path) -> Result<InfoResult, Box<dyn std::error::Error>> {
    let journal = read_journal(path)?;
    let frame_count = journal.replay.batches.len();
    let torn_bytes = journal.replay.torn_bytes;
    let (committed, last_sequence) = rebuild(journal.replay)?;
    let stats = statistics_of(&committed);

    Ok(InfoResult {
        path: path.display().to_string(),
        journal_size: journal.size,
        frame_count,
        last_sequence: last_sequence.as_u64(),
        torn_bytes,
        key_count: stats.key_count,
        keys: SizeStats {
            total: stats.total_key_bytes,
            min: stats.min_key_size,
            max: stats.max_key_size,
        },
        records: SizeStats {
            total: stats.total_record_bytes,
            min: stats.min_record_size,
            max: stats.max_record_size,
        },
    })
}

/// Runs the info command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InfoResult) {
    println!("BurrowDB Database Info");
    println!("======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Journal:");
    println!("  Size:          {}", format_size(result.journal_size));
    println!("  Frames:        {}", result.frame_count);
    println!("  Last sequence: {}", result.last_sequence);
    if result.torn_bytes > 0 {
        println!("  Torn tail:     {} bytes (dropped at next open)", result.torn_bytes);
    }
    println!();
    println!("Records:");
    println!("  Keys:          {}", result.key_count);
    println!(
        "  Key size:      total {}, min {}, max {}",
        result.keys.total, result.keys.min, result.keys.max
    );
    println!(
        "  Record size:   total {}, min {}, max {}",
        result.records.total, result.records.min, result.records.max
    );
}
