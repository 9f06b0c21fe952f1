//! Append-only journal of committed batches.
//!
//! Every commit and every auto-commit operation is written as exactly one
//! frame. A frame is the unit of atomicity: on replay it is either applied
//! whole or not at all.
//!
//! ## Frame Format
//!
//! ```text
//! | magic "BRWJ" (4) | version (2) | length (4) | header crc32 (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload is `sequence (8) | op count (4) | ops…`, each op being
//! `tag (1) | key len (4) | key | [value len (4) | value]`. All integers are
//! little-endian. The header CRC covers magic, version and length; the
//! trailing CRC covers header and payload.
//!
//! ## Recovery Policy
//!
//! - A partial header that matches the magic so far, or a checksummed header
//!   whose frame runs past the end of the journal, is a torn write from a
//!   crash. It is treated as the end of the log and cut off when the database
//!   opens.
//! - Bad magic, an unknown version, a CRC mismatch or a malformed payload is
//!   corruption. The database refuses to open.

mod frame;
mod writer;

pub use frame::{
    check_field, decode_frame, encode_frame, Batch, Decoded, FRAME_HEADER_SIZE, JOURNAL_MAGIC,
};
pub use writer::{Journal, Replay};
