//! Frame encoding and decoding.

use crate::error::{CoreError, CoreResult};
use crate::types::{Operation, SequenceNumber};

/// Magic bytes opening every frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"BRWJ";

/// Current frame format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4) + header crc (4)
pub const FRAME_HEADER_SIZE: usize = 14;

/// Bytes covered by the header checksum.
const HEADER_BODY_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

const TAG_INSERT: u8 = 1;
const TAG_ERASE: u8 = 2;

const MAX_FIELD_LEN: usize = u32::MAX as usize;

/// A committed batch read back from the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Sequence number assigned when the batch was committed.
    pub sequence: SequenceNumber,
    /// Operations in the order they were issued.
    pub ops: Vec<Operation>,
}

/// Outcome of decoding the bytes at one journal offset.
#[derive(Debug)]
pub enum Decoded {
    /// A complete frame spanning `len` bytes.
    Frame {
        /// The decoded batch.
        batch: Batch,
        /// Total frame length including header and checksum.
        len: usize,
    },
    /// The remaining bytes end mid-frame.
    Torn,
}

/// Fails with [`CoreError::TooLarge`] if `field` cannot be journaled.
pub fn check_field(field: &[u8]) -> CoreResult<()> {
    if field.len() > MAX_FIELD_LEN {
        return Err(CoreError::TooLarge {
            len: field.len(),
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

fn put_field(buf: &mut Vec<u8>, field: &[u8]) -> CoreResult<()> {
    check_field(field)?;
    let len = field.len() as u32;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(field);
    Ok(())
}

/// Encodes one batch as a complete frame.
///
/// # Errors
///
/// Returns [`CoreError::TooLarge`] if a key, a value or the whole payload
/// exceeds `u32::MAX` bytes. Nothing has been written at that point.
pub fn encode_frame(sequence: SequenceNumber, ops: &[Operation]) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(12 + ops.iter().map(|op| op.payload_len() + 9).sum::<usize>());
    payload.extend_from_slice(&sequence.as_u64().to_le_bytes());
    let count = u32::try_from(ops.len()).map_err(|_| CoreError::TooLarge {
        len: ops.len(),
        max: MAX_FIELD_LEN,
    })?;
    payload.extend_from_slice(&count.to_le_bytes());

    for op in ops {
        match op {
            Operation::Insert { key, value } => {
                payload.push(TAG_INSERT);
                put_field(&mut payload, key)?;
                put_field(&mut payload, value)?;
            }
            Operation::Erase { key } => {
                payload.push(TAG_ERASE);
                put_field(&mut payload, key)?;
            }
        }
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    let len = u32::try_from(payload.len()).map_err(|_| CoreError::TooLarge {
        len: payload.len(),
        max: MAX_FIELD_LEN,
    })?;
    frame.extend_from_slice(&len.to_le_bytes());
    let header_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&header_crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

struct PayloadReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> PayloadReader<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| CoreError::journal_corruption(self.offset, "unexpected end of payload"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn field(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn decode_payload(payload: &[u8], offset: u64) -> CoreResult<Batch> {
    let mut reader = PayloadReader {
        bytes: payload,
        pos: 0,
        offset,
    };
    let sequence = SequenceNumber::new(reader.u64()?);
    let count = reader.u32()?;

    let mut ops = Vec::new();
    for _ in 0..count {
        let op = match reader.u8()? {
            TAG_INSERT => Operation::Insert {
                key: reader.field()?,
                value: reader.field()?,
            },
            TAG_ERASE => Operation::Erase {
                key: reader.field()?,
            },
            tag => {
                return Err(CoreError::journal_corruption(
                    offset,
                    format!("unknown operation tag {tag}"),
                ))
            }
        };
        ops.push(op);
    }

    if reader.pos != payload.len() {
        return Err(CoreError::journal_corruption(
            offset,
            format!(
                "{} trailing bytes after {count} operations",
                payload.len() - reader.pos
            ),
        ));
    }

    Ok(Batch { sequence, ops })
}

/// Decodes the frame starting at the beginning of `bytes`.
///
/// `offset` is the position of `bytes` in the journal and is only used in
/// error reports.
///
/// `Torn` is only returned for bytes that can be a prefix of a frame: a
/// partial header that starts like one, or a header that passes its own
/// checksum but declares more bytes than remain. A damaged length field
/// therefore fails the header checksum instead of hiding the frames after it.
///
/// # Errors
///
/// Returns [`CoreError::JournalCorruption`] or [`CoreError::ChecksumMismatch`]
/// if the bytes cannot be the start of a valid frame.
pub fn decode_frame(bytes: &[u8], offset: u64) -> CoreResult<Decoded> {
    let magic_len = bytes.len().min(JOURNAL_MAGIC.len());
    if bytes[..magic_len] != JOURNAL_MAGIC[..magic_len] {
        return Err(CoreError::journal_corruption(offset, "bad frame magic"));
    }
    if bytes.len() < FRAME_HEADER_SIZE {
        return Ok(Decoded::Torn);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != JOURNAL_VERSION {
        return Err(CoreError::journal_corruption(
            offset,
            format!("unsupported frame version {version}"),
        ));
    }
    let header_expected = read_u32(bytes, HEADER_BODY_SIZE);
    let header_actual = crc32fast::hash(&bytes[..HEADER_BODY_SIZE]);
    if header_expected != header_actual {
        return Err(CoreError::ChecksumMismatch {
            offset,
            expected: header_expected,
            actual: header_actual,
        });
    }
    let payload_len = read_u32(bytes, 6) as usize;
    let total = FRAME_HEADER_SIZE + payload_len + CRC_SIZE;
    if bytes.len() < total {
        return Ok(Decoded::Torn);
    }

    let crc_at = FRAME_HEADER_SIZE + payload_len;
    let expected = read_u32(bytes, crc_at);
    let actual = crc32fast::hash(&bytes[..crc_at]);
    if expected != actual {
        return Err(CoreError::ChecksumMismatch {
            offset,
            expected,
            actual,
        });
    }

    let batch = decode_payload(&bytes[FRAME_HEADER_SIZE..crc_at], offset)?;
    Ok(Decoded::Frame { batch, len: total })
}
