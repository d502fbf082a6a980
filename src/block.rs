//! Data block framing.
//!
//! ```text
//! [record count: varint][payload size: varint][payload: size bytes][sync: 16 bytes]
//! ```
//!
//! The payload is the concatenated record encodings, compressed as one unit
//! by the file's codec.  A block is built completely in memory and handed to
//! the stream with a single `write_all`, so a failed write never leaves the
//! writer's own state inconsistent.

use std::io::Read;

use crate::codec::Codec;
use crate::encoding::{read_long_from, write_long};
use crate::error::{Error, Result};
use crate::header::{eof_as_truncated, SYNC_SIZE};

/// A block as read from the stream: still compressed, sync already checked.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Offset of the block's count varint.
    pub offset:  u64,
    pub count:   u64,
    pub payload: Vec<u8>,
}

impl RawBlock {
    /// Total framed length on disk.
    pub fn framed_len(&self) -> u64 {
        let mut prefix = Vec::with_capacity(20);
        write_long(self.count as i64, &mut prefix);
        write_long(self.payload.len() as i64, &mut prefix);
        (prefix.len() + self.payload.len() + SYNC_SIZE) as u64
    }
}

/// Compress `data` (the encodings of `count` records) and frame it.
pub fn encode_block(
    count: u64,
    data:  &[u8],
    codec: &dyn Codec,
    level: i32,
    sync:  &[u8; SYNC_SIZE],
) -> Result<Vec<u8>> {
    let payload = codec.compress(data, level)?;
    let mut out = Vec::with_capacity(payload.len() + SYNC_SIZE + 20);
    write_long(count as i64, &mut out);
    write_long(payload.len() as i64, &mut out);
    out.extend_from_slice(&payload);
    out.extend_from_slice(sync);
    Ok(out)
}

/// Decompress a block's payload.
pub fn decode_block(block: &RawBlock, codec: &dyn Codec) -> Result<Vec<u8>> {
    Ok(codec.decompress(&block.payload)?)
}

/// Read the next block, advancing `pos` past it.
///
/// Returns `Ok(None)` when the stream ends exactly on a block boundary.
/// A negative count or size, or a trailing sync that differs from `sync`,
/// is `CorruptContainer`; a stream that ends mid-block is `TruncatedData`.
pub fn read_block<R: Read>(reader: &mut R, sync: &[u8; SYNC_SIZE], pos: &mut u64) -> Result<Option<RawBlock>> {
    let offset = *pos;
    let count = match read_long_from(reader, pos)? {
        Some(c) => c,
        None => return Ok(None),
    };
    if count < 0 {
        return Err(Error::CorruptContainer { offset, reason: format!("negative record count {count}") });
    }
    let size_at = *pos;
    let size = read_long_from(reader, pos)?.ok_or(Error::TruncatedData { offset: *pos })?;
    if size < 0 {
        return Err(Error::CorruptContainer { offset: size_at, reason: format!("negative block size {size}") });
    }

    let mut payload = Vec::new();
    let got = reader.by_ref().take(size as u64).read_to_end(&mut payload)? as u64;
    *pos += got;
    if got < size as u64 {
        return Err(Error::TruncatedData { offset: *pos });
    }

    let mut marker = [0u8; SYNC_SIZE];
    reader.read_exact(&mut marker).map_err(|e| eof_as_truncated(e, *pos))?;
    if &marker != sync {
        return Err(Error::CorruptContainer {
            offset: *pos,
            reason: format!("sync marker mismatch: found {}", hex::encode(marker)),
        });
    }
    *pos += SYNC_SIZE as u64;

    Ok(Some(RawBlock { offset, count: count as u64, payload }))
}
