//! Telemetry2 payload header and chunk list.
//!
//! ```text
//! 0        magic | hdr_size | total_size | abi | tstamp (u64)
//! hdr_size chunk { id u32, size u32, body... }   size includes the 8-byte header
//!          chunk { ... }
//!          size == 0 terminates the list
//! ```

use tracing::trace;

pub const TELEMETRY2_MAGIC: u32 = 0x1ED1_5EED;
pub const PAYLOAD_HEADER_SIZE: usize = 24;
pub const CHUNK_HEADER_SIZE: usize = 8;
pub const CHUNK_ID_THREAD_INFO: u32 = 1;

#[inline]
pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Telemetry2Error {
    #[error("telemetry2 slot has bad magic {magic:#010x}")]
    NotReady { magic: u32 },

    #[error("telemetry2 slot of {len} bytes is truncated")]
    Truncated { len: usize },

    #[error("telemetry2 header size {hdr_size} outside payload of {total} bytes")]
    BadHeaderSize { hdr_size: u32, total: usize },

    #[error("chunk at {offset} (id {id}, size {size}) runs past {end}")]
    ChunkOutOfBounds {
        offset: usize,
        id: u32,
        size: u32,
        end: usize,
    },

    #[error("core {core} data at chunk offset {offset} is out of bounds")]
    CoreOutOfBounds { core: usize, offset: usize },
}

impl Telemetry2Error {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Telemetry2Error::NotReady { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub magic: u32,
    pub hdr_size: u32,
    pub total_size: u32,
    pub abi: u32,
    pub tstamp: u64,
}

impl PayloadHeader {
    pub fn parse(slot: &[u8]) -> Result<Self, Telemetry2Error> {
        let truncated = || Telemetry2Error::Truncated { len: slot.len() };
        let magic = read_u32_le(slot, 0).ok_or_else(truncated)?;
        if magic != TELEMETRY2_MAGIC {
            return Err(Telemetry2Error::NotReady { magic });
        }
        let lo = read_u32_le(slot, 16).ok_or_else(truncated)?;
        let hi = read_u32_le(slot, 20).ok_or_else(truncated)?;
        Ok(Self {
            magic,
            hdr_size: read_u32_le(slot, 4).ok_or_else(truncated)?,
            total_size: read_u32_le(slot, 8).ok_or_else(truncated)?,
            abi: read_u32_le(slot, 12).ok_or_else(truncated)?,
            tstamp: u64::from(hi) << 32 | u64::from(lo),
        })
    }

    /// End of valid payload bytes within a snapshot of `slot_len` bytes.
    pub fn payload_end(&self, slot_len: usize) -> usize {
        (self.total_size as usize).min(slot_len)
    }
}

/// One registered chunk. `bytes` starts with the chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub id: u32,
    pub offset: usize,
    pub bytes: &'a [u8],
}

/// Walks the chunk list. Yields at most one error, after which it is fused.
pub fn chunks<'a>(
    slot: &'a [u8],
    hdr: &PayloadHeader,
) -> Result<Chunks<'a>, Telemetry2Error> {
    let end = hdr.payload_end(slot.len());
    let start = hdr.hdr_size as usize;
    if start < PAYLOAD_HEADER_SIZE || start > end {
        return Err(Telemetry2Error::BadHeaderSize {
            hdr_size: hdr.hdr_size,
            total: end,
        });
    }
    Ok(Chunks {
        slot,
        pos: start,
        end,
        done: false,
    })
}

pub struct Chunks<'a> {
    slot: &'a [u8],
    pos: usize,
    end: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>, Telemetry2Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos + CHUNK_HEADER_SIZE > self.end {
            return None;
        }
        let offset = self.pos;
        let (Some(id), Some(size)) = (
            read_u32_le(self.slot, offset),
            read_u32_le(self.slot, offset + 4),
        ) else {
            self.done = true;
            return None;
        };
        if size == 0 {
            trace!(offset, "end of chunk list");
            self.done = true;
            return None;
        }

        let chunk_end = offset.checked_add(size as usize);
        match chunk_end {
            Some(chunk_end) if size as usize >= CHUNK_HEADER_SIZE && chunk_end <= self.end => {
                self.pos = chunk_end;
                Some(Ok(Chunk {
                    id,
                    offset,
                    bytes: &self.slot[offset..chunk_end],
                }))
            }
            _ => {
                self.done = true;
                Some(Err(Telemetry2Error::ChunkOutOfBounds {
                    offset,
                    id,
                    size,
                    end: self.end,
                }))
            }
        }
    }
}
