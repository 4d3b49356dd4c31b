//! Binary layout of a debug-stream slot.
//!
//! All fields are little-endian u32 words read at fixed byte offsets; the
//! slot is never overlaid with a Rust struct.
//!
//! # Slot Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ SlotHeader                                                   │
//! │  magic (4B) │ hdr_size (4B) │ total_size (4B) │ sections (4B)│
//! ├──────────────────────────────────────────────────────────────┤
//! │ SectionDescriptor[0..sections]                               │
//! │  core_id (4B) │ buf_words (4B) │ offset (4B)                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ... at each descriptor's offset:                             │
//! │ CircularBufHeader { next_seqno (4B), w_ptr (4B) }            │
//! │ ring storage: buf_words words of packed records              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use dbgwin_records::{RECORD_HEADER_WORDS, WORD_SIZE};

/// Identifies an initialized debug-stream slot.
pub const DEBUG_STREAM_MAGIC: u32 = 0x1ED1_5EED;

/// Size of one debug window slot.
pub const SLOT_SIZE: usize = 4096;

pub const SLOT_HEADER_SIZE: usize = 16;
pub const SECTION_DESCRIPTOR_SIZE: usize = 12;
pub const CIRCULAR_HEADER_SIZE: usize = 8;

/// Section counts above this are uninitialized memory, not real cores.
pub const MAX_SECTIONS: u32 = 32;
pub const MAX_CORE_ID: u32 = 32;

/// Reads a little-endian u32 at `offset`, or `None` past the end of `buf`.
#[inline]
pub fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("slot of {len} bytes is too short for its header")]
    Truncated { len: usize },

    #[error("slot has bad magic {magic:#010x}")]
    NotReady { magic: u32 },

    #[error("suspiciously many sections {count}")]
    TooManySections { count: u32 },

    #[error("suspicious descriptor {index}: core {core_id} buf_words {buf_words} offset {offset}")]
    BadDescriptor {
        index: usize,
        core_id: u32,
        buf_words: u32,
        offset: u32,
    },
}

impl SlotError {
    /// True for the expected state before the producer has initialized the slot.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, SlotError::NotReady { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    pub magic: u32,
    pub hdr_size: u32,
    pub total_size: u32,
    pub num_sections: u32,
}

impl SlotHeader {
    /// Reads the header and checks the magic.
    pub fn parse(slot: &[u8]) -> Result<Self, SlotError> {
        let truncated = || SlotError::Truncated { len: slot.len() };
        let magic = read_u32_le(slot, 0).ok_or_else(truncated)?;
        if magic != DEBUG_STREAM_MAGIC {
            return Err(SlotError::NotReady { magic });
        }
        Ok(Self {
            magic,
            hdr_size: read_u32_le(slot, 4).ok_or_else(truncated)?,
            total_size: read_u32_le(slot, 8).ok_or_else(truncated)?,
            num_sections: read_u32_le(slot, 12).ok_or_else(truncated)?,
        })
    }
}

/// Location of one producer's ring inside the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub core_id: u32,
    /// Ring capacity in words, excluding the circular buffer header.
    pub buf_words: u32,
    /// Byte offset of the circular buffer header from the slot start.
    pub offset: u32,
}

impl SectionDescriptor {
    /// Byte offset of ring word 0.
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.offset as usize + CIRCULAR_HEADER_SIZE
    }

    /// Checks the ring lies inside a slot of `slot_len` bytes and can hold
    /// at least a record header plus its back-link word.
    pub fn fits(&self, slot_len: usize) -> bool {
        if self.core_id > MAX_CORE_ID || self.buf_words <= RECORD_HEADER_WORDS {
            return false;
        }
        let ring_bytes = self.buf_words as usize * WORD_SIZE;
        self.data_offset()
            .checked_add(ring_bytes)
            .is_some_and(|end| end <= slot_len)
    }
}

/// Live producer state at the start of each ring region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CircularBufHeader {
    /// Sequence number the producer will assign to its next record.
    pub next_seqno: u32,
    /// Producer write cursor in words.
    pub w_ptr: u32,
}

impl CircularBufHeader {
    pub fn read(slot: &[u8], desc: &SectionDescriptor) -> Option<Self> {
        let base = desc.offset as usize;
        Some(Self {
            next_seqno: read_u32_le(slot, base)?,
            w_ptr: read_u32_le(slot, base + 4)?,
        })
    }
}

/// Validates the slot header and returns every section descriptor.
///
/// Any single out-of-bounds descriptor rejects the whole set.
pub fn parse_descriptors(slot: &[u8]) -> Result<Vec<SectionDescriptor>, SlotError> {
    let hdr = SlotHeader::parse(slot)?;
    if hdr.num_sections > MAX_SECTIONS {
        return Err(SlotError::TooManySections {
            count: hdr.num_sections,
        });
    }

    (0..hdr.num_sections as usize)
        .map(|index| {
            let base = SLOT_HEADER_SIZE + index * SECTION_DESCRIPTOR_SIZE;
            let field = |at: usize| {
                read_u32_le(slot, base + at).ok_or(SlotError::Truncated { len: slot.len() })
            };
            let desc = SectionDescriptor {
                core_id: field(0)?,
                buf_words: field(4)?,
                offset: field(8)?,
            };
            if !desc.fits(slot.len()) {
                return Err(SlotError::BadDescriptor {
                    index,
                    core_id: desc.core_id,
                    buf_words: desc.buf_words,
                    offset: desc.offset,
                });
            }
            Ok(desc)
        })
        .collect()
}
