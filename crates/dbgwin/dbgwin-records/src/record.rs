#![forbid(unsafe_code)]

// Every multi-byte field on the wire is a little-endian u32 word.
pub const WORD_SIZE: usize = 4;

/// Words taken by `id`, `seqno` and `size_words`.
pub const RECORD_HEADER_WORDS: u32 = 3;
pub const RECORD_HEADER_SIZE: usize = RECORD_HEADER_WORDS as usize * WORD_SIZE;

/// Type tags above this are treated as garbage memory, not as new record types.
pub const MAX_RECORD_ID: u32 = 100;

/// Record type tag, decoded from the first header word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Uninitialized,
    ThreadInfo,
    Unknown(u32),
}

impl From<u32> for RecordKind {
    fn from(id: u32) -> Self {
        match id {
            0 => RecordKind::Uninitialized,
            1 => RecordKind::ThreadInfo,
            other => RecordKind::Unknown(other),
        }
    }
}

impl From<RecordKind> for u32 {
    fn from(kind: RecordKind) -> u32 {
        match kind {
            RecordKind::Uninitialized => 0,
            RecordKind::ThreadInfo => 1,
            RecordKind::Unknown(id) => id,
        }
    }
}

/// Fixed header in front of every debug-stream record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordHeader {
    pub id: u32,
    pub seqno: u32,
    /// Total record length in words, header and trailing back-link included.
    pub size_words: u32,
}

impl RecordHeader {
    pub fn from_le_bytes(raw: &[u8; RECORD_HEADER_SIZE]) -> Self {
        let word = |i: usize| {
            u32::from_le_bytes([raw[i * 4], raw[i * 4 + 1], raw[i * 4 + 2], raw[i * 4 + 3]])
        };
        Self {
            id: word(0),
            seqno: word(1),
            size_words: word(2),
        }
    }

    pub fn to_le_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..8].copy_from_slice(&self.seqno.to_le_bytes());
        out[8..12].copy_from_slice(&self.size_words.to_le_bytes());
        out
    }

    #[inline]
    pub fn kind(&self) -> RecordKind {
        RecordKind::from(self.id)
    }

    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.size_words as usize * WORD_SIZE
    }
}

/// A record copied out of a ring, header included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    header: RecordHeader,
    bytes: Vec<u8>,
}

impl Record {
    /// Wraps bytes that were copied out for `header`.
    ///
    /// Returns `None` when the byte count disagrees with the declared size.
    pub fn new(header: RecordHeader, bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() != header.size_bytes() || bytes.len() < RECORD_HEADER_SIZE {
            return None;
        }
        Some(Self { header, bytes })
    }

    #[inline]
    pub fn header(&self) -> RecordHeader {
        self.header
    }

    #[inline]
    pub fn seqno(&self) -> u32 {
        self.header.seqno
    }

    /// Bytes after the fixed header, including the trailing back-link word.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[RECORD_HEADER_SIZE..]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
