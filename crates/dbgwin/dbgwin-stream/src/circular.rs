//! Per-core circular buffer decoder.
//!
//! The producer appends variable-length records to a ring of `buf_words`
//! words and publishes its write cursor (`w_ptr`) and the next sequence
//! number in the circular buffer header. There is no lock: the host copies
//! the whole slot and validates what it copied.
//!
//! # Consistency Checks
//!
//! - Header sanity: type tag at most [`MAX_RECORD_ID`], `size_words` below
//!   the ring capacity.
//! - Sequence: every record must carry `prev_seqno + 1`. A mismatch means
//!   the producer lapped or raced the copy (torn read).
//! - Desync: more than `error_threshold` consecutive failures means the
//!   cursor is lost; the owner re-attaches at the live write position.
//!
//! # Wraparound
//!
//! A record (or just its header) that runs past the ring end is copied in
//! two pieces:
//!
//! ```text
//! size1 = (capacity - pos) * WORD_SIZE     tail:  [pos, capacity)
//! size2 = total_size - size1               head:  [0, size2)
//! ```

use crate::sink::RecordSink;
use crate::slot_layout::{CircularBufHeader, SectionDescriptor, read_u32_le};
use dbgwin_records::{
    MAX_RECORD_ID, RECORD_HEADER_SIZE, RECORD_HEADER_WORDS, Record, RecordHeader, WORD_SIZE,
};
use tracing::{debug, info, trace, warn};

/// Consecutive decode errors tolerated before a ring is considered desynced.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;

/// Read position and consistency state of one ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Ring word where the next record is expected.
    pub prev_w_ptr: u32,
    /// Sequence number of the last decoded record, `None` before the first.
    pub prev_seqno: Option<u32>,
    /// Consecutive failed fetches since the last good record.
    pub error_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// `size_words == 0`: nothing written here yet.
    #[error("empty record at {pos}")]
    Empty { pos: u32 },

    #[error("broken record header at {pos}")]
    Invalid { pos: u32 },

    #[error("record seqno mismatch {found} != {expected}, pos {pos}")]
    SeqnoMismatch { pos: u32, expected: u32, found: u32 },
}

/// Result of one [`RingDecoder::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Write pointer unchanged since the last poll.
    Idle,
    /// Write pointer moved and `n` records were decoded.
    Advanced(usize),
    /// Write pointer moved but the next record could not be fetched.
    Stalled,
}

impl PollOutcome {
    /// True when nothing was decoded and the poll loop may sleep.
    pub fn is_quiet(&self) -> bool {
        !matches!(self, PollOutcome::Advanced(_))
    }
}

/// Decoder for exactly one producer ring.
#[derive(Debug, Clone)]
pub struct RingDecoder {
    desc: SectionDescriptor,
    error_threshold: u32,
    pub(crate) cursor: Cursor,
}

impl RingDecoder {
    /// Creates an unattached decoder for `desc`.
    ///
    /// The descriptor must already have passed [`SectionDescriptor::fits`].
    pub fn new(desc: SectionDescriptor, error_threshold: u32) -> Self {
        debug!(
            core = desc.core_id,
            offset = desc.offset,
            buf_words = desc.buf_words,
            "ring decoder created"
        );
        Self {
            desc,
            error_threshold,
            cursor: Cursor::default(),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &SectionDescriptor {
        &self.desc
    }

    #[inline]
    pub fn core_id(&self) -> u32 {
        self.desc.core_id
    }

    #[inline]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.desc.buf_words
    }

    /// Reads the live producer state for this ring.
    pub fn circular_header(&self, slot: &[u8]) -> Option<CircularBufHeader> {
        CircularBufHeader::read(slot, &self.desc)
    }

    /// Reads the ring word at `pos` (taken modulo capacity).
    pub(crate) fn read_word(&self, slot: &[u8], pos: u32) -> Option<u32> {
        let pos = pos % self.desc.buf_words;
        read_u32_le(slot, self.desc.data_offset() + pos as usize * WORD_SIZE)
    }

    /// Copies `total` bytes starting at ring word `pos`, splitting the copy
    /// at the ring end.
    fn copy_wrapped(&self, slot: &[u8], pos: u32, total: usize) -> Option<Vec<u8>> {
        let cap = self.desc.buf_words;
        if pos >= cap || total > cap as usize * WORD_SIZE {
            return None;
        }
        let base = self.desc.data_offset();
        let start = base + pos as usize * WORD_SIZE;
        let size1 = (cap - pos) as usize * WORD_SIZE;

        let mut out = Vec::with_capacity(total);
        if total > size1 {
            let size2 = total - size1;
            trace!(pos, total, cap, size1, "wrapped copy");
            out.extend_from_slice(slot.get(start..start + size1)?);
            out.extend_from_slice(slot.get(base..base + size2)?);
        } else {
            out.extend_from_slice(slot.get(start..start + total)?);
        }
        Some(out)
    }

    /// Reads the record header at ring word `pos`, reassembling it when it
    /// straddles the wrap boundary.
    ///
    /// Returns `None` for an out-of-range position or a header that fails
    /// the sanity checks. `size_words == 0` is returned as-is.
    pub fn get_record_header(&self, slot: &[u8], pos: u32) -> Option<RecordHeader> {
        if pos >= self.desc.buf_words {
            warn!(core = self.desc.core_id, pos, "bad position");
            return None;
        }
        let raw = self.copy_wrapped(slot, pos, RECORD_HEADER_SIZE)?;
        let raw: &[u8; RECORD_HEADER_SIZE] = raw.as_slice().try_into().ok()?;
        let hdr = RecordHeader::from_le_bytes(raw);
        if hdr.id > MAX_RECORD_ID || hdr.size_words >= self.desc.buf_words {
            info!(
                core = self.desc.core_id,
                id = hdr.id,
                seqno = hdr.seqno,
                size = hdr.size_words,
                "broken record"
            );
            return None;
        }
        Some(hdr)
    }

    /// Reads the full record at ring word `pos`.
    ///
    /// When `expected_seqno` is given, a record with another sequence number
    /// is rejected and counted as a decode error. A good record clears the
    /// error count.
    pub fn get_record(
        &mut self,
        slot: &[u8],
        pos: u32,
        expected_seqno: Option<u32>,
    ) -> Result<Record, FetchError> {
        let hdr = self
            .get_record_header(slot, pos)
            .ok_or(FetchError::Invalid { pos })?;
        if hdr.size_words == 0 {
            return Err(FetchError::Empty { pos });
        }
        if hdr.size_words < RECORD_HEADER_WORDS {
            return Err(FetchError::Invalid { pos });
        }
        trace!(pos, id = hdr.id, seqno = hdr.seqno, size = hdr.size_words, "got header");

        if let Some(expected) = expected_seqno
            && hdr.seqno != expected
        {
            warn!(
                core = self.desc.core_id,
                found = hdr.seqno,
                expected,
                pos,
                size = hdr.size_words,
                "record seqno mismatch"
            );
            self.cursor.error_count += 1;
            return Err(FetchError::SeqnoMismatch {
                pos,
                expected,
                found: hdr.seqno,
            });
        }

        let bytes = self
            .copy_wrapped(slot, pos, hdr.size_bytes())
            .ok_or(FetchError::Invalid { pos })?;
        let record = Record::new(hdr, bytes).ok_or(FetchError::Invalid { pos })?;
        debug!(core = self.desc.core_id, seqno = hdr.seqno, "got record");
        self.cursor.error_count = 0;
        Ok(record)
    }

    /// Fetches the record at the cursor and advances past it.
    fn next_record(&mut self, slot: &[u8]) -> Option<Record> {
        let expected = self.cursor.prev_seqno.map(|s| s.wrapping_add(1));
        match self.get_record(slot, self.cursor.prev_w_ptr, expected) {
            Ok(record) => {
                let hdr = record.header();
                self.cursor.prev_w_ptr = (self.cursor.prev_w_ptr + hdr.size_words) % self.capacity();
                self.cursor.prev_seqno = Some(hdr.seqno);
                Some(record)
            }
            // Already counted by get_record.
            Err(FetchError::SeqnoMismatch { .. }) => None,
            Err(err) => {
                self.cursor.error_count += 1;
                info!(
                    core = self.desc.core_id,
                    %err,
                    errors = self.cursor.error_count,
                    "record decoding failed"
                );
                None
            }
        }
    }

    /// Decodes every record between the cursor and the live write pointer.
    ///
    /// Stops early on the first fetch failure; the same position is retried
    /// on the next poll.
    pub fn poll<S: RecordSink + ?Sized>(&mut self, slot: &[u8], sink: &mut S) -> PollOutcome {
        let Some(circ) = self.circular_header(slot) else {
            return PollOutcome::Idle;
        };
        if circ.w_ptr == self.cursor.prev_w_ptr {
            return PollOutcome::Idle;
        }
        if circ.w_ptr >= self.capacity() {
            self.cursor.error_count += 1;
            info!(core = self.desc.core_id, w_ptr = circ.w_ptr, "write pointer out of range");
            return PollOutcome::Stalled;
        }

        // Each step consumes at least one header, so a full lap is the most
        // a consistent snapshot can hold.
        let max_steps = (self.capacity() / RECORD_HEADER_WORDS) as usize + 1;
        let mut decoded = 0usize;
        while self.cursor.prev_w_ptr != circ.w_ptr && decoded < max_steps {
            match self.next_record(slot) {
                Some(record) => {
                    sink.on_record(self.desc.core_id, &record);
                    decoded += 1;
                }
                None => break,
            }
        }

        if decoded == 0 {
            PollOutcome::Stalled
        } else {
            PollOutcome::Advanced(decoded)
        }
    }

    /// True once consecutive errors exceed the threshold.
    pub fn check_error_count(&self) -> bool {
        self.cursor.error_count > self.error_threshold
    }

    /// Drops the cursor and re-attaches at the live write position, skipping
    /// everything the producer wrote in between.
    pub fn attach_at_head(&mut self, slot: &[u8]) {
        self.cursor = Cursor::default();
        if let Some(circ) = self.circular_header(slot)
            && circ.w_ptr < self.capacity()
        {
            self.cursor.prev_w_ptr = circ.w_ptr;
            self.cursor.prev_seqno = circ.next_seqno.checked_sub(1);
        }
        debug!(
            core = self.desc.core_id,
            w_ptr = self.cursor.prev_w_ptr,
            seqno = ?self.cursor.prev_seqno,
            "attached at head"
        );
    }
}
