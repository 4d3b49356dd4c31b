//! Backward walk over record back-links on (re)attach.
//!
//! The last word of every record holds that record's `size_words`, so the
//! word just before any record start tells where the previous record
//! begins:
//!
//! ```text
//!            bpos                         pos (= w_ptr at first)
//!             │                            │
//!   ... ──────┼──────────────────────┬─────┼──── ...
//!             │ id │ seqno │ size │..│bsize│ next record
//!             └──────── bsize words ───────┘
//! ```
//!
//! A step is accepted only if the header found at `bpos` declares exactly
//! `bsize` words and carries the sequence number one below the record after
//! it. The walk is iterative and stops at the first inconsistency, at a
//! record the cursor has already seen, or once a full ring's worth of words
//! has been walked.

use crate::circular::RingDecoder;
use crate::sink::RecordSink;
use dbgwin_records::RECORD_HEADER_WORDS;
use tracing::{debug, info, trace};

/// One record located by the backward walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    pos: u32,
    seqno: u32,
}

impl RingDecoder {
    /// Replays the history still present behind the write pointer, oldest
    /// first, then attaches the cursor at the write pointer.
    ///
    /// Returns the number of records handed to `sink`.
    pub fn catch_up<S: RecordSink + ?Sized>(&mut self, slot: &[u8], sink: &mut S) -> usize {
        let Some(circ) = self.circular_header(slot) else {
            return 0;
        };
        if circ.next_seqno == 0 || circ.w_ptr >= self.capacity() {
            return 0;
        }

        let chain = self.walk_back(slot, circ.w_ptr, circ.next_seqno);
        let mut replayed = 0;
        for link in chain.iter().rev() {
            match self.get_record(slot, link.pos, Some(link.seqno)) {
                Ok(record) => {
                    sink.on_record(self.core_id(), &record);
                    replayed += 1;
                }
                Err(err) => info!(core = self.core_id(), seqno = link.seqno, %err, "broken record"),
            }
        }

        self.cursor.prev_w_ptr = circ.w_ptr;
        self.cursor.prev_seqno = Some(circ.next_seqno - 1);
        debug!(
            core = self.core_id(),
            seqno = circ.next_seqno - 1,
            w_ptr = circ.w_ptr,
            replayed,
            "caught up"
        );
        replayed
    }

    /// Collects records backwards from `pos`, newest first.
    fn walk_back(&self, slot: &[u8], mut pos: u32, mut seqno: u32) -> Vec<Link> {
        let cap = self.capacity();
        let mut chain = Vec::new();
        let mut walked = 0u32;

        loop {
            let Some(wanted) = seqno.checked_sub(1) else {
                break;
            };
            if self.cursor.prev_seqno.is_some_and(|prev| prev >= wanted) {
                break;
            }
            let Some(bsize) = self.read_word(slot, pos + cap - 1) else {
                break;
            };
            if bsize < RECORD_HEADER_WORDS || bsize >= cap || walked + bsize > cap {
                trace!(core = self.core_id(), pos, bsize, "history ends at back-link");
                break;
            }
            let bpos = (pos + cap - bsize) % cap;
            let Some(hdr) = self.get_record_header(slot, bpos) else {
                break;
            };
            if hdr.size_words != bsize || hdr.seqno != wanted {
                trace!(
                    core = self.core_id(),
                    bpos,
                    bsize,
                    size = hdr.size_words,
                    seqno = hdr.seqno,
                    wanted,
                    "history ends at inconsistent record"
                );
                break;
            }

            chain.push(Link { pos: bpos, seqno: wanted });
            walked += bsize;
            pos = bpos;
            seqno = wanted;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use crate::circular::{Cursor, DEFAULT_ERROR_THRESHOLD, RingDecoder};
    use crate::producer::SlotBuilder;
    use crate::slot_layout::parse_descriptors;
    use dbgwin_records::Record;

    fn decoder(slot: &SlotBuilder) -> RingDecoder {
        let descs = parse_descriptors(slot.as_bytes()).unwrap();
        RingDecoder::new(descs[0], DEFAULT_ERROR_THRESHOLD)
    }

    fn seqnos(out: &[(u32, Record)]) -> Vec<u32> {
        out.iter().map(|(_, r)| r.seqno()).collect()
    }

    #[test]
    fn replays_full_history_in_order() {
        let mut slot = SlotBuilder::new(&[128]);
        for size in [4, 7, 5, 9, 4] {
            slot.ring(0).push_sized(1, size);
        }
        let w_ptr = slot.ring(0).header().w_ptr;

        let mut dec = decoder(&slot);
        let mut out = Vec::new();
        assert_eq!(dec.catch_up(slot.as_bytes(), &mut out), 5);
        assert_eq!(seqnos(&out), vec![0, 1, 2, 3, 4]);
        assert_eq!(dec.cursor().prev_seqno, Some(4));
        assert_eq!(dec.cursor().prev_w_ptr, w_ptr);
    }

    #[test]
    fn lapped_ring_replays_only_intact_tail() {
        let mut slot = SlotBuilder::new(&[64]);
        for i in 0..40u32 {
            slot.ring(0).push_sized(1, 4 + i % 5);
        }

        let mut dec = decoder(&slot);
        let mut out = Vec::new();
        let n = dec.catch_up(slot.as_bytes(), &mut out);
        assert!(n > 0);

        let got = seqnos(&out);
        assert_eq!(*got.last().unwrap(), 39);
        for pair in got.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
        let words: u32 = out.iter().map(|(_, r)| r.header().size_words).sum();
        assert!(words <= 64);
    }

    #[test]
    fn broken_back_link_stops_the_walk() {
        let mut slot = SlotBuilder::new(&[128]);
        let mut ends = Vec::new();
        for _ in 0..7 {
            slot.ring(0).push_sized(1, 4);
            ends.push(slot.ring(0).header().w_ptr);
        }
        // Record 3 now claims to be 6 words long in its back-link.
        slot.ring(0).write_word(ends[3] - 1, 6);

        let mut dec = decoder(&slot);
        let mut out = Vec::new();
        assert_eq!(dec.catch_up(slot.as_bytes(), &mut out), 3);
        assert_eq!(seqnos(&out), vec![4, 5, 6]);
        assert_eq!(dec.cursor().prev_seqno, Some(6));
    }

    #[test]
    fn stops_at_already_seen_seqno() {
        let mut slot = SlotBuilder::new(&[128]);
        for _ in 0..7 {
            slot.ring(0).push_sized(1, 5);
        }

        let mut dec = decoder(&slot);
        dec.cursor = Cursor {
            prev_w_ptr: 0,
            prev_seqno: Some(3),
            error_count: 0,
        };
        let mut out = Vec::new();
        dec.catch_up(slot.as_bytes(), &mut out);
        assert_eq!(seqnos(&out), vec![4, 5, 6]);
    }

    #[test]
    fn untouched_ring_has_nothing_to_replay() {
        let slot = SlotBuilder::new(&[64]);
        let mut dec = decoder(&slot);
        let mut out = Vec::new();
        assert_eq!(dec.catch_up(slot.as_bytes(), &mut out), 0);
        assert_eq!(*dec.cursor(), Cursor::default());
    }

    #[test]
    fn self_consistent_garbage_terminates() {
        // Every word says "4": each back-link agrees with a header whose
        // seqno never matches, so the walk must end immediately.
        let mut slot = SlotBuilder::new(&[64]);
        for pos in 0..64 {
            slot.ring(0).write_word(pos, 4);
        }
        slot.ring(0).set_header(crate::slot_layout::CircularBufHeader {
            next_seqno: 6,
            w_ptr: 8,
        });
        let mut dec = decoder(&slot);
        let mut out = Vec::new();
        assert_eq!(dec.catch_up(slot.as_bytes(), &mut out), 0);
        assert_eq!(dec.cursor().prev_seqno, Some(5));
    }
}
