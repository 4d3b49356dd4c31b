//! Debug-stream session: descriptor cache plus one [`RingDecoder`] per core.
//!
//! # Lifecycle
//!
//! 1. [`StreamDecoder::get_descriptors`] on a fresh snapshot builds the ring
//!    decoders. Calling it again with an unchanged section count is a no-op,
//!    so cursors survive re-discovery.
//! 2. [`StreamDecoder::catch_up_all`] replays history once per attach.
//! 3. [`StreamDecoder::poll`] on every new snapshot.
//! 4. [`StreamDecoder::check_slot`] after every snapshot: a bad magic or a
//!    changed section count drops everything; a desynced ring is re-attached
//!    on its own.
//!
//! Cores are independent: a reset of one ring never touches another.

use crate::circular::{DEFAULT_ERROR_THRESHOLD, RingDecoder};
use crate::sink::RecordSink;
use crate::slot_layout::{SectionDescriptor, SlotError, SlotHeader, parse_descriptors};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct StreamDecoder {
    descs: Vec<SectionDescriptor>,
    rings: Vec<RingDecoder>,
    error_threshold: u32,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_THRESHOLD)
    }
}

impl StreamDecoder {
    pub fn new(error_threshold: u32) -> Self {
        Self {
            descs: Vec::new(),
            rings: Vec::new(),
            error_threshold,
        }
    }

    pub fn rings(&self) -> &[RingDecoder] {
        &self.rings
    }

    pub fn descriptors(&self) -> &[SectionDescriptor] {
        &self.descs
    }

    /// Discovers the per-core rings of `slot`.
    ///
    /// Ring decoders are rebuilt only when the section count differs from the
    /// cached one. Returns the number of rings. Any error drops the cached
    /// rings, so the next good slot is always parsed from scratch.
    pub fn get_descriptors(&mut self, slot: &[u8]) -> Result<usize, SlotError> {
        let result = self.discover(slot);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn discover(&mut self, slot: &[u8]) -> Result<usize, SlotError> {
        let hdr = SlotHeader::parse(slot)?;
        if hdr.num_sections as usize == self.descs.len() && !self.descs.is_empty() {
            return Ok(self.descs.len());
        }

        let descs = parse_descriptors(slot)?;
        self.rings = descs
            .iter()
            .map(|desc| RingDecoder::new(*desc, self.error_threshold))
            .collect();
        self.descs = descs;
        info!(
            hdr_size = hdr.hdr_size,
            total_size = hdr.total_size,
            num_sections = hdr.num_sections,
            "debug stream slot discovered"
        );
        Ok(self.descs.len())
    }

    /// Replays history behind every ring's write pointer.
    pub fn catch_up_all<S: RecordSink + ?Sized>(&mut self, slot: &[u8], sink: &mut S) -> usize {
        self.rings
            .iter_mut()
            .map(|ring| ring.catch_up(slot, sink))
            .sum()
    }

    /// Polls all rings. Returns true when nothing was decoded and it is time
    /// to sleep.
    pub fn poll<S: RecordSink + ?Sized>(&mut self, slot: &[u8], sink: &mut S) -> bool {
        let mut quiet = true;
        for ring in &mut self.rings {
            if !ring.poll(slot, sink).is_quiet() {
                quiet = false;
            }
        }
        quiet
    }

    /// Checks a new snapshot against the cached structure.
    ///
    /// Returns false (and forgets every ring) when the slot is no longer
    /// valid. Rings over their error threshold are re-attached at their live
    /// write pointer.
    pub fn check_slot(&mut self, slot: &[u8]) -> bool {
        let valid = match SlotHeader::parse(slot) {
            Ok(hdr) => hdr.num_sections as usize == self.descs.len(),
            Err(err) => {
                debug!(%err, "slot lost");
                false
            }
        };
        if !valid {
            self.reset();
            return false;
        }

        for ring in &mut self.rings {
            if ring.check_error_count() {
                warn!(
                    core = ring.core_id(),
                    errors = ring.cursor().error_count,
                    "ring desynced, re-attaching at write pointer"
                );
                ring.attach_at_head(slot);
            }
        }
        true
    }

    /// Forgets every descriptor and cursor.
    pub fn reset(&mut self) {
        self.descs.clear();
        self.rings.clear();
    }
}
