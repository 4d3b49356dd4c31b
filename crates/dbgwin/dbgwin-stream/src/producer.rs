//! Producer-side slot writer.
//!
//! Lays out a debug-stream slot and appends records the way the firmware
//! does: header, payload padded to whole words, and a trailing back-link
//! word holding the record's own `size_words`. Used to build fixtures for
//! tests, benchmarks and replay files; the host tools never write to a
//! live slot.

use crate::slot_layout::{
    CIRCULAR_HEADER_SIZE, CircularBufHeader, DEBUG_STREAM_MAGIC, SECTION_DESCRIPTOR_SIZE,
    SLOT_HEADER_SIZE, SLOT_SIZE, SectionDescriptor,
};
use dbgwin_records::{RECORD_HEADER_WORDS, RecordHeader, WORD_SIZE};

const RING_ALIGN: usize = 64;

/// Owns a slot image and its section table.
#[derive(Clone, Debug)]
pub struct SlotBuilder {
    slot: Vec<u8>,
    descs: Vec<SectionDescriptor>,
}

impl SlotBuilder {
    /// Builds an initialized slot with one ring per entry of `ring_words`.
    /// Core ids follow the entry index.
    ///
    /// # Panics
    /// Panics if the rings do not fit into `SLOT_SIZE`.
    pub fn new(ring_words: &[u32]) -> Self {
        let mut slot = vec![0u8; SLOT_SIZE];
        let mut offset =
            (SLOT_HEADER_SIZE + ring_words.len() * SECTION_DESCRIPTOR_SIZE).next_multiple_of(RING_ALIGN);
        let mut descs = Vec::with_capacity(ring_words.len());
        for (core_id, &buf_words) in ring_words.iter().enumerate() {
            let end = offset + CIRCULAR_HEADER_SIZE + buf_words as usize * WORD_SIZE;
            assert!(end <= SLOT_SIZE, "rings do not fit into the slot");
            descs.push(SectionDescriptor {
                core_id: core_id as u32,
                buf_words,
                offset: offset as u32,
            });
            offset = end.next_multiple_of(RING_ALIGN);
        }

        put_u32(&mut slot, 0, DEBUG_STREAM_MAGIC);
        put_u32(&mut slot, 4, SLOT_HEADER_SIZE as u32);
        put_u32(&mut slot, 8, SLOT_SIZE as u32);
        put_u32(&mut slot, 12, descs.len() as u32);

        let mut builder = Self { slot, descs };
        for i in 0..builder.descs.len() {
            let desc = builder.descs[i];
            builder.set_descriptor(i, desc);
        }
        builder
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.slot
    }

    pub fn descriptor(&self, index: usize) -> SectionDescriptor {
        self.descs[index]
    }

    pub fn set_magic(&mut self, magic: u32) {
        put_u32(&mut self.slot, 0, magic);
    }

    pub fn set_num_sections(&mut self, count: u32) {
        put_u32(&mut self.slot, 12, count);
    }

    /// Overwrites the on-slot descriptor table entry; the builder keeps
    /// writing records to the new location.
    pub fn set_descriptor(&mut self, index: usize, desc: SectionDescriptor) {
        let base = SLOT_HEADER_SIZE + index * SECTION_DESCRIPTOR_SIZE;
        put_u32(&mut self.slot, base, desc.core_id);
        put_u32(&mut self.slot, base + 4, desc.buf_words);
        put_u32(&mut self.slot, base + 8, desc.offset);
        if let Some(d) = self.descs.get_mut(index) {
            *d = desc;
        }
    }

    pub fn ring(&mut self, index: usize) -> RingWriter<'_> {
        RingWriter {
            desc: self.descs[index],
            slot: &mut self.slot,
        }
    }
}

/// Appends records to one ring of a [`SlotBuilder`].
pub struct RingWriter<'a> {
    slot: &'a mut [u8],
    desc: SectionDescriptor,
}

impl RingWriter<'_> {
    pub fn header(&self) -> CircularBufHeader {
        CircularBufHeader::read(&*self.slot, &self.desc).unwrap_or_default()
    }

    /// Moves the producer cursor, e.g. to place records at a wrap boundary.
    pub fn set_header(&mut self, hdr: CircularBufHeader) {
        let base = self.desc.offset as usize;
        put_u32(self.slot, base, hdr.next_seqno);
        put_u32(self.slot, base + 4, hdr.w_ptr);
    }

    /// Writes one ring word; `pos` wraps modulo the ring capacity.
    pub fn write_word(&mut self, pos: u32, value: u32) {
        let pos = pos % self.desc.buf_words;
        put_u32(
            self.slot,
            self.desc.data_offset() + pos as usize * WORD_SIZE,
            value,
        );
    }

    /// Appends a record carrying `payload` and advances the header.
    pub fn push(&mut self, id: u32, payload: &[u8]) -> RecordHeader {
        let size_words = RECORD_HEADER_WORDS + payload.len().div_ceil(WORD_SIZE) as u32 + 1;
        self.push_with_size(id, size_words, payload)
    }

    /// Appends a record of exactly `size_words` words whose payload bytes
    /// are derived from the sequence number.
    ///
    /// # Panics
    /// Panics if `size_words` cannot hold the header and back-link.
    pub fn push_sized(&mut self, id: u32, size_words: u32) -> RecordHeader {
        assert!(size_words > RECORD_HEADER_WORDS, "record too small");
        let seqno = self.header().next_seqno;
        let len = (size_words - RECORD_HEADER_WORDS - 1) as usize * WORD_SIZE;
        let payload: Vec<u8> = (0..len)
            .map(|i| (seqno as usize).wrapping_mul(31).wrapping_add(i) as u8)
            .collect();
        self.push_with_size(id, size_words, &payload)
    }

    fn push_with_size(&mut self, id: u32, size_words: u32, payload: &[u8]) -> RecordHeader {
        let hdr = self.header();
        let rec = RecordHeader {
            id,
            seqno: hdr.next_seqno,
            size_words,
        };

        let mut bytes = rec.to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes.resize((size_words as usize - 1) * WORD_SIZE, 0);
        bytes.extend_from_slice(&size_words.to_le_bytes());

        for (i, w) in bytes.chunks_exact(WORD_SIZE).enumerate() {
            let word = u32::from_le_bytes([w[0], w[1], w[2], w[3]]);
            self.write_word(hdr.w_ptr + i as u32, word);
        }

        self.set_header(CircularBufHeader {
            next_seqno: hdr.next_seqno.wrapping_add(1),
            w_ptr: (hdr.w_ptr + size_words) % self.desc.buf_words,
        });
        rec
    }
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
