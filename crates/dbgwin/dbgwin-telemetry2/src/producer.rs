//! Firmware-side writer for telemetry2 slot fixtures.

use crate::layout::{CHUNK_HEADER_SIZE, CHUNK_ID_THREAD_INFO, PAYLOAD_HEADER_SIZE, TELEMETRY2_MAGIC};
use crate::thread_info::{CORE_INFO_SIZE, CoreState, MAX_THREADS, THREAD_ENTRY_SIZE, THREAD_NAME_SIZE};

const SLOT_SIZE: usize = 4096;
const CORE_ALIGN: usize = 64;

#[derive(Clone, Debug)]
pub struct Telemetry2Builder {
    slot: Vec<u8>,
    chunk: usize,
    core_offsets: Vec<usize>,
    end: usize,
}

impl Telemetry2Builder {
    /// Initialized slot with a thread-info chunk for `core_count` cores, all
    /// uninitialized.
    ///
    /// # Panics
    /// Panics if the cores do not fit into the slot.
    pub fn new(core_count: usize) -> Self {
        let mut slot = vec![0u8; SLOT_SIZE];
        put_u32(&mut slot, 0, TELEMETRY2_MAGIC);
        put_u32(&mut slot, 4, PAYLOAD_HEADER_SIZE as u32);
        put_u32(&mut slot, 8, SLOT_SIZE as u32);

        let chunk = PAYLOAD_HEADER_SIZE;
        let mut rel = (CHUNK_HEADER_SIZE + 2 + core_count * 2).next_multiple_of(CORE_ALIGN);
        let mut core_offsets = Vec::with_capacity(core_count);
        for _ in 0..core_count {
            core_offsets.push(rel);
            rel = (rel + CORE_INFO_SIZE).next_multiple_of(CORE_ALIGN);
        }
        let size = core_offsets.last().map_or(CHUNK_HEADER_SIZE + 2, |o| o + CORE_INFO_SIZE);
        assert!(chunk + size + CHUNK_HEADER_SIZE <= SLOT_SIZE, "cores do not fit into the slot");

        put_u32(&mut slot, chunk, CHUNK_ID_THREAD_INFO);
        put_u32(&mut slot, chunk + 4, size as u32);
        put_u16(&mut slot, chunk + CHUNK_HEADER_SIZE, core_count as u16);
        for (i, off) in core_offsets.iter().enumerate() {
            put_u16(&mut slot, chunk + CHUNK_HEADER_SIZE + 2 + i * 2, *off as u16);
        }

        Self {
            slot,
            chunk,
            core_offsets,
            end: chunk + size,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.slot
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.slot
    }

    pub fn set_magic(&mut self, magic: u32) {
        put_u32(&mut self.slot, 0, magic);
    }

    pub fn set_tstamp(&mut self, tstamp: u64) {
        put_u32(&mut self.slot, 16, tstamp as u32);
        put_u32(&mut self.slot, 20, (tstamp >> 32) as u32);
    }

    /// Absolute slot offset of a core's data.
    pub fn core_offset(&self, core: usize) -> usize {
        self.chunk + self.core_offsets[core]
    }

    /// Rewrites one core. Names are cut to the on-slot width; threads
    /// beyond `MAX_THREADS` are dropped.
    pub fn set_core(
        &mut self,
        core: usize,
        state: CoreState,
        counter: u8,
        load: u8,
        threads: &[(&str, u8, u8)],
    ) {
        let base = self.core_offset(core);
        let data = &mut self.slot[base..base + CORE_INFO_SIZE];
        data.fill(0);
        let threads = &threads[..threads.len().min(MAX_THREADS)];
        data[..4].copy_from_slice(&[state.into(), counter, load, threads.len() as u8]);
        for (entry, (name, stack, cpu)) in data[4..].chunks_exact_mut(THREAD_ENTRY_SIZE).zip(threads) {
            let name = &name.as_bytes()[..name.len().min(THREAD_NAME_SIZE)];
            entry[..name.len()].copy_from_slice(name);
            entry[THREAD_NAME_SIZE] = *stack;
            entry[THREAD_NAME_SIZE + 1] = *cpu;
        }
    }

    /// Updates only the state byte, as the firmware does around a rewrite.
    pub fn set_state(&mut self, core: usize, state: CoreState) {
        let at = self.core_offset(core);
        self.slot[at] = state.into();
    }

    /// Registers another chunk after the existing ones and returns its offset.
    ///
    /// # Panics
    /// Panics if the chunk does not fit.
    pub fn append_chunk(&mut self, id: u32, body: &[u8]) -> usize {
        let at = self.end;
        let size = CHUNK_HEADER_SIZE + body.len();
        assert!(at + size + CHUNK_HEADER_SIZE <= SLOT_SIZE, "chunk does not fit");
        put_u32(&mut self.slot, at, id);
        put_u32(&mut self.slot, at + 4, size as u32);
        self.slot[at + CHUNK_HEADER_SIZE..at + size].copy_from_slice(body);
        self.end = at + size;
        at
    }
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
