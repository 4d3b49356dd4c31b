//! Thread-info chunk (id 1).
//!
//! ```text
//! chunk + 0   id u32 | size u32
//! chunk + 8   core_count u16
//! chunk + 10  core_offset[core_count] u16, relative to the chunk start
//! core_offset[i]:
//!             state u8 | counter u8 | load u8 | thread_count u8
//!             thread[MAX_THREADS] { name[14] | stack_usage u8 | cpu_usage u8 }
//! ```

use crate::layout::{CHUNK_HEADER_SIZE, Telemetry2Error, read_u16_le};
use tracing::trace;

pub const MAX_THREADS: usize = 16;
pub const THREAD_NAME_SIZE: usize = 14;
pub const THREAD_ENTRY_SIZE: usize = THREAD_NAME_SIZE + 2;
pub const CORE_INFO_SIZE: usize = 4 + MAX_THREADS * THREAD_ENTRY_SIZE;

const CORE_COUNT_OFFSET: usize = CHUNK_HEADER_SIZE;
const CORE_OFFSETS: usize = CHUNK_HEADER_SIZE + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Uninitialized,
    /// The firmware is rewriting the thread table right now.
    BeingUpdated,
    UpToDate,
    Unknown(u8),
}

impl From<u8> for CoreState {
    fn from(v: u8) -> Self {
        match v {
            0 => CoreState::Uninitialized,
            1 => CoreState::BeingUpdated,
            2 => CoreState::UpToDate,
            other => CoreState::Unknown(other),
        }
    }
}

impl From<CoreState> for u8 {
    fn from(s: CoreState) -> Self {
        match s {
            CoreState::Uninitialized => 0,
            CoreState::BeingUpdated => 1,
            CoreState::UpToDate => 2,
            CoreState::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEntry {
    pub name: String,
    /// U(0,8) fixed point.
    pub stack_usage: u8,
    /// U(0,8) fixed point.
    pub cpu_usage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSnapshot {
    pub core: usize,
    pub state: CoreState,
    pub counter: u8,
    /// U(0,8) fixed point.
    pub load: u8,
    pub threads: Vec<ThreadEntry>,
}

/// Parses every core of a thread-info chunk. `chunk` starts at the chunk
/// header.
pub fn parse_thread_info_chunk(chunk: &[u8]) -> Result<Vec<CoreSnapshot>, Telemetry2Error> {
    let truncated = || Telemetry2Error::Truncated { len: chunk.len() };
    let core_count = read_u16_le(chunk, CORE_COUNT_OFFSET).ok_or_else(truncated)? as usize;

    (0..core_count)
        .map(|core| {
            let offset = read_u16_le(chunk, CORE_OFFSETS + core * 2).ok_or_else(truncated)? as usize;
            let data = chunk
                .get(offset..offset + CORE_INFO_SIZE)
                .ok_or(Telemetry2Error::CoreOutOfBounds { core, offset })?;
            Ok(parse_core(core, data))
        })
        .collect()
}

fn parse_core(core: usize, data: &[u8]) -> CoreSnapshot {
    let declared = data[3] as usize;
    if declared > MAX_THREADS {
        trace!(core, declared, "thread count clamped");
    }
    let threads = data[4..]
        .chunks_exact(THREAD_ENTRY_SIZE)
        .take(declared.min(MAX_THREADS))
        .map(|entry| {
            let raw = &entry[..THREAD_NAME_SIZE];
            let len = raw.iter().position(|&b| b == 0).unwrap_or(THREAD_NAME_SIZE);
            ThreadEntry {
                name: String::from_utf8_lossy(&raw[..len]).into_owned(),
                stack_usage: entry[THREAD_NAME_SIZE],
                cpu_usage: entry[THREAD_NAME_SIZE + 1],
            }
        })
        .collect();

    CoreSnapshot {
        core,
        state: CoreState::from(data[0]),
        counter: data[1],
        load: data[2],
        threads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{PayloadHeader, chunks};
    use crate::producer::Telemetry2Builder;

    fn thread_chunk(b: &Telemetry2Builder) -> Vec<u8> {
        let hdr = PayloadHeader::parse(b.as_bytes()).unwrap();
        let chunk = chunks(b.as_bytes(), &hdr).unwrap().next().unwrap().unwrap();
        chunk.bytes.to_vec()
    }

    #[test]
    fn parses_cores_and_threads() {
        let mut b = Telemetry2Builder::new(2);
        b.set_core(0, CoreState::UpToDate, 7, 128, &[("idle", 10, 200), ("ll_thread0", 40, 30)]);
        b.set_core(1, CoreState::BeingUpdated, 3, 5, &[]);

        let cores = parse_thread_info_chunk(&thread_chunk(&b)).unwrap();
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0].state, CoreState::UpToDate);
        assert_eq!(cores[0].counter, 7);
        assert_eq!(cores[0].load, 128);
        assert_eq!(cores[0].threads[1].name, "ll_thread0");
        assert_eq!(cores[0].threads[1].stack_usage, 40);
        assert_eq!(cores[1].state, CoreState::BeingUpdated);
        assert!(cores[1].threads.is_empty());
    }

    #[test]
    fn full_width_name_has_no_terminator() {
        let mut b = Telemetry2Builder::new(1);
        b.set_core(0, CoreState::UpToDate, 1, 0, &[("abcdefghijklmnop", 1, 2)]);
        let cores = parse_thread_info_chunk(&thread_chunk(&b)).unwrap();
        assert_eq!(cores[0].threads[0].name, "abcdefghijklmn");
    }

    #[test]
    fn thread_count_is_clamped() {
        let mut b = Telemetry2Builder::new(1);
        b.set_core(0, CoreState::UpToDate, 1, 0, &[("t", 1, 1)]);
        let at = b.core_offset(0) + 3;
        b.as_mut_bytes()[at] = 200;
        let cores = parse_thread_info_chunk(&thread_chunk(&b)).unwrap();
        assert_eq!(cores[0].threads.len(), MAX_THREADS);
    }

    #[test]
    fn core_offset_past_chunk_is_rejected() {
        let b = Telemetry2Builder::new(1);
        let mut chunk = thread_chunk(&b);
        let bad = (chunk.len() - 10) as u16;
        chunk[CORE_OFFSETS..CORE_OFFSETS + 2].copy_from_slice(&bad.to_le_bytes());
        assert!(matches!(
            parse_thread_info_chunk(&chunk),
            Err(Telemetry2Error::CoreOutOfBounds { core: 0, .. })
        ));
    }

    #[test]
    fn truncated_offset_table() {
        let chunk = [1, 0, 0, 0, 10, 0, 0, 0, 4, 0];
        assert!(matches!(
            parse_thread_info_chunk(&chunk),
            Err(Telemetry2Error::Truncated { .. })
        ));
    }

    #[test]
    fn state_round_trips_through_u8() {
        for v in 0..=4u8 {
            assert_eq!(u8::from(CoreState::from(v)), v);
        }
    }
}
