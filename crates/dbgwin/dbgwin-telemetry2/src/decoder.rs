use crate::layout::{CHUNK_ID_THREAD_INFO, PayloadHeader, Telemetry2Error, chunks};
use crate::thread_info::{CoreSnapshot, CoreState, parse_thread_info_chunk};
use tracing::{debug, trace};

/// Tracks which per-core thread tables have already been reported.
#[derive(Debug, Default)]
pub struct ThreadInfoDecoder {
    last_counter: Vec<Option<u8>>,
}

impl ThreadInfoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cores that are up to date and were updated since the last
    /// call. A slot without a thread-info chunk yields nothing.
    pub fn poll(&mut self, slot: &[u8]) -> Result<Vec<CoreSnapshot>, Telemetry2Error> {
        let hdr = PayloadHeader::parse(slot)?;
        let mut thread_chunk = None;
        for chunk in chunks(slot, &hdr)? {
            let chunk = chunk?;
            if chunk.id == CHUNK_ID_THREAD_INFO {
                thread_chunk = Some(chunk);
                break;
            }
        }
        let Some(chunk) = thread_chunk else {
            debug!("no thread info chunk yet");
            return Ok(Vec::new());
        };

        let cores = parse_thread_info_chunk(chunk.bytes)?;
        if self.last_counter.len() < cores.len() {
            self.last_counter.resize(cores.len(), None);
        }

        Ok(cores
            .into_iter()
            .filter(|snap| {
                if snap.state != CoreState::UpToDate {
                    trace!(core = snap.core, state = ?snap.state, "core not up to date");
                    return false;
                }
                let last = &mut self.last_counter[snap.core];
                if *last == Some(snap.counter) {
                    return false;
                }
                *last = Some(snap.counter);
                true
            })
            .collect())
    }

    /// Forgets every reported counter.
    pub fn reset(&mut self) {
        self.last_counter.clear();
    }
}
