//! Per-tool decoding sessions driven by the [`Runner`](crate::Runner).

use crate::printer::{RecordPrinter, ThreadInfoPrinter};
use dbgwin_mmap::{DEBUG_STREAM_SLOT_TYPE, TELEMETRY_SLOT_TYPE};
use dbgwin_stream::StreamDecoder;
use dbgwin_telemetry2::ThreadInfoDecoder;
use std::io::Write;
use tracing::{debug, info, warn};

/// Result of feeding one snapshot to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The producer has not initialized the slot.
    NotReady,
    /// Nothing new since the previous snapshot.
    Idle,
    /// New data was decoded; poll again without sleeping.
    Busy,
    /// The slot changed shape under us; all decoder state was dropped.
    Lost,
}

pub trait Session {
    /// Debug window slot type used when no slot index is forced.
    fn slot_type(&self) -> u32;

    fn tick(&mut self, slot: &[u8]) -> Tick;

    /// Drops all decoder state, e.g. after the source had to be reopened.
    fn reset(&mut self);
}

pub struct DebugStreamSession<W: Write> {
    decoder: StreamDecoder,
    printer: RecordPrinter<W>,
    attached: bool,
}

impl<W: Write> DebugStreamSession<W> {
    pub fn new(error_threshold: u32, out: W) -> Self {
        Self {
            decoder: StreamDecoder::new(error_threshold),
            printer: RecordPrinter::new(out),
            attached: false,
        }
    }

    pub fn decoder(&self) -> &StreamDecoder {
        &self.decoder
    }

    pub fn printer(&self) -> &RecordPrinter<W> {
        &self.printer
    }
}

impl<W: Write> Session for DebugStreamSession<W> {
    fn slot_type(&self) -> u32 {
        DEBUG_STREAM_SLOT_TYPE
    }

    fn tick(&mut self, slot: &[u8]) -> Tick {
        if !self.attached {
            if let Err(err) = self.decoder.get_descriptors(slot) {
                if err.is_not_ready() {
                    debug!(%err, "debug stream not ready");
                } else {
                    info!(%err, "debug stream slot rejected");
                }
                return Tick::NotReady;
            }
            let replayed = self.decoder.catch_up_all(slot, &mut self.printer);
            info!(rings = self.decoder.rings().len(), replayed, "attached to debug stream");
            self.attached = true;
            return Tick::Busy;
        }

        if !self.decoder.check_slot(slot) {
            info!("debug stream slot changed, re-attaching");
            self.attached = false;
            return Tick::Lost;
        }
        if self.decoder.poll(slot, &mut self.printer) {
            Tick::Idle
        } else {
            Tick::Busy
        }
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.attached = false;
    }
}

pub struct ThreadInfoSession<W: Write> {
    decoder: ThreadInfoDecoder,
    printer: ThreadInfoPrinter<W>,
}

impl<W: Write> ThreadInfoSession<W> {
    pub fn new(out: W) -> Self {
        Self {
            decoder: ThreadInfoDecoder::new(),
            printer: ThreadInfoPrinter::new(out),
        }
    }

    pub fn printer(&self) -> &ThreadInfoPrinter<W> {
        &self.printer
    }
}

impl<W: Write> Session for ThreadInfoSession<W> {
    fn slot_type(&self) -> u32 {
        TELEMETRY_SLOT_TYPE
    }

    fn tick(&mut self, slot: &[u8]) -> Tick {
        let cores = match self.decoder.poll(slot) {
            Ok(cores) => cores,
            Err(err) if err.is_not_ready() => {
                debug!(%err, "telemetry2 not ready");
                self.decoder.reset();
                return Tick::NotReady;
            }
            Err(err) => {
                info!(%err, "telemetry2 slot rejected");
                self.decoder.reset();
                return Tick::Lost;
            }
        };

        for snap in &cores {
            if let Err(err) = self.printer.print_core(snap) {
                warn!(%err, "failed to write thread info");
            }
        }
        // Cores are rewritten in place once per firmware round; there is
        // never a backlog to drain.
        Tick::Idle
    }

    fn reset(&mut self) {
        self.decoder.reset();
    }
}
