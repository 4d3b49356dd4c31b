use dbgwin_records::{CpuInfo, Record, RecordKind, fixed_point_percent};
use dbgwin_stream::RecordSink;
use dbgwin_telemetry2::CoreSnapshot;
use std::io::Write;
use tracing::{debug, info, warn};

/// Prints decoded debug-stream records, dispatching on the record id.
pub struct RecordPrinter<W: Write> {
    out: W,
}

impl<W: Write> RecordPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print_thread_info(&mut self, core_id: u32, record: &Record) -> std::io::Result<()> {
        let cpu = match CpuInfo::parse(record.payload()) {
            Ok(cpu) => cpu,
            Err(err) => {
                info!(core = core_id, seqno = record.seqno(), %err, "thread info parse failed");
                return Ok(());
            }
        };
        writeln!(
            self.out,
            "CPU {}: Load: {:.1}% {} threads (seqno {})",
            core_id,
            fixed_point_percent(cpu.load),
            cpu.threads.len(),
            record.seqno()
        )?;
        for t in &cpu.threads {
            write_thread_line(&mut self.out, &t.name, t.stack_usage, t.cpu_load)?;
        }
        Ok(())
    }
}

impl<W: Write> RecordSink for RecordPrinter<W> {
    fn on_record(&mut self, core_id: u32, record: &Record) {
        let hdr = record.header();
        debug!(core = core_id, id = hdr.id, seqno = hdr.seqno, size = hdr.size_words, "record");
        let res = match hdr.kind() {
            RecordKind::ThreadInfo => self.print_thread_info(core_id, record),
            RecordKind::Uninitialized | RecordKind::Unknown(_) => {
                warn!(core = core_id, id = hdr.id, "unsupported record type");
                Ok(())
            }
        };
        if let Err(err) = res.and_then(|_| self.out.flush()) {
            warn!(%err, "failed to write record");
        }
    }
}

/// Prints telemetry2 per-core thread tables.
pub struct ThreadInfoPrinter<W: Write> {
    out: W,
}

impl<W: Write> ThreadInfoPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn print_core(&mut self, snap: &CoreSnapshot) -> std::io::Result<()> {
        writeln!(
            self.out,
            "CPU {}: Load: {:.1}% {} threads (counter {})",
            snap.core,
            fixed_point_percent(snap.load),
            snap.threads.len(),
            snap.counter
        )?;
        for t in &snap.threads {
            write_thread_line(&mut self.out, &t.name, t.stack_usage, t.cpu_usage)?;
        }
        self.out.flush()
    }
}

fn write_thread_line<W: Write>(out: &mut W, name: &str, stack: u8, load: u8) -> std::io::Result<()> {
    writeln!(
        out,
        "    {:<20} stack {:.1}%\tload {:.1}%",
        name,
        fixed_point_percent(stack),
        fixed_point_percent(load)
    )
}
