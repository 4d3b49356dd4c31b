use dbgwin_records::Record;

/// Receives decoded records in per-core sequence order.
pub trait RecordSink {
    fn on_record(&mut self, core_id: u32, record: &Record);
}

/// Collects records; handy for tests and replay tooling.
impl RecordSink for Vec<(u32, Record)> {
    fn on_record(&mut self, core_id: u32, record: &Record) {
        self.push((core_id, record.clone()));
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn on_record(&mut self, core_id: u32, record: &Record) {
        (**self).on_record(core_id, record);
    }
}
