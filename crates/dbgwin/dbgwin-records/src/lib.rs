pub mod record;
pub mod thread_info;

pub use record::{
    MAX_RECORD_ID, RECORD_HEADER_SIZE, RECORD_HEADER_WORDS, Record, RecordHeader, RecordKind,
    WORD_SIZE,
};
pub use thread_info::{CpuInfo, ParseError, ThreadInfo, fixed_point_percent};
