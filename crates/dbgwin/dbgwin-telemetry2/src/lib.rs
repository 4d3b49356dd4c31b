//! Telemetry2 slot decoding.
//!
//! Unlike the debug stream, telemetry2 is not a ring: the firmware registers
//! chunks once and then rewrites them in place. Consistency comes from a
//! per-core state byte and a counter bumped on every update round.

mod decoder;
pub mod layout;
pub mod producer;
pub mod thread_info;

pub use decoder::ThreadInfoDecoder;
pub use layout::{
    CHUNK_HEADER_SIZE, CHUNK_ID_THREAD_INFO, Chunk, PAYLOAD_HEADER_SIZE, PayloadHeader,
    TELEMETRY2_MAGIC, Telemetry2Error, chunks,
};
pub use thread_info::{
    CORE_INFO_SIZE, CoreSnapshot, CoreState, MAX_THREADS, THREAD_ENTRY_SIZE, ThreadEntry,
    parse_thread_info_chunk,
};
