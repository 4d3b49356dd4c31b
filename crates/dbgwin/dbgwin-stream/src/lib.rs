//! Host-side decoder for the debug-stream slot of a DSP debug window.
//!
//! The firmware keeps one circular buffer per core inside a 4096-byte slot
//! and appends sequence-numbered records to it without any locking. This
//! crate turns fresh copies of that slot into an ordered record stream per
//! core, detecting torn reads through sequence numbers and bounds checks.

mod catch_up;
mod circular;
mod decoder;
pub mod producer;
mod sink;
pub mod slot_layout;

pub use circular::{Cursor, DEFAULT_ERROR_THRESHOLD, FetchError, PollOutcome, RingDecoder};
pub use decoder::StreamDecoder;
pub use sink::RecordSink;
pub use slot_layout::{
    CircularBufHeader, DEBUG_STREAM_MAGIC, SLOT_SIZE, SectionDescriptor, SlotError, SlotHeader,
};
