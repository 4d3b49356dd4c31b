//! Polling loops and output for the debug window tools.
//!
//! A [`Runner`] owns the slot source and a [`Session`]; each step copies a
//! fresh slot snapshot and hands it to the session, which decodes and
//! prints whatever is new.

mod printer;
mod runner;
mod session;

pub use printer::{RecordPrinter, ThreadInfoPrinter};
pub use runner::{EngineError, Runner, SLOT_SIZE, Step, open_source};
pub use session::{DebugStreamSession, Session, ThreadInfoSession, Tick};
