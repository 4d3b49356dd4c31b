use crate::session::{Session, Tick};
use dbgwin_config::SourceSpec;
use dbgwin_mmap::{FileSlot, SlotSelector, SlotSource, SourceError, WindowSlot};
use std::time::Duration;
use tracing::{info, warn};

pub const SLOT_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("slot source not found")]
    SourceMissing(#[source] SourceError),
}

/// What the loop should do after a [`Runner::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Sleep,
}

/// Opens `source`. Window slots are looked up by `slot_type` unless a slot
/// index is given.
pub fn open_source(source: &SourceSpec, slot_type: u32) -> Result<Box<dyn SlotSource>, SourceError> {
    match source {
        SourceSpec::File(path) => Ok(Box::new(FileSlot::open(path)?)),
        SourceSpec::Window { path, offset, slot } => {
            let selector = slot.map_or(SlotSelector::Type(slot_type), SlotSelector::Index);
            Ok(Box::new(WindowSlot::open(path, *offset, selector)?))
        }
    }
}

/// Polling loop: snapshot the slot, feed the session, sleep when idle.
///
/// The source is reopened after read failures and whenever the session
/// loses the slot. Only a missing source before the first successful open
/// ends the loop; every other error is logged once per distinct message
/// and retried.
pub struct Runner<S, O> {
    session: S,
    open: O,
    source: Option<Box<dyn SlotSource>>,
    slot: Vec<u8>,
    interval: Duration,
    ever_opened: bool,
    last_error: Option<String>,
}

impl<S, O> Runner<S, O>
where
    S: Session,
    O: FnMut() -> Result<Box<dyn SlotSource>, SourceError>,
{
    pub fn new(session: S, interval: Duration, open: O) -> Self {
        Self {
            session,
            open,
            source: None,
            slot: vec![0u8; SLOT_SIZE],
            interval,
            ever_opened: false,
            last_error: None,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn run(&mut self) -> Result<(), EngineError> {
        loop {
            if self.step()? == Step::Sleep {
                std::thread::sleep(self.interval);
            }
        }
    }

    pub fn step(&mut self) -> Result<Step, EngineError> {
        if self.source.is_none() {
            match (self.open)() {
                Ok(source) => {
                    info!("slot source opened");
                    self.ever_opened = true;
                    self.last_error = None;
                    self.source = Some(source);
                }
                Err(err) if err.is_not_found() && !self.ever_opened => {
                    return Err(EngineError::SourceMissing(err));
                }
                Err(err) => {
                    self.report(&err);
                    return Ok(Step::Sleep);
                }
            }
        }

        let Some(source) = self.source.as_mut() else {
            return Ok(Step::Sleep);
        };
        if let Err(err) = source.read_slot(&mut self.slot) {
            self.source = None;
            self.session.reset();
            self.report(&err);
            return Ok(Step::Sleep);
        }

        match self.session.tick(&self.slot) {
            Tick::Busy => Ok(Step::Continue),
            Tick::Idle | Tick::NotReady => Ok(Step::Sleep),
            Tick::Lost => {
                self.source = None;
                Ok(Step::Sleep)
            }
        }
    }

    /// Logs `err` unless it repeats the previous one. Returns true if logged.
    fn report(&mut self, err: &SourceError) -> bool {
        let msg = error_chain(err);
        if self.last_error.as_deref() == Some(msg.as_str()) {
            return false;
        }
        warn!(error = %msg, "slot source failed");
        self.last_error = Some(msg);
        true
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut cur = err.source();
    while let Some(e) = cur {
        msg.push_str(": ");
        msg.push_str(&e.to_string());
        cur = e.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::path::PathBuf;
    use std::rc::Rc;

    /// Session that records every snapshot's first byte and replays scripted ticks.
    #[derive(Default)]
    struct Scripted {
        ticks: VecDeque<Tick>,
        seen: Vec<u8>,
        resets: usize,
    }

    impl Session for Scripted {
        fn slot_type(&self) -> u32 {
            0
        }

        fn tick(&mut self, slot: &[u8]) -> Tick {
            self.seen.push(slot[0]);
            self.ticks.pop_front().unwrap_or(Tick::Idle)
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    /// Source replaying scripted reads; `Err` entries fail with that kind.
    struct ScriptedSource(Rc<RefCell<VecDeque<Result<u8, io::ErrorKind>>>>);

    impl SlotSource for ScriptedSource {
        fn read_slot(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
            match self.0.borrow_mut().pop_front() {
                Some(Ok(b)) => {
                    buf.fill(b);
                    Ok(())
                }
                Some(Err(kind)) => Err(io_err(kind)),
                None => Ok(()),
            }
        }
    }

    fn io_err(kind: io::ErrorKind) -> SourceError {
        SourceError::Io {
            path: PathBuf::from("/slot"),
            source: io::Error::from(kind),
        }
    }

    #[test]
    fn missing_source_before_first_open_is_fatal() {
        let mut runner = Runner::new(Scripted::default(), Duration::ZERO, || {
            Err(io_err(io::ErrorKind::NotFound))
        });
        assert!(matches!(runner.step(), Err(EngineError::SourceMissing(_))));
    }

    #[test]
    fn busy_ticks_skip_the_sleep() {
        let reads = Rc::new(RefCell::new(VecDeque::from([Ok(1), Ok(2), Ok(3)])));
        let session = Scripted {
            ticks: VecDeque::from([Tick::Busy, Tick::Idle, Tick::NotReady]),
            ..Scripted::default()
        };
        let r = Rc::clone(&reads);
        let mut runner = Runner::new(session, Duration::ZERO, move || {
            Ok(Box::new(ScriptedSource(Rc::clone(&r))) as Box<dyn SlotSource>)
        });

        assert_eq!(runner.step().unwrap(), Step::Continue);
        assert_eq!(runner.step().unwrap(), Step::Sleep);
        assert_eq!(runner.step().unwrap(), Step::Sleep);
        assert_eq!(runner.session().seen, vec![1, 2, 3]);
    }

    #[test]
    fn read_failure_reopens_and_resets() {
        let reads = Rc::new(RefCell::new(VecDeque::from([
            Ok(1),
            Err(io::ErrorKind::PermissionDenied),
            Ok(2),
        ])));
        let opens = Rc::new(RefCell::new(0));
        let (r, o) = (Rc::clone(&reads), Rc::clone(&opens));
        let mut runner = Runner::new(Scripted::default(), Duration::ZERO, move || {
            *o.borrow_mut() += 1;
            Ok(Box::new(ScriptedSource(Rc::clone(&r))) as Box<dyn SlotSource>)
        });

        for _ in 0..3 {
            runner.step().unwrap();
        }
        assert_eq!(*opens.borrow(), 2);
        assert_eq!(runner.session().resets, 1);
        assert_eq!(runner.session().seen, vec![1, 2]);
    }

    #[test]
    fn not_found_after_first_open_is_retried() {
        let attempts = Rc::new(RefCell::new(0));
        let a = Rc::clone(&attempts);
        let session = Scripted {
            ticks: VecDeque::from([Tick::Lost]),
            ..Scripted::default()
        };
        let mut runner = Runner::new(session, Duration::ZERO, move || {
            *a.borrow_mut() += 1;
            if *a.borrow() == 1 {
                Ok(Box::new(ScriptedSource(Rc::default())) as Box<dyn SlotSource>)
            } else {
                Err(io_err(io::ErrorKind::NotFound))
            }
        });

        assert_eq!(runner.step().unwrap(), Step::Sleep);
        for _ in 0..3 {
            assert_eq!(runner.step().unwrap(), Step::Sleep);
        }
        assert_eq!(*attempts.borrow(), 4);
        assert_eq!(
            runner.last_error.as_deref(),
            Some("failed to access '/slot': entity not found")
        );
    }

    #[test]
    fn repeated_errors_are_logged_once() {
        let mut runner = Runner::new(Scripted::default(), Duration::ZERO, || {
            Err(io_err(io::ErrorKind::NotFound))
        });
        let denied = io_err(io::ErrorKind::PermissionDenied);
        assert!(runner.report(&denied));
        assert!(!runner.report(&denied));
        assert!(!runner.report(&io_err(io::ErrorKind::PermissionDenied)));
        assert!(runner.report(&io_err(io::ErrorKind::TimedOut)));
        assert!(runner.report(&denied));
    }

    #[test]
    fn error_chain_joins_sources() {
        let err = io_err(io::ErrorKind::PermissionDenied);
        assert_eq!(error_chain(&err), "failed to access '/slot': permission denied");
    }
}
