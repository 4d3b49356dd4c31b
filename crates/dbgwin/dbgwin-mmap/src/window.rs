//! Direct access to the debug window.
//!
//! ```text
//! window_offset
//! │
//! ├─ page 0: slot descriptors { resource_id, type, vma } x WINDOW_MAX_SLOTS
//! ├─ page 1: slot 0
//! ├─ page 2: slot 1
//! │  ...
//! └─ page WINDOW_MAX_SLOTS: slot WINDOW_MAX_SLOTS - 1
//! ```
//!
//! The firmware keeps writing while we copy, so every access is a volatile
//! aligned word load and the copy is validated by the decoders afterwards.

use crate::MmapFile;
use crate::slot::{SlotSource, SourceError};
use std::path::Path;
use tracing::{debug, info};

pub const DEBUG_STREAM_SLOT_TYPE: u32 = 0x5352_3134;
pub const TELEMETRY_SLOT_TYPE: u32 = 0x4C45_5500;

pub const WINDOW_MAX_SLOTS: u32 = 15;
const WINDOW_PAGE_SIZE: usize = 4096;
const SLOT_DESCRIPTOR_SIZE: usize = 12;
const SLOT_DESCRIPTOR_TYPE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSelector {
    Index(u32),
    /// First slot whose descriptor carries this type; looked up on every read.
    Type(u32),
}

pub struct WindowSlot {
    map: MmapFile,
    base: usize,
    selector: SlotSelector,
}

impl WindowSlot {
    pub fn open<P: AsRef<Path>>(
        path: P,
        window_offset: u64,
        selector: SlotSelector,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref();
        if window_offset % 4 != 0 {
            return Err(SourceError::Misaligned {
                offset: window_offset,
            });
        }
        if let SlotSelector::Index(index) = selector
            && index >= WINDOW_MAX_SLOTS
        {
            return Err(SourceError::SlotIndexOutOfRange { index });
        }

        let map = MmapFile::open_ro(path).map_err(|e| SourceError::io(path, e))?;
        let base = usize::try_from(window_offset).unwrap_or(usize::MAX);
        let needed = base.saturating_add(WINDOW_PAGE_SIZE);
        if map.len() < needed {
            return Err(SourceError::WindowTooSmall {
                len: map.len(),
                needed,
            });
        }
        info!(path = %path.display(), offset = window_offset, ?selector, "debug window mapped");
        Ok(Self {
            map,
            base,
            selector,
        })
    }

    /// Byte offset of the selected slot relative to the window start.
    pub fn slot_offset(&self) -> Result<usize, SourceError> {
        let index = match self.selector {
            SlotSelector::Index(index) => index,
            SlotSelector::Type(slot_type) => self
                .find_slot(slot_type)
                .ok_or(SourceError::SlotTypeNotFound { slot_type })?,
        };
        Ok((index as usize + 1) * WINDOW_PAGE_SIZE)
    }

    fn find_slot(&self, slot_type: u32) -> Option<u32> {
        let found = (0..WINDOW_MAX_SLOTS).find(|&i| {
            let at = self.base + i as usize * SLOT_DESCRIPTOR_SIZE + SLOT_DESCRIPTOR_TYPE;
            self.load_word(at) == slot_type
        });
        if let Some(index) = found {
            debug!(slot_type, index, "debug window slot found by type");
        }
        found
    }

    /// Caller keeps `at + 4 <= map.len()` and `at` word aligned.
    #[inline]
    fn load_word(&self, at: usize) -> u32 {
        debug_assert!(at % 4 == 0 && at + 4 <= self.map.len());
        // SAFETY: in bounds per the caller contract; the mapping base is page
        // aligned and `at` is a multiple of 4, so the load is aligned. The
        // bytes are shared with the device, hence the volatile read.
        unsafe { self.map.as_ptr().add(at).cast::<u32>().read_volatile() }
    }
}

impl SlotSource for WindowSlot {
    fn read_slot(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        let start = self.base + self.slot_offset()?;
        let needed = start + buf.len().next_multiple_of(4);
        if self.map.len() < needed {
            return Err(SourceError::WindowTooSmall {
                len: self.map.len(),
                needed,
            });
        }

        for (i, chunk) in buf.chunks_mut(4).enumerate() {
            let word = self.load_word(start + i * 4).to_ne_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }
}
