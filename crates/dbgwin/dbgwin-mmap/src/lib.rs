//! Slot sources: where fresh copies of a debug window slot come from.
//!
//! - [`FileSlot`]: a debugfs-style file that the kernel driver refreshes;
//!   every snapshot rereads it from offset 0.
//! - [`WindowSlot`]: the debug window mapped straight from a device memory
//!   file, copied out word by word with volatile reads.

mod slot;
mod window;

pub use slot::{FileSlot, SlotSource, SourceError};
pub use window::{
    DEBUG_STREAM_SLOT_TYPE, SlotSelector, TELEMETRY_SLOT_TYPE, WINDOW_MAX_SLOTS, WindowSlot,
};

use memmap2::{Mmap, MmapMut};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
}

pub struct MmapFile {
    _file: File,
    mmap: Mmap,
}

impl MmapFileMut {
    /// Create a new file of `size_bytes` and map it read-write
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        // SAFETY: the file was just created by us; nothing else maps it yet.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Mapped bytes, for producers writing a slot image.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Flush outstanding writes so file readers see them
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl MmapFile {
    /// Open an existing file and map it read-only
    pub fn open_ro<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;

        // SAFETY: the mapping is only ever read through volatile loads; the
        // contents may change underneath us and are validated after copying.
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Return raw pointer to start of memory mapped file data
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}
