use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to access '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no debug window slot of type {slot_type:#010x}")]
    SlotTypeNotFound { slot_type: u32 },

    #[error("debug window slot {index} out of range")]
    SlotIndexOutOfRange { index: u32 },

    #[error("debug window of {len} bytes cannot hold {needed} bytes")]
    WindowTooSmall { len: usize, needed: usize },

    #[error("debug window offset {offset:#x} is not word aligned")]
    Misaligned { offset: u64 },
}

impl SourceError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        SourceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the underlying file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Produces fresh copies of a debug window slot.
pub trait SlotSource {
    /// Overwrites `buf` with the current slot contents.
    fn read_slot(&mut self, buf: &mut [u8]) -> Result<(), SourceError>;
}

/// A slot exposed as a regular (typically debugfs) file.
pub struct FileSlot {
    path: PathBuf,
    file: File,
}

impl FileSlot {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
        debug!(path = %path.display(), "slot file opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SlotSource for FileSlot {
    /// Rereads from offset 0; bytes past a short file are zeroed.
    fn read_slot(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| SourceError::io(&self.path, e))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SourceError::io(&self.path, e)),
            }
        }
        buf[filled..].fill(0);
        Ok(())
    }
}
