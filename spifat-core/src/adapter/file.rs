//! Per-open-file session.

use crate::fat::{FatError, FatFile, FatResult, OpenMode};

/// State of one open file handle: the library handle plus the access
/// mode it was opened with. Read/write go through seek-then-transfer and
/// are checked against the mode, matching what the library itself would
/// enforce on the medium.
pub struct FileSession<F: FatFile> {
    file: F,
    mode: OpenMode,
}

impl<F: FatFile> FileSession<F> {
    pub fn new(file: F, mode: OpenMode) -> Self {
        Self { file, mode }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Seek to `offset` and read up to `buf.len()` bytes. Short reads at
    /// end of file are normal.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FatResult<usize> {
        if !self.mode.contains(OpenMode::READ) {
            return Err(FatError::Denied);
        }
        if let Err(err) = self.file.seek(offset) {
            log::warn!("seek to {offset} failed: {err}");
            return Err(err);
        }
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(err) => {
                log::warn!("read failed: {err}");
                Err(err)
            }
        }
    }

    /// Seek to `offset` and write `data`, returning the bytes written.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> FatResult<usize> {
        if !self.mode.contains(OpenMode::WRITE) {
            return Err(FatError::Denied);
        }
        if let Err(err) = self.file.seek(offset) {
            log::warn!("seek to {offset} failed: {err}");
            return Err(err);
        }
        match self.file.write(data) {
            Ok(n) => Ok(n),
            Err(err) => {
                log::warn!("write failed: {err}");
                Err(err)
            }
        }
    }

    pub fn sync(&mut self) -> FatResult<()> {
        self.file.sync()
    }

    pub fn close(&mut self) -> FatResult<()> {
        self.file.close()
    }
}
