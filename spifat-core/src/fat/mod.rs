//! Collaborator surface of the low-level FAT filesystem library.
//!
//! The adapter never talks to a block device directly; everything goes
//! through these traits:
//! - `FatCard`: the mountable medium (mount/unmount)
//! - `FatVolume`: path-level primitives on a mounted volume
//! - `FatDir` / `FatFile`: open directory cursors and file handles
//!
//! `MemoryCard` provides an in-memory implementation with fault injection
//! for tests and the demo CLI.

mod memory;

pub use memory::{MemoryCard, MemoryDir, MemoryFile, MemoryVolume};

use bitflags::bitflags;
use thiserror::Error;

/// Result type for all library-level calls.
pub type FatResult<T> = Result<T, FatError>;

/// Failure codes reported by the FAT library.
///
/// Marked non-exhaustive: a backend may grow codes this adapter does not
/// know about, and the errno mapping must stay total regardless.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FatError {
    #[error("low-level disk I/O error")]
    DiskError,
    #[error("internal filesystem assertion failed")]
    InternalError,
    #[error("drive not ready")]
    NotReady,
    #[error("file not found")]
    NoFile,
    #[error("path not found")]
    NoPath,
    #[error("path name invalid")]
    InvalidName,
    #[error("access denied")]
    Denied,
    #[error("object already exists")]
    Exists,
    #[error("file or directory object invalid")]
    InvalidObject,
    #[error("medium is write protected")]
    WriteProtected,
    #[error("invalid drive number")]
    InvalidDrive,
    #[error("volume has no work area")]
    NotEnabled,
    #[error("no valid FAT volume found")]
    NoFilesystem,
    #[error("volume format aborted")]
    MkfsAborted,
    #[error("timed out waiting for volume access")]
    Timeout,
    #[error("rejected by the file sharing policy")]
    Locked,
    #[error("not enough memory for the working buffer")]
    NotEnoughCore,
    #[error("too many open objects")]
    TooManyOpenFiles,
}

impl FatError {
    /// Disk-level faults are evidence the medium was removed; the mount
    /// manager invalidates the live volume when one is observed.
    pub fn is_disk_fault(&self) -> bool {
        matches!(self, FatError::DiskError | FatError::NotReady)
    }
}

bitflags! {
    /// On-disk attribute bits of a directory entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FatAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

bitflags! {
    /// Access mode for `FatVolume::open_file`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenMode: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        /// Create the file; fail if it already exists.
        const CREATE_NEW = 0x04;
        /// Create the file; truncate it if it already exists.
        const CREATE_ALWAYS = 0x08;
        /// Open the file if it exists, create it otherwise.
        const OPEN_ALWAYS = 0x10;
    }
}

/// Snapshot of one directory entry as reported by the library.
///
/// Valid only until the cursor advances; callers copy out what they need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Entry name as stored on the medium (no path, no mangling applied).
    pub name: String,
    pub attr: FatAttributes,
    pub size: u64,
    /// Packed FAT date (year-1980:7 | month:4 | day:5).
    pub fdate: u16,
    /// Packed FAT time (hour:5 | minute:6 | seconds/2:5).
    pub ftime: u16,
}

impl EntryInfo {
    pub fn is_dir(&self) -> bool {
        self.attr.contains(FatAttributes::DIRECTORY)
    }
}

/// A mountable FAT medium.
///
/// Mounting may be attempted repeatedly over the lifetime of the adapter:
/// every detected ejection discards the live volume and the next request
/// mounts a fresh one.
pub trait FatCard: Send + Sync {
    type Volume: FatVolume;

    /// Mount the volume. `force` asks the library to access the medium
    /// immediately rather than on first use.
    fn mount(&self, force: bool) -> FatResult<Self::Volume>;

    /// Unregister the work area. The volume handle is gone after this.
    fn unmount(&self) -> FatResult<()>;
}

/// Path-level primitives available on a mounted volume.
pub trait FatVolume: Send {
    type Dir: FatDir;
    type File: FatFile;

    fn stat(&self, path: &str) -> FatResult<EntryInfo>;

    fn open_dir(&self, path: &str) -> FatResult<Self::Dir>;

    fn open_file(&self, path: &str, mode: OpenMode) -> FatResult<Self::File>;

    fn unlink(&self, path: &str) -> FatResult<()>;

    fn make_dir(&self, path: &str) -> FatResult<()>;

    fn remove_dir(&self, path: &str) -> FatResult<()>;

    /// Overwrite the stored timestamp of `path` with the packed pair.
    fn set_times(&self, path: &str, fdate: u16, ftime: u16) -> FatResult<()>;
}

/// An open directory cursor.
pub trait FatDir: Send {
    /// Read the next entry, or `None` at the end of the directory.
    fn read_next(&mut self) -> FatResult<Option<EntryInfo>>;

    /// Step the cursor by a relative number of entries.
    ///
    /// The readdir continuation protocol depends on `seek_relative(-1)`
    /// stepping back exactly one entry. A backend whose native cursor
    /// cannot reverse must emulate this with a one-entry lookahead.
    fn seek_relative(&mut self, offset: i64) -> FatResult<()>;

    fn close(&mut self) -> FatResult<()>;
}

/// An open file handle with an internal position set by `seek`.
pub trait FatFile: Send {
    /// Read up to `buf.len()` bytes from the current position. Short
    /// reads at end of file are not an error.
    fn read(&mut self, buf: &mut [u8]) -> FatResult<usize>;

    /// Write `buf` at the current position, extending the file as needed.
    fn write(&mut self, buf: &[u8]) -> FatResult<usize>;

    /// Move the position to an absolute byte offset.
    fn seek(&mut self, pos: u64) -> FatResult<()>;

    /// Flush cached data of the handle to the medium.
    fn sync(&mut self) -> FatResult<()>;

    fn close(&mut self) -> FatResult<()>;
}
