//! FAT-over-SPI filesystem adapter core
//!
//! This crate adapts a FAT volume, reachable only through a narrow
//! low-level filesystem library, to a POSIX-like callback surface:
//! - Mount lifecycle: lazy mount, invalidation on card ejection, remount
//! - Operation translation: getattr, directory enumeration, open/create,
//!   read/write, unlink, mkdir/rmdir, timestamp updates
//! - Result-code mapping into the POSIX error taxonomy
//! - Per-open-handle sessions behind opaque table-indexed ids
//!
//! # Architecture
//!
//! The adapter uses a layered design:
//! - `FatCard`/`FatVolume` traits: the library collaborator surface
//! - `MemoryCard`: in-memory implementation with fault injection
//! - `MountManager`: the single shared volume behind a mutex
//! - `SpiFatFs`: the dispatcher composing the pieces per request

pub mod adapter;
pub mod attr;
pub mod error;
pub mod fat;
pub mod handle;
pub mod manifest;
pub mod mount;
pub mod path;
pub mod timestamp;

pub use adapter::{DirFiller, EntryCollector, HostTuning, OpenFlags, SpiFatFs};
pub use attr::FileAttr;
pub use error::{Errno, FsResult};
pub use fat::{EntryInfo, FatCard, FatError, FatResult, MemoryCard, OpenMode};
pub use manifest::{load_manifest, parse_manifest, seed_card, ManifestError, VolumeManifest};
pub use timestamp::{CalendarTime, Clock, FixedClock, SystemClock};
