//! The adapter dispatcher: one entry point per POSIX-like operation.
//!
//! Every entry point that touches storage first ensures the volume is
//! mounted (mounting lazily if a fault invalidated it), translates the
//! incoming path, performs the library calls, and maps the result codes
//! into the POSIX-like error taxonomy.

mod dir;
mod file;

pub use dir::{DirFiller, DirSession, EntryCollector};
pub use file::FileSession;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use bitflags::bitflags;

use crate::attr::FileAttr;
use crate::error::{Errno, FsResult};
use crate::fat::{FatCard, FatVolume, OpenMode};
use crate::handle::HandleTable;
use crate::mount::MountManager;
use crate::path::to_stored_path;
use crate::timestamp::{self, Clock, SystemClock};

bitflags! {
    /// Host-side open flags of interest to the adapter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpenFlags: u32 {
        /// O_CREAT
        const CREATE = 0o100;
        /// O_ASYNC
        const ASYNC = 0o20000;
    }
}

/// Tuning hints handed back to the host runtime at init: cache entries
/// aggressively, the medium is slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTuning {
    pub auto_cache: bool,
    pub attr_timeout: Duration,
}

const STAT_RETRIES: u32 = 1;
const STAT_RETRY_DELAY: Duration = Duration::from_millis(50);

type DirOf<C> = <<C as FatCard>::Volume as FatVolume>::Dir;
type FileOf<C> = <<C as FatCard>::Volume as FatVolume>::File;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The filesystem adapter over one FAT card.
pub struct SpiFatFs<C: FatCard> {
    mount: MountManager<C>,
    dirs: Mutex<HandleTable<Arc<Mutex<DirSession<DirOf<C>>>>>>,
    files: Mutex<HandleTable<Arc<Mutex<FileSession<FileOf<C>>>>>>,
    clock: Box<dyn Clock>,
}

impl<C: FatCard> SpiFatFs<C> {
    pub fn new(card: C) -> Self {
        Self::with_clock(card, Box::new(SystemClock))
    }

    pub fn with_clock(card: C, clock: Box<dyn Clock>) -> Self {
        Self {
            mount: MountManager::new(card),
            dirs: Mutex::new(HandleTable::new()),
            files: Mutex::new(HandleTable::new()),
            clock,
        }
    }

    /// The underlying medium.
    pub fn card(&self) -> &C {
        self.mount.card()
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_mounted()
    }

    fn dir_session(&self, fh: u64) -> FsResult<Arc<Mutex<DirSession<DirOf<C>>>>> {
        lock(&self.dirs).get(fh).cloned().ok_or(Errno::ENOENT)
    }

    fn file_session(&self, fh: u64) -> FsResult<Arc<Mutex<FileSession<FileOf<C>>>>> {
        lock(&self.files).get(fh).cloned().ok_or(Errno::ENOENT)
    }

    /// Host runtime start-up: reset mount state, hand back tuning hints.
    pub fn init(&self) -> HostTuning {
        log::info!("adapter initialized");
        self.mount.invalidate();
        HostTuning {
            auto_cache: true,
            attr_timeout: Duration::from_secs(3600),
        }
    }

    /// Host runtime shutdown: unregister the work area.
    pub fn destroy(&self) {
        if let Err(err) = self.mount.shutdown() {
            log::warn!("unmount on shutdown failed: {err}");
        }
    }

    /// Attribute lookup. The root never touches the library; everything
    /// else is a stat with one bounded retry for transient medium
    /// hiccups.
    pub fn getattr(&self, path: &str) -> FsResult<FileAttr> {
        log::trace!("getattr: {path}");

        if path == "/" {
            return Ok(FileAttr::root());
        }

        let stored = to_stored_path(path);
        let mut tries = 0;
        loop {
            match self.mount.with_volume(|v| v.stat(&stored)) {
                Ok(info) => return Ok(FileAttr::from_stat_info(&info)),
                Err(errno) => {
                    if tries >= STAT_RETRIES {
                        return Err(errno);
                    }
                    tries += 1;
                    log::warn!("stat {stored} failed ({errno}), retrying");
                    thread::sleep(STAT_RETRY_DELAY);
                }
            }
        }
    }

    pub fn opendir(&self, path: &str) -> FsResult<u64> {
        log::trace!("opendir: {path}");
        let cursor = self.mount.with_volume(|v| v.open_dir(path))?;
        let session = Arc::new(Mutex::new(DirSession::new(cursor)));
        Ok(lock(&self.dirs).insert(session))
    }

    /// Continue a directory listing from `offset`, feeding `filler`
    /// until the directory or the reply buffer is exhausted.
    pub fn readdir(
        &self,
        fh: u64,
        offset: u64,
        plus: bool,
        filler: &mut dyn DirFiller,
    ) -> FsResult<()> {
        log::trace!("readdir: fh {fh}, offset {offset}, plus {plus}");
        self.mount.ensure_mounted()?;

        let session = self.dir_session(fh)?;
        let mut session = lock(&session);
        session.fill(offset, plus, filler).map_err(|err| {
            log::error!("directory read failed: {err}");
            self.mount.fault_on_disk_error(&err);
            err.into()
        })
    }

    pub fn releasedir(&self, fh: u64) -> FsResult<()> {
        log::trace!("releasedir: fh {fh}");
        let Some(session) = lock(&self.dirs).remove(fh) else {
            return Err(Errno::ENOENT);
        };
        let result = lock(&session).close();
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                log::warn!("closedir failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Open a file. Read+write by default; the async flag forces
    /// read-only (preserved historical behavior) and the create flag
    /// forces write+create-new, failing if the target exists.
    pub fn open(&self, path: &str, flags: OpenFlags) -> FsResult<u64> {
        log::trace!("open: {path} (flags {flags:?})");

        let mode = if flags.contains(OpenFlags::ASYNC) {
            OpenMode::READ
        } else if flags.contains(OpenFlags::CREATE) {
            log::trace!("open: create mode");
            OpenMode::WRITE | OpenMode::CREATE_NEW
        } else {
            OpenMode::READ | OpenMode::WRITE
        };

        let stored = to_stored_path(path);
        let file = self.mount.with_volume(|v| v.open_file(&stored, mode))?;
        let session = Arc::new(Mutex::new(FileSession::new(file, mode)));
        Ok(lock(&self.files).insert(session))
    }

    pub fn create(&self, path: &str) -> FsResult<u64> {
        self.open(path, OpenFlags::CREATE)
    }

    pub fn read(&self, fh: u64, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        log::trace!("read: fh {fh}, {} bytes at offset {offset}", buf.len());
        self.mount.ensure_mounted()?;

        let session = self.file_session(fh)?;
        let mut session = lock(&session);
        session.read_at(offset, buf).map_err(|err| {
            self.mount.fault_on_disk_error(&err);
            err.into()
        })
    }

    pub fn write(&self, fh: u64, offset: u64, data: &[u8]) -> FsResult<usize> {
        log::trace!("write: fh {fh}, {} bytes at offset {offset}", data.len());
        self.mount.ensure_mounted()?;

        let session = self.file_session(fh)?;
        let mut session = lock(&session);
        session.write_at(offset, data).map_err(|err| {
            self.mount.fault_on_disk_error(&err);
            err.into()
        })
    }

    /// Flush the handle. The mount check matters even on an open handle:
    /// a card removal may have invalidated the volume underneath it.
    pub fn flush(&self, fh: u64) -> FsResult<()> {
        log::trace!("flush: fh {fh}");
        self.mount.ensure_mounted()?;

        let session = self.file_session(fh)?;
        let mut session = lock(&session);
        session.sync().map_err(|err| {
            self.mount.fault_on_disk_error(&err);
            err.into()
        })
    }

    pub fn release(&self, fh: u64) -> FsResult<()> {
        log::trace!("release: fh {fh}");
        let Some(session) = lock(&self.files).remove(fh) else {
            return Err(Errno::ENOENT);
        };
        let result = lock(&session).close();
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                log::warn!("close failed: {err}");
                Err(err.into())
            }
        }
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        log::trace!("unlink: {path}");
        self.mount.with_mounted_volume(|v| v.unlink(path))
    }

    pub fn mkdir(&self, path: &str) -> FsResult<()> {
        log::trace!("mkdir: {path}");
        self.mount.with_volume(|v| v.make_dir(path))
    }

    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        log::trace!("rmdir: {path}");
        self.mount.with_volume(|v| v.remove_dir(path))
    }

    /// Stamp `path` with the current time. Caller-supplied timestamps
    /// are not honored; only "now" is applied.
    pub fn utimens(&self, path: &str) -> FsResult<()> {
        log::trace!("utimens: {path}");
        let (fdate, ftime) = timestamp::split(timestamp::now_packed(self.clock.as_ref()));
        self.mount
            .with_mounted_volume(|v| v.set_times(path, fdate, ftime))
    }

    /// The medium has no permission model; report success without acting.
    pub fn chmod(&self, _path: &str, _mode: u32) -> FsResult<()> {
        Ok(())
    }

    /// The medium has no ownership model; report success without acting.
    pub fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
        Ok(())
    }

    /// No arbitrary-resize support; report success without acting.
    pub fn truncate(&self, _path: &str, _size: u64) -> FsResult<()> {
        Ok(())
    }

    /// Extended attributes are not stored; accepted and dropped.
    pub fn setxattr(&self, _path: &str, _name: &str, _value: &[u8]) -> FsResult<()> {
        self.mount.ensure_mounted()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::UNKNOWN_INO;
    use crate::fat::MemoryCard;
    use crate::timestamp::{join, CalendarTime, FixedClock};

    fn adapter() -> SpiFatFs<MemoryCard> {
        SpiFatFs::new(MemoryCard::new())
    }

    #[test]
    fn test_getattr_root_without_mounting() {
        let fs = adapter();
        let attr = fs.getattr("/").expect("root attr");
        assert!(attr.is_dir());
        assert_eq!(attr.nlink, 2);
        assert!(!fs.is_mounted());
    }

    #[test]
    fn test_async_flag_forces_read_only() {
        let fs = adapter();
        fs.card().seed_file("/r.txt", b"data".to_vec()).expect("seed");

        let fh = fs.open("/r.txt", OpenFlags::ASYNC).expect("open");
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(fh, 0, &mut buf).expect("read"), 4);
        assert_eq!(fs.write(fh, 0, b"nope").unwrap_err(), Errno::EACCES);
    }

    #[test]
    fn test_create_fails_on_existing_target() {
        let fs = adapter();
        fs.card().seed_file("/a.txt", b"x".to_vec()).expect("seed");
        assert_eq!(fs.create("/a.txt").unwrap_err(), Errno::EACCES);
    }

    #[test]
    fn test_readdir_injects_dot_entries_at_offset_zero() {
        let fs = adapter();
        fs.card().seed_file("/one", b"1".to_vec()).expect("seed");

        let fh = fs.opendir("/").expect("opendir");
        let mut collector = EntryCollector::new();
        fs.readdir(fh, 0, true, &mut collector).expect("readdir");

        assert_eq!(collector.names(), [".", "..", "one"]);
        let (_, dot_attr) = &collector.entries()[0];
        assert_eq!(dot_attr.expect("plus attrs").ino, UNKNOWN_INO);
        fs.releasedir(fh).expect("releasedir");
    }

    #[test]
    fn test_release_is_double_free_safe() {
        let fs = adapter();
        let fh = fs.create("/f").expect("create");
        fs.release(fh).expect("release");
        assert_eq!(fs.release(fh).unwrap_err(), Errno::ENOENT);
        assert_eq!(fs.releasedir(fh).unwrap_err(), Errno::ENOENT);
    }

    #[test]
    fn test_utimens_applies_now_from_clock() {
        let now = CalendarTime {
            year: 2024,
            month: 5,
            day: 6,
            hour: 7,
            minute: 8,
            second: 10,
        };
        let fs = SpiFatFs::with_clock(MemoryCard::new(), Box::new(FixedClock(now)));
        fs.card().seed_file("/t", b"".to_vec()).expect("seed");
        fs.getattr("/t").expect("mount via getattr");

        fs.utimens("/t").expect("utimens");

        let info = fs
            .mount
            .with_volume(|v| v.stat("/t"))
            .expect("stat after utimens");
        let decoded = timestamp::decode(join(info.fdate, info.ftime));
        assert_eq!(decoded, now);
    }

    #[test]
    fn test_unlink_without_mount_surfaces_not_enabled() {
        let fs = adapter();
        fs.card().seed_file("/f", b"".to_vec()).expect("seed");
        // No prior operation has mounted the volume.
        assert_eq!(fs.unlink("/f").unwrap_err(), Errno::ENOSPC);
    }

    #[test]
    fn test_noops_report_success() {
        let fs = adapter();
        fs.chmod("/x", 0o777).expect("chmod");
        fs.chown("/x", 0, 0).expect("chown");
        fs.truncate("/x", 0).expect("truncate");
    }
}
