//! Mount lifecycle for the single process-wide volume.
//!
//! The volume is the one shared mutable resource in the adapter. It is
//! mounted lazily on the first operation that needs storage, invalidated
//! whenever a disk-level fault is observed (the card was pulled), and
//! mounted fresh on the next request. One mutex guards the state so the
//! lazy-mount check is atomic with the use of the volume.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Errno, FsResult};
use crate::fat::{FatCard, FatError, FatResult};

/// States: unmounted (initial) -> mounted -> unmounted (on fault) -> ...
pub struct MountManager<C: FatCard> {
    card: C,
    volume: Mutex<Option<C::Volume>>,
}

impl<C: FatCard> MountManager<C> {
    pub fn new(card: C) -> Self {
        Self {
            card,
            volume: Mutex::new(None),
        }
    }

    /// The underlying medium.
    pub fn card(&self) -> &C {
        &self.card
    }

    fn lock_volume(&self) -> MutexGuard<'_, Option<C::Volume>> {
        // A callback that panicked mid-operation must not wedge every
        // later request; the slot content is still a coherent Option.
        self.volume.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_mounted(&self) -> bool {
        self.lock_volume().is_some()
    }

    /// Run `op` against the live volume, mounting first if necessary.
    ///
    /// A disk-level fault reported by `op` invalidates the mount so the
    /// next request starts from a fresh mount attempt.
    pub fn with_volume<T>(&self, op: impl FnOnce(&C::Volume) -> FatResult<T>) -> FsResult<T> {
        let mut slot = self.lock_volume();

        if slot.is_none() {
            log::debug!("volume unmounted, mounting");
            match self.card.mount(false) {
                Ok(volume) => *slot = Some(volume),
                Err(err) => {
                    log::warn!("mount failed: {err}");
                    return Err(err.into());
                }
            }
        }

        let Some(volume) = slot.as_ref() else {
            return Err(Errno::ENODEV);
        };

        match op(volume) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_disk_fault() {
                    log::warn!("disk fault, invalidating volume for remount: {err}");
                    *slot = None;
                }
                Err(err.into())
            }
        }
    }

    /// Run `op` only if a volume is already live. Operations that
    /// historically skip the lazy-mount check surface the library's
    /// no-work-area result when unmounted.
    pub fn with_mounted_volume<T>(
        &self,
        op: impl FnOnce(&C::Volume) -> FatResult<T>,
    ) -> FsResult<T> {
        let mut slot = self.lock_volume();

        let Some(volume) = slot.as_ref() else {
            return Err(FatError::NotEnabled.into());
        };

        match op(volume) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_disk_fault() {
                    log::warn!("disk fault, invalidating volume for remount: {err}");
                    *slot = None;
                }
                Err(err.into())
            }
        }
    }

    /// The lazy-mount check every storage-touching entry point performs
    /// first.
    pub fn ensure_mounted(&self) -> FsResult<()> {
        self.with_volume(|_| Ok(()))
    }

    /// Forget the live volume; the next request mounts fresh.
    pub fn invalidate(&self) {
        *self.lock_volume() = None;
    }

    /// Invalidate if `err` is a disk-level fault observed outside
    /// `with_volume` (session cursors and file handles talk to the
    /// library directly).
    pub fn fault_on_disk_error(&self, err: &FatError) {
        if err.is_disk_fault() {
            log::warn!("disk fault on open handle, invalidating volume: {err}");
            self.invalidate();
        }
    }

    /// Drop the live volume and unregister the work area.
    pub fn shutdown(&self) -> FsResult<()> {
        let had_volume = self.lock_volume().take().is_some();
        if had_volume {
            self.card.unmount().map_err(Errno::from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::{FatVolume, MemoryCard};

    #[test]
    fn test_lazy_mount_on_first_use() {
        let manager = MountManager::new(MemoryCard::new());
        assert!(!manager.is_mounted());

        manager
            .with_volume(|v| v.make_dir("/docs"))
            .expect("mkdir through lazy mount");
        assert!(manager.is_mounted());
    }

    #[test]
    fn test_mount_failure_leaves_unmounted() {
        let card = MemoryCard::new();
        card.eject();
        let manager = MountManager::new(card);

        let err = manager.with_volume(|v| v.make_dir("/docs")).unwrap_err();
        assert_eq!(err, Errno::EINTR);
        assert!(!manager.is_mounted());
    }

    #[test]
    fn test_disk_fault_invalidates_and_next_use_remounts() {
        let manager = MountManager::new(MemoryCard::new());
        manager.ensure_mounted().expect("initial mount");

        manager.card().fail_next(FatError::DiskError);
        let err = manager.with_volume(|v| v.stat("/anything")).unwrap_err();
        assert_eq!(err, Errno::EINTR);
        assert!(!manager.is_mounted());

        // Next use mounts a fresh volume.
        manager
            .with_volume(|v| v.make_dir("/after"))
            .expect("remount after fault");
        assert!(manager.is_mounted());
    }

    #[test]
    fn test_non_fault_error_keeps_mount() {
        let manager = MountManager::new(MemoryCard::new());
        let err = manager.with_volume(|v| v.stat("/missing")).unwrap_err();
        assert_eq!(err, Errno::ENOENT);
        assert!(manager.is_mounted());
    }

    #[test]
    fn test_unmounted_volume_access_reports_not_enabled() {
        let manager = MountManager::new(MemoryCard::new());
        let err = manager
            .with_mounted_volume(|v| v.unlink("/file"))
            .unwrap_err();
        assert_eq!(err, Errno::ENOSPC);
    }

    #[test]
    fn test_shutdown_unmounts() {
        let manager = MountManager::new(MemoryCard::new());
        manager.ensure_mounted().expect("mount");
        manager.shutdown().expect("shutdown");
        assert!(!manager.is_mounted());
    }
}
