//! POSIX-like error taxonomy surfaced to the host runtime.

use thiserror::Error;

use crate::fat::FatError;

/// Errors that can surface from an adapter entry point.
///
/// Values are the standard errno numbers; the host callback convention
/// wants them negated, see [`Errno::as_os_code`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    #[error("no such file or directory")]
    ENOENT = 2,

    #[error("interrupted system call")]
    EINTR = 4,

    #[error("out of memory")]
    ENOMEM = 12,

    #[error("permission denied")]
    EACCES = 13,

    #[error("no such device")]
    ENODEV = 19,

    #[error("file table overflow")]
    ENFILE = 23,

    #[error("no space left on device")]
    ENOSPC = 28,

    #[error("file name too long")]
    ENAMETOOLONG = 36,
}

/// Result type for adapter operations.
pub type FsResult<T> = Result<T, Errno>;

impl Errno {
    /// The negative return code the host callback surface expects.
    pub fn as_os_code(self) -> i32 {
        -(self as i32)
    }
}

/// The library-to-POSIX result code mapping.
///
/// Deliberately many-to-one: the "not accessible" family all collapses to
/// EACCES and the transient medium faults to EINTR. Shell tools above the
/// host runtime depend on these exact codes, so the table must not be
/// "improved".
impl From<FatError> for Errno {
    fn from(err: FatError) -> Self {
        match err {
            FatError::DiskError | FatError::NotReady => Errno::EINTR,
            FatError::InternalError => Errno::ENOMEM,
            FatError::Denied
            | FatError::Exists
            | FatError::WriteProtected
            | FatError::InvalidDrive
            | FatError::Timeout
            | FatError::Locked => Errno::EACCES,
            FatError::NotEnabled => Errno::ENOSPC,
            FatError::NoFilesystem | FatError::MkfsAborted => Errno::ENODEV,
            FatError::NotEnoughCore => Errno::ENAMETOOLONG,
            FatError::TooManyOpenFiles => Errno::ENFILE,
            // NoFile, NoPath, InvalidName, InvalidObject and any code this
            // adapter does not recognize.
            _ => Errno::ENOENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_mapping() {
        let table = [
            (FatError::DiskError, Errno::EINTR),
            (FatError::InternalError, Errno::ENOMEM),
            (FatError::NotReady, Errno::EINTR),
            (FatError::NoFile, Errno::ENOENT),
            (FatError::NoPath, Errno::ENOENT),
            (FatError::InvalidName, Errno::ENOENT),
            (FatError::Denied, Errno::EACCES),
            (FatError::Exists, Errno::EACCES),
            (FatError::InvalidObject, Errno::ENOENT),
            (FatError::WriteProtected, Errno::EACCES),
            (FatError::InvalidDrive, Errno::EACCES),
            (FatError::NotEnabled, Errno::ENOSPC),
            (FatError::NoFilesystem, Errno::ENODEV),
            (FatError::MkfsAborted, Errno::ENODEV),
            (FatError::Timeout, Errno::EACCES),
            (FatError::Locked, Errno::EACCES),
            (FatError::NotEnoughCore, Errno::ENAMETOOLONG),
            (FatError::TooManyOpenFiles, Errno::ENFILE),
        ];

        for (fat, errno) in table {
            assert_eq!(Errno::from(fat), errno, "mapping for {fat:?}");
        }
    }

    #[test]
    fn test_os_codes_are_negative() {
        assert_eq!(Errno::ENOENT.as_os_code(), -2);
        assert_eq!(Errno::EINTR.as_os_code(), -4);
        assert_eq!(Errno::ENAMETOOLONG.as_os_code(), -36);
    }
}
