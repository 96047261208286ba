//! POSIX-shaped attribute snapshots synthesized per request.

use crate::fat::EntryInfo;
use crate::timestamp;

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// Mode reported for directories.
pub const DIR_MODE: u32 = S_IFDIR | 0o755;
/// Mode reported for regular files.
pub const REG_MODE: u32 = S_IFREG | 0o644;

/// Inode sentinel for entries without a real inode number. Matches the
/// host runtime's unknown-inode value; the synthetic `.` and `..` entries
/// are dropped in plus mode without it.
pub const UNKNOWN_INO: u64 = 0xffff_ffff;

/// Logical block size used for the block count in listings.
pub const BLOCK_SIZE: u64 = 512;

/// The adapter's POSIX-shaped view of one entry. Synthesized per request,
/// never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttr {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileAttr {
    /// The fixed attribute of the filesystem root.
    pub fn root() -> Self {
        Self::directory()
    }

    /// A plain directory attribute (also used for `.` and `..`).
    pub fn directory() -> Self {
        FileAttr {
            mode: DIR_MODE,
            nlink: 2,
            ..Default::default()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR == S_IFDIR
    }

    /// Attribute as reported by `getattr`: mode, link count and size only.
    pub fn from_stat_info(info: &EntryInfo) -> Self {
        if info.is_dir() {
            FileAttr::directory()
        } else {
            FileAttr {
                mode: REG_MODE,
                nlink: 1,
                size: info.size,
                ..Default::default()
            }
        }
    }

    /// Full attribute for a directory listing: block accounting and the
    /// decoded FAT timestamp are filled in for regular files.
    pub fn from_dir_entry(info: &EntryInfo) -> Self {
        if info.is_dir() {
            return FileAttr::directory();
        }

        let packed = timestamp::join(info.fdate, info.ftime);
        let seconds = timestamp::decode(packed).unix_seconds();

        let mut blocks = info.size / BLOCK_SIZE;
        if info.size % BLOCK_SIZE != 0 {
            blocks += 1;
        }

        FileAttr {
            mode: REG_MODE,
            nlink: 1,
            size: info.size,
            blocks,
            blksize: BLOCK_SIZE as u32,
            atime: seconds,
            mtime: seconds,
            ctime: seconds,
            ..Default::default()
        }
    }
}
