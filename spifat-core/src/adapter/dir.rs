//! Per-opendir session and the readdir continuation protocol.

use crate::attr::{FileAttr, UNKNOWN_INO};
use crate::fat::{FatDir, FatResult};
use crate::path::to_visible_name;

/// Sink for directory entries, supplied by the host runtime per readdir
/// call.
pub trait DirFiller {
    /// Offer one entry. `attr` is present in plus mode. `next_offset` is
    /// the cookie the host echoes back to resume after this entry.
    ///
    /// Returns `true` when the reply buffer is full and the entry was
    /// NOT accepted.
    fn push(&mut self, name: &str, attr: Option<&FileAttr>, next_offset: u64) -> bool;
}

/// State of one open directory handle: the library cursor plus the
/// synthetic-entry bookkeeping of the continuation protocol.
pub struct DirSession<D: FatDir> {
    cursor: D,
}

impl<D: FatDir> DirSession<D> {
    pub fn new(cursor: D) -> Self {
        Self { cursor }
    }

    pub fn close(&mut self) -> FatResult<()> {
        self.cursor.close()
    }

    /// Drive one readdir call.
    ///
    /// At offset 0 the synthetic `.` and `..` entries are emitted first;
    /// they carry the unknown-inode sentinel (required for them to
    /// register in plus mode) and a rejection by the sink is logged but
    /// never treated as a cursor error. Real entries then stream from
    /// the library cursor with the leaf name made visible. When the sink
    /// reports a full buffer the cursor steps back exactly one entry so
    /// the rejected entry leads the next call.
    pub fn fill(
        &mut self,
        offset: u64,
        plus: bool,
        filler: &mut dyn DirFiller,
    ) -> FatResult<()> {
        let mut next = offset + 1;

        if offset == 0 {
            let dot = FileAttr {
                ino: UNKNOWN_INO,
                ..FileAttr::directory()
            };
            for name in [".", ".."] {
                if filler.push(name, plus.then_some(&dot), next) {
                    log::warn!("failed to inject {name}");
                }
                next += 1;
            }
        }

        loop {
            let Some(entry) = self.cursor.read_next()? else {
                return Ok(());
            };

            let attr = FileAttr::from_dir_entry(&entry);
            let name = to_visible_name(&entry.name);

            if filler.push(&name, plus.then_some(&attr), next) {
                // Reply buffer full: rewind so this entry is re-read as
                // the first entry of the next call.
                if let Err(err) = self.cursor.seek_relative(-1) {
                    log::warn!("seekdir rewind failed: {err}");
                }
                return Ok(());
            }
            next += 1;
        }
    }
}

/// A `DirFiller` that collects entries into memory, optionally stopping
/// at a fixed capacity the way a bounded host reply buffer would.
#[derive(Default)]
pub struct EntryCollector {
    entries: Vec<(String, Option<FileAttr>)>,
    capacity: Option<usize>,
    next_offset: u64,
}

impl EntryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept at most `capacity` entries per fill.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[(String, Option<FileAttr>)] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// The offset cookie to resume from after the last accepted entry.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl DirFiller for EntryCollector {
    fn push(&mut self, name: &str, attr: Option<&FileAttr>, next_offset: u64) -> bool {
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                return true;
            }
        }
        self.entries.push((name.to_string(), attr.copied()));
        self.next_offset = next_offset;
        false
    }
}
