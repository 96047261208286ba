//! In-memory FAT card for tests and the demo CLI.
//!
//! Behaves like the real library at the trait surface: FAT result codes,
//! create-new failing on existing files, packed timestamps stamped on
//! creation and modification, directory cursors that can step backwards.
//! On top of that it supports the physical failure modes the adapter must
//! survive: ejection (`eject`/`insert`) and one-shot fault injection
//! (`fail_next`).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    EntryInfo, FatAttributes, FatCard, FatDir, FatError, FatFile, FatResult, FatVolume, OpenMode,
};

/// Default creation timestamp: 2020-01-01 00:00:00.
const DEFAULT_FATTIME: u32 = ((40 << 9) | (1 << 5) | 1) << 16;

#[derive(Debug, Clone)]
struct FileNode {
    data: Vec<u8>,
    fdate: u16,
    ftime: u16,
}

#[derive(Debug, Clone)]
struct DirNode {
    entries: BTreeMap<String, Node>,
    fdate: u16,
    ftime: u16,
}

#[derive(Debug, Clone)]
enum Node {
    Dir(DirNode),
    File(FileNode),
}

#[derive(Debug)]
struct CardState {
    inserted: bool,
    /// Bumped on every re-insertion; handles from an earlier generation
    /// observe disk errors, forcing a remount.
    generation: u64,
    fail_next: Option<FatError>,
    /// Packed timestamp stamped onto created and modified nodes.
    fattime: u32,
    root: DirNode,
}

impl CardState {
    fn stamp(&self) -> (u16, u16) {
        ((self.fattime >> 16) as u16, (self.fattime & 0xffff) as u16)
    }

    fn dir_at_mut(&mut self, components: &[String]) -> FatResult<&mut DirNode> {
        let mut dir = &mut self.root;
        for comp in components {
            match dir.entries.get_mut(comp) {
                Some(Node::Dir(next)) => dir = next,
                _ => return Err(FatError::NoPath),
            }
        }
        Ok(dir)
    }

    fn dir_at(&self, components: &[String]) -> FatResult<&DirNode> {
        let mut dir = &self.root;
        for comp in components {
            match dir.entries.get(comp) {
                Some(Node::Dir(next)) => dir = next,
                _ => return Err(FatError::NoPath),
            }
        }
        Ok(dir)
    }
}

fn components(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split into (parent components, leaf). The root has no leaf.
fn parent_and_leaf(path: &str) -> FatResult<(Vec<String>, String)> {
    let mut comps = components(path);
    match comps.pop() {
        Some(leaf) => Ok((comps, leaf)),
        None => Err(FatError::InvalidName),
    }
}

fn entry_info(name: &str, node: &Node) -> EntryInfo {
    match node {
        Node::Dir(dir) => EntryInfo {
            name: name.to_string(),
            attr: FatAttributes::DIRECTORY,
            size: 0,
            fdate: dir.fdate,
            ftime: dir.ftime,
        },
        Node::File(file) => EntryInfo {
            name: name.to_string(),
            attr: FatAttributes::ARCHIVE,
            size: file.data.len() as u64,
            fdate: file.fdate,
            ftime: file.ftime,
        },
    }
}

/// An ejectable in-memory FAT medium.
#[derive(Clone)]
pub struct MemoryCard {
    state: Arc<Mutex<CardState>>,
}

impl MemoryCard {
    pub fn new() -> Self {
        let (fdate, ftime) = ((DEFAULT_FATTIME >> 16) as u16, DEFAULT_FATTIME as u16);
        Self {
            state: Arc::new(Mutex::new(CardState {
                inserted: true,
                generation: 0,
                fail_next: None,
                fattime: DEFAULT_FATTIME,
                root: DirNode {
                    entries: BTreeMap::new(),
                    fdate,
                    ftime,
                },
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pull the card. Every library call fails with a disk error until
    /// `insert`.
    pub fn eject(&self) {
        self.lock().inserted = false;
    }

    /// Push the card back in. Handles and volumes from before the
    /// ejection keep failing; a fresh mount is required.
    pub fn insert(&self) {
        let mut state = self.lock();
        state.inserted = true;
        state.generation += 1;
    }

    /// Fail the next library call with `err`, once.
    pub fn fail_next(&self, err: FatError) {
        self.lock().fail_next = Some(err);
    }

    /// Set the packed timestamp stamped onto created/modified nodes (the
    /// fake's version of the library's wall-clock hook).
    pub fn set_fattime(&self, packed: u32) {
        self.lock().fattime = packed;
    }

    /// Seed a directory straight onto the medium, creating parents.
    pub fn seed_dir(&self, path: &str) -> FatResult<()> {
        let mut state = self.lock();
        let (fdate, ftime) = state.stamp();
        let comps = components(path);
        let mut dir = &mut state.root;
        for comp in comps {
            dir = match dir.entries.entry(comp).or_insert_with(|| {
                Node::Dir(DirNode {
                    entries: BTreeMap::new(),
                    fdate,
                    ftime,
                })
            }) {
                Node::Dir(next) => next,
                Node::File(_) => return Err(FatError::Exists),
            };
        }
        Ok(())
    }

    /// Seed a file straight onto the medium, creating parents.
    pub fn seed_file(&self, path: &str, data: impl Into<Vec<u8>>) -> FatResult<()> {
        let (parent, leaf) = parent_and_leaf(path)?;
        if !parent.is_empty() {
            let joined = parent.join("/");
            self.seed_dir(&joined)?;
        }
        let mut state = self.lock();
        let (fdate, ftime) = state.stamp();
        let dir = state.dir_at_mut(&parent)?;
        dir.entries.insert(
            leaf,
            Node::File(FileNode {
                data: data.into(),
                fdate,
                ftime,
            }),
        );
        Ok(())
    }

    /// Whether an entry exists at the exact stored path (no mangling).
    pub fn exists(&self, path: &str) -> bool {
        let state = self.lock();
        let (parent, leaf) = match parent_and_leaf(path) {
            Ok(v) => v,
            Err(_) => return true, // the root
        };
        state
            .dir_at(&parent)
            .map(|dir| dir.entries.contains_key(&leaf))
            .unwrap_or(false)
    }

    /// Raw contents of a stored file, if present.
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        let (parent, leaf) = parent_and_leaf(path).ok()?;
        match state.dir_at(&parent).ok()?.entries.get(&leaf) {
            Some(Node::File(file)) => Some(file.data.clone()),
            _ => None,
        }
    }
}

impl Default for MemoryCard {
    fn default() -> Self {
        Self::new()
    }
}

/// Check injected faults and card presence before serving a call.
fn guard(state: &Arc<Mutex<CardState>>, generation: u64) -> FatResult<MutexGuard<'_, CardState>> {
    let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(err) = st.fail_next.take() {
        return Err(err);
    }
    if !st.inserted || st.generation != generation {
        return Err(FatError::DiskError);
    }
    Ok(st)
}

impl FatCard for MemoryCard {
    type Volume = MemoryVolume;

    fn mount(&self, _force: bool) -> FatResult<Self::Volume> {
        let mut state = self.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        if !state.inserted {
            return Err(FatError::NotReady);
        }
        Ok(MemoryVolume {
            state: Arc::clone(&self.state),
            generation: state.generation,
        })
    }

    fn unmount(&self) -> FatResult<()> {
        Ok(())
    }
}

/// A mounted view of a `MemoryCard`.
#[derive(Debug)]
pub struct MemoryVolume {
    state: Arc<Mutex<CardState>>,
    generation: u64,
}

impl FatVolume for MemoryVolume {
    type Dir = MemoryDir;
    type File = MemoryFile;

    fn stat(&self, path: &str) -> FatResult<EntryInfo> {
        let state = guard(&self.state, self.generation)?;
        let (parent, leaf) = parent_and_leaf(path)?;
        let dir = state.dir_at(&parent)?;
        match dir.entries.get(&leaf) {
            Some(node) => Ok(entry_info(&leaf, node)),
            None => Err(FatError::NoFile),
        }
    }

    fn open_dir(&self, path: &str) -> FatResult<Self::Dir> {
        let state = guard(&self.state, self.generation)?;
        let dir = state.dir_at(&components(path))?;
        let entries = dir
            .entries
            .iter()
            .map(|(name, node)| entry_info(name, node))
            .collect();
        Ok(MemoryDir {
            state: Arc::clone(&self.state),
            generation: self.generation,
            entries,
            pos: 0,
        })
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> FatResult<Self::File> {
        let mut state = guard(&self.state, self.generation)?;
        let (fdate, ftime) = state.stamp();
        let (parent, leaf) = parent_and_leaf(path)?;
        let dir = state.dir_at_mut(&parent)?;

        match dir.entries.get_mut(&leaf) {
            Some(Node::File(file)) => {
                if mode.contains(OpenMode::CREATE_NEW) {
                    return Err(FatError::Exists);
                }
                if mode.contains(OpenMode::CREATE_ALWAYS) {
                    file.data.clear();
                    file.fdate = fdate;
                    file.ftime = ftime;
                }
            }
            Some(Node::Dir(_)) => return Err(FatError::NoFile),
            None => {
                let creates = mode
                    .intersects(OpenMode::CREATE_NEW | OpenMode::CREATE_ALWAYS | OpenMode::OPEN_ALWAYS);
                if !creates {
                    return Err(FatError::NoFile);
                }
                dir.entries.insert(
                    leaf.clone(),
                    Node::File(FileNode {
                        data: Vec::new(),
                        fdate,
                        ftime,
                    }),
                );
            }
        }

        let mut location = parent;
        location.push(leaf);
        Ok(MemoryFile {
            state: Arc::clone(&self.state),
            generation: self.generation,
            location,
            pos: 0,
        })
    }

    fn unlink(&self, path: &str) -> FatResult<()> {
        let mut state = guard(&self.state, self.generation)?;
        let (parent, leaf) = parent_and_leaf(path)?;
        let dir = state.dir_at_mut(&parent)?;
        match dir.entries.get(&leaf) {
            Some(Node::Dir(sub)) if !sub.entries.is_empty() => return Err(FatError::Denied),
            Some(_) => {}
            None => return Err(FatError::NoFile),
        }
        dir.entries.remove(&leaf);
        Ok(())
    }

    fn make_dir(&self, path: &str) -> FatResult<()> {
        let mut state = guard(&self.state, self.generation)?;
        let (fdate, ftime) = state.stamp();
        let (parent, leaf) = parent_and_leaf(path)?;
        let dir = state.dir_at_mut(&parent)?;
        if dir.entries.contains_key(&leaf) {
            return Err(FatError::Exists);
        }
        dir.entries.insert(
            leaf,
            Node::Dir(DirNode {
                entries: BTreeMap::new(),
                fdate,
                ftime,
            }),
        );
        Ok(())
    }

    fn remove_dir(&self, path: &str) -> FatResult<()> {
        let mut state = guard(&self.state, self.generation)?;
        let (parent, leaf) = parent_and_leaf(path)?;
        let dir = state.dir_at_mut(&parent)?;
        match dir.entries.get(&leaf) {
            Some(Node::Dir(sub)) if !sub.entries.is_empty() => return Err(FatError::Denied),
            Some(Node::Dir(_)) => {}
            Some(Node::File(_)) | None => return Err(FatError::NoFile),
        }
        dir.entries.remove(&leaf);
        Ok(())
    }

    fn set_times(&self, path: &str, fdate: u16, ftime: u16) -> FatResult<()> {
        let mut state = guard(&self.state, self.generation)?;
        let (parent, leaf) = parent_and_leaf(path)?;
        let dir = state.dir_at_mut(&parent)?;
        match dir.entries.get_mut(&leaf) {
            Some(Node::Dir(sub)) => {
                sub.fdate = fdate;
                sub.ftime = ftime;
                Ok(())
            }
            Some(Node::File(file)) => {
                file.fdate = fdate;
                file.ftime = ftime;
                Ok(())
            }
            None => Err(FatError::NoFile),
        }
    }
}

/// Directory cursor over a listing snapshot, stepping forwards and
/// backwards by exact entry counts.
pub struct MemoryDir {
    state: Arc<Mutex<CardState>>,
    generation: u64,
    entries: Vec<EntryInfo>,
    pos: usize,
}

impl FatDir for MemoryDir {
    fn read_next(&mut self) -> FatResult<Option<EntryInfo>> {
        let _state = guard(&self.state, self.generation)?;
        match self.entries.get(self.pos) {
            Some(entry) => {
                self.pos += 1;
                Ok(Some(entry.clone()))
            }
            None => Ok(None),
        }
    }

    fn seek_relative(&mut self, offset: i64) -> FatResult<()> {
        let _state = guard(&self.state, self.generation)?;
        let target = self.pos as i64 + offset;
        if target < 0 || target > self.entries.len() as i64 {
            return Err(FatError::InvalidObject);
        }
        self.pos = target as usize;
        Ok(())
    }

    fn close(&mut self) -> FatResult<()> {
        Ok(())
    }
}

/// File handle addressing its node by stored location.
#[derive(Debug)]
pub struct MemoryFile {
    state: Arc<Mutex<CardState>>,
    generation: u64,
    location: Vec<String>,
    pos: u64,
}

impl MemoryFile {
    fn with_node<T>(
        &self,
        op: impl FnOnce(&mut FileNode, (u16, u16)) -> FatResult<T>,
    ) -> FatResult<T> {
        let mut state = guard(&self.state, self.generation)?;
        let stamp = state.stamp();
        let (parent, leaf) = match self.location.split_last() {
            Some((leaf, parent)) => (parent.to_vec(), leaf.clone()),
            None => return Err(FatError::InvalidObject),
        };
        let dir = state.dir_at_mut(&parent)?;
        match dir.entries.get_mut(&leaf) {
            Some(Node::File(file)) => op(file, stamp),
            // Unlinked (or replaced by a directory) while open.
            _ => Err(FatError::InvalidObject),
        }
    }
}

impl FatFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> FatResult<usize> {
        let pos = self.pos;
        let n = self.with_node(|file, _| {
            let len = file.data.len() as u64;
            if pos >= len {
                return Ok(0);
            }
            let available = (len - pos) as usize;
            let n = buf.len().min(available);
            let start = pos as usize;
            buf[..n].copy_from_slice(&file.data[start..start + n]);
            Ok(n)
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> FatResult<usize> {
        let pos = self.pos;
        let n = self.with_node(|file, (fdate, ftime)| {
            let end = pos as usize + buf.len();
            if file.data.len() < end {
                file.data.resize(end, 0);
            }
            file.data[pos as usize..end].copy_from_slice(buf);
            file.fdate = fdate;
            file.ftime = ftime;
            Ok(buf.len())
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> FatResult<()> {
        let _state = guard(&self.state, self.generation)?;
        self.pos = pos;
        Ok(())
    }

    fn sync(&mut self) -> FatResult<()> {
        let _state = guard(&self.state, self.generation)?;
        Ok(())
    }

    fn close(&mut self) -> FatResult<()> {
        Ok(())
    }
}
