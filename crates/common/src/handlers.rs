//! Transport-independent filesystem request handlers.
//!
//! Each handler loads the current snapshot once on entry and answers the
//! whole request from it. Open files and directories keep the snapshot they
//! were opened against, so a reader never sees two generations mixed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::tree::{DirEntry, Inode, LookupError, NodeType, SnapshotCache, TreeSnapshot, VirtualNode};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("read-only filesystem")]
    ReadOnly,
    #[error("bad file handle {0}")]
    BadHandle(u64),
    #[error("invalid argument")]
    InvalidArgument,
}

impl FsError {
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::ReadOnly => libc::EROFS,
            FsError::BadHandle(_) => libc::EBADF,
            FsError::InvalidArgument => libc::EINVAL,
        }
    }
}

impl From<LookupError> for FsError {
    fn from(error: LookupError) -> Self {
        match error {
            LookupError::NotFound(_) => FsError::NotFound,
            LookupError::NotADirectory(_) => FsError::NotADirectory,
            LookupError::IsADirectory(_) => FsError::IsADirectory,
        }
    }
}

/// Owner reported for every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// Attributes of one node, ready for a transport to translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttr {
    pub ino: Inode,
    pub kind: NodeType,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub mtime: SystemTime,
    pub uid: u32,
    pub gid: u32,
    pub generation: u64,
}

/// Filesystem-wide counters for statfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub files: u64,
    pub content_bytes: u64,
}

struct OpenNode {
    snapshot: Arc<TreeSnapshot>,
    ino: Inode,
}

pub struct FsHandlers {
    cache: Arc<SnapshotCache>,
    owner: Ownership,
    open_files: Mutex<HashMap<u64, OpenNode>>,
    open_dirs: Mutex<HashMap<u64, OpenNode>>,
    next_handle: AtomicU64,
}

impl FsHandlers {
    pub fn new(cache: Arc<SnapshotCache>, owner: Ownership) -> Self {
        Self {
            cache,
            owner,
            open_files: Mutex::new(HashMap::new()),
            open_dirs: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn lookup(&self, parent: Inode, name: &str) -> Result<NodeAttr, FsError> {
        let snapshot = self.cache.current();
        let node = snapshot.lookup(parent, name)?;
        Ok(self.attr(&snapshot, node))
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn getattr(&self, ino: Inode) -> Result<NodeAttr, FsError> {
        let snapshot = self.cache.current();
        let node = snapshot.node(ino).ok_or(FsError::NotFound)?;
        Ok(self.attr(&snapshot, node))
    }

    pub fn getattr_path(&self, path: &str) -> Result<NodeAttr, FsError> {
        let snapshot = self.cache.current();
        let node = snapshot.resolve(path)?;
        Ok(self.attr(&snapshot, node))
    }

    /// Open a directory, pinning the current snapshot for later readdir calls.
    pub fn opendir(&self, ino: Inode) -> Result<u64, FsError> {
        let snapshot = self.cache.current();
        let node = snapshot.node(ino).ok_or(FsError::NotFound)?;
        if !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let fh = self.allocate_handle();
        self.open_dirs.lock().insert(fh, OpenNode { snapshot, ino });
        Ok(fh)
    }

    /// List `.`, `..`, then the children of `ino`. Uses the snapshot pinned
    /// by `fh` when there is one, otherwise the current snapshot.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn readdir(&self, ino: Inode, fh: u64) -> Result<Vec<DirEntry>, FsError> {
        let snapshot = self
            .open_dirs
            .lock()
            .get(&fh)
            .filter(|open| open.ino == ino)
            .map(|open| Arc::clone(&open.snapshot))
            .unwrap_or_else(|| self.cache.current());

        let dir = snapshot.node(ino).ok_or(FsError::NotFound)?;
        let children = snapshot.children(ino)?;

        let mut entries = Vec::with_capacity(children.len() + 2);
        entries.push(DirEntry {
            name: ".".to_string(),
            ino,
            kind: NodeType::Directory,
            size: dir.size(),
        });
        entries.push(DirEntry {
            name: "..".to_string(),
            ino: dir.parent,
            kind: NodeType::Directory,
            size: 0,
        });
        entries.extend(children);
        Ok(entries)
    }

    pub fn releasedir(&self, fh: u64) {
        self.open_dirs.lock().remove(&fh);
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn open(&self, ino: Inode, flags: i32) -> Result<u64, FsError> {
        if is_write_open(flags) {
            return Err(FsError::ReadOnly);
        }
        let snapshot = self.cache.current();
        let node = snapshot.node(ino).ok_or(FsError::NotFound)?;
        if node.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let fh = self.allocate_handle();
        self.open_files.lock().insert(fh, OpenNode { snapshot, ino });
        Ok(fh)
    }

    /// Read from an open file, using the snapshot captured at open.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn read(&self, fh: u64, offset: i64, size: u32) -> Result<Bytes, FsError> {
        let offset = u64::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        let (snapshot, ino) = {
            let open_files = self.open_files.lock();
            let open = open_files.get(&fh).ok_or(FsError::BadHandle(fh))?;
            (Arc::clone(&open.snapshot), open.ino)
        };
        Ok(snapshot.read_content(ino, offset, size as usize)?)
    }

    pub fn release(&self, fh: u64) {
        self.open_files.lock().remove(&fh);
    }

    pub fn access(&self, ino: Inode, mask: i32) -> Result<(), FsError> {
        self.cache.current().node(ino).ok_or(FsError::NotFound)?;
        if mask & libc::W_OK != 0 {
            return Err(FsError::ReadOnly);
        }
        Ok(())
    }

    pub fn statfs(&self) -> FsStats {
        let snapshot = self.cache.current();
        FsStats {
            files: snapshot.node_count() as u64,
            content_bytes: snapshot.content_bytes(),
        }
    }

    /// Reply for every request that would modify the tree.
    pub fn reject_write(&self, operation: &'static str) -> FsError {
        tracing::debug!(operation, "rejecting write request on read-only filesystem");
        FsError::ReadOnly
    }

    pub fn open_handles(&self) -> usize {
        self.open_files.lock().len() + self.open_dirs.lock().len()
    }

    fn allocate_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn attr(&self, snapshot: &TreeSnapshot, node: &VirtualNode) -> NodeAttr {
        let nlink = match node.node_type() {
            NodeType::Directory => {
                let subdirs = snapshot
                    .children(node.ino)
                    .map(|children| {
                        children
                            .iter()
                            .filter(|child| child.kind == NodeType::Directory)
                            .count()
                    })
                    .unwrap_or_default();
                2 + subdirs as u32
            }
            NodeType::File => 1,
        };

        NodeAttr {
            ino: node.ino,
            kind: node.node_type(),
            size: node.size(),
            perm: node.mode(),
            nlink,
            mtime: node.mtime,
            uid: self.owner.uid,
            gid: self.owner.gid,
            generation: snapshot.generation(),
        }
    }
}

/// Whether open flags ask for anything beyond reading.
pub fn is_write_open(flags: i32) -> bool {
    let access = flags & libc::O_ACCMODE;
    access != libc::O_RDONLY || flags & (libc::O_TRUNC | libc::O_APPEND | libc::O_CREAT) != 0
}

impl std::fmt::Debug for FsHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsHandlers")
            .field("generation", &self.cache.generation())
            .field("open_handles", &self.open_handles())
            .finish()
    }
}
