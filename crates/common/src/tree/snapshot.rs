//! Immutable point-in-time view of the projected hierarchy.
//!
//! A [`TreeSnapshot`] is a self-contained arena of nodes keyed by inode. It
//! is never modified after the builder hands it over, so readers holding an
//! `Arc<TreeSnapshot>` need no locking.

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;
use indexmap::IndexMap;

use super::inode_table::{Inode, InodeTable};
use crate::codec::{self, PathSegment};
use crate::decode::ContentType;
use crate::record::RecordId;

/// Permission bits for every projected directory.
pub const DIR_MODE: u16 = 0o555;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Directory,
    File,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Directory {
        children: IndexMap<PathSegment, Inode>,
    },
    File {
        content: Bytes,
        mode: u16,
        content_type: ContentType,
    },
}

#[derive(Debug, Clone)]
pub struct VirtualNode {
    pub ino: Inode,
    pub parent: Inode,
    /// Encoded name within the parent; empty for the root.
    pub name: PathSegment,
    pub mtime: SystemTime,
    pub kind: NodeKind,
}

impl VirtualNode {
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Directory { .. } => NodeType::Directory,
            NodeKind::File { .. } => NodeType::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.node_type() == NodeType::Directory
    }

    /// Content length for files, child count for directories.
    pub fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::Directory { children } => children.len() as u64,
            NodeKind::File { content, .. } => content.len() as u64,
        }
    }

    pub fn mode(&self) -> u16 {
        match &self.kind {
            NodeKind::Directory { .. } => DIR_MODE,
            NodeKind::File { mode, .. } => *mode,
        }
    }

    pub fn content_type(&self) -> Option<ContentType> {
        match &self.kind {
            NodeKind::Directory { .. } => None,
            NodeKind::File { content_type, .. } => Some(*content_type),
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: PathSegment,
    pub ino: Inode,
    pub kind: NodeType,
    pub size: u64,
}

/// The decoded primary photo of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub ino: Inode,
    pub path: String,
    pub content: Bytes,
}

/// Per-record bookkeeping kept alongside the tree for diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub id: RecordId,
    pub dir: Inode,
    pub path: String,
    pub uid: Option<u32>,
    pub photo: Option<PhotoRef>,
}

#[derive(Debug)]
pub struct TreeSnapshot {
    generation: u64,
    built_at: SystemTime,
    nodes: HashMap<Inode, VirtualNode>,
    inodes: InodeTable,
    records: IndexMap<RecordId, RecordEntry>,
}

impl TreeSnapshot {
    /// The generation-0 snapshot: just an empty root.
    pub fn empty() -> Self {
        let built_at = SystemTime::now();
        let mut nodes = HashMap::new();
        nodes.insert(InodeTable::ROOT_INODE, root_node(built_at));
        Self {
            generation: 0,
            built_at,
            nodes,
            inodes: InodeTable::new(),
            records: IndexMap::new(),
        }
    }

    pub(crate) fn from_parts(
        generation: u64,
        built_at: SystemTime,
        nodes: HashMap<Inode, VirtualNode>,
        inodes: InodeTable,
        records: IndexMap<RecordId, RecordEntry>,
    ) -> Self {
        Self {
            generation,
            built_at,
            nodes,
            inodes,
            records,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> SystemTime {
        self.built_at
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn root(&self) -> &VirtualNode {
        // from_parts callers always register the root
        &self.nodes[&InodeTable::ROOT_INODE]
    }

    pub fn node(&self, ino: Inode) -> Option<&VirtualNode> {
        self.nodes.get(&ino)
    }

    pub fn path_of(&self, ino: Inode) -> Option<&str> {
        self.inodes.get_path(ino)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up `name` inside directory `parent`.
    pub fn lookup(&self, parent: Inode, name: &str) -> Result<&VirtualNode, LookupError> {
        let dir = self
            .nodes
            .get(&parent)
            .ok_or_else(|| LookupError::NotFound(format!("inode {}", parent)))?;

        let children = match &dir.kind {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => {
                return Err(LookupError::NotADirectory(self.describe(parent)));
            }
        };

        if let Err(error) = codec::decode(name) {
            tracing::debug!(%error, parent, "lookup of a name we never produce");
            return Err(LookupError::NotFound(name.to_string()));
        }

        children
            .get(name)
            .and_then(|ino| self.nodes.get(ino))
            .ok_or_else(|| LookupError::NotFound(name.to_string()))
    }

    /// Resolve an absolute encoded path.
    pub fn resolve(&self, path: &str) -> Result<&VirtualNode, LookupError> {
        let mut node = self.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = self.lookup(node.ino, segment).map_err(|error| match error {
                LookupError::NotFound(_) => LookupError::NotFound(path.to_string()),
                other => other,
            })?;
        }
        Ok(node)
    }

    /// Children of the directory `ino`, in insertion order.
    pub fn children(&self, ino: Inode) -> Result<Vec<DirEntry>, LookupError> {
        let dir = self
            .nodes
            .get(&ino)
            .ok_or_else(|| LookupError::NotFound(format!("inode {}", ino)))?;

        match &dir.kind {
            NodeKind::Directory { children } => Ok(children
                .iter()
                .filter_map(|(name, child)| {
                    self.nodes.get(child).map(|node| DirEntry {
                        name: name.clone(),
                        ino: node.ino,
                        kind: node.node_type(),
                        size: node.size(),
                    })
                })
                .collect()),
            NodeKind::File { .. } => Err(LookupError::NotADirectory(self.describe(ino))),
        }
    }

    pub fn list_children(&self, path: &str) -> Result<Vec<DirEntry>, LookupError> {
        let node = self.resolve(path)?;
        self.children(node.ino)
    }

    /// Read up to `length` bytes at `offset`. Reads past the end are
    /// clamped to a short or empty result.
    pub fn read_content(&self, ino: Inode, offset: u64, length: usize) -> Result<Bytes, LookupError> {
        let node = self
            .nodes
            .get(&ino)
            .ok_or_else(|| LookupError::NotFound(format!("inode {}", ino)))?;

        match &node.kind {
            NodeKind::File { content, .. } => {
                let len = content.len();
                let start = usize::try_from(offset).map_or(len, |offset| offset.min(len));
                let end = start.saturating_add(length).min(len);
                Ok(content.slice(start..end))
            }
            NodeKind::Directory { .. } => Err(LookupError::IsADirectory(self.describe(ino))),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &RecordEntry> {
        self.records.values()
    }

    pub fn record(&self, id: &RecordId) -> Option<&RecordEntry> {
        self.records.get(id)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn directory_count(&self) -> usize {
        self.nodes.values().filter(|node| node.is_dir()).count()
    }

    pub fn file_count(&self) -> usize {
        self.nodes.values().filter(|node| !node.is_dir()).count()
    }

    pub fn content_bytes(&self) -> u64 {
        self.nodes
            .values()
            .filter(|node| !node.is_dir())
            .map(VirtualNode::size)
            .sum()
    }

    fn describe(&self, ino: Inode) -> String {
        self.path_of(ino)
            .map(str::to_string)
            .unwrap_or_else(|| format!("inode {}", ino))
    }
}

pub(crate) fn root_node(mtime: SystemTime) -> VirtualNode {
    VirtualNode {
        ino: InodeTable::ROOT_INODE,
        parent: InodeTable::ROOT_INODE,
        name: String::new(),
        mtime,
        kind: NodeKind::Directory {
            children: IndexMap::new(),
        },
    }
}
