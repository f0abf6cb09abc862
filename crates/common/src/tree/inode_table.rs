//! Path ↔ inode mapping that survives snapshot rebuilds.
//!
//! Each build starts from [`InodeTable::successor`] of the previous
//! generation's table. A path seen before keeps its number, a new path gets
//! a fresh one from a counter that only moves forward, and numbers of paths
//! that disappeared are never handed out again.

use std::collections::HashMap;

/// Inode number as handed to the kernel.
pub type Inode = u64;

/// Bidirectional mapping between inodes and encoded paths
#[derive(Debug, Clone)]
pub struct InodeTable {
    /// Path to inode mapping
    path_to_inode: HashMap<String, Inode>,
    /// Inode to path mapping
    inode_to_path: HashMap<Inode, String>,
    /// Next available inode number (starts at 2, as 1 is reserved for root)
    next_inode: Inode,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Root inode number (always 1 in FUSE)
    pub const ROOT_INODE: Inode = 1;

    /// Create a new inode table with root pre-registered
    pub fn new() -> Self {
        Self::with_next_inode(Self::ROOT_INODE + 1)
    }

    fn with_next_inode(next_inode: Inode) -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            next_inode,
        };
        table.path_to_inode.insert("/".to_string(), Self::ROOT_INODE);
        table.inode_to_path.insert(Self::ROOT_INODE, "/".to_string());
        table
    }

    /// Empty table for the next generation. Only the root is registered and
    /// the counter continues where this one stopped.
    pub fn successor(&self) -> Self {
        Self::with_next_inode(self.next_inode)
    }

    /// Get or create an inode for a path, reusing the number `previous`
    /// assigned to the same path.
    pub fn get_or_create(&mut self, path: &str, previous: Option<&InodeTable>) -> Inode {
        let normalized = Self::normalize_path(path);

        if let Some(&inode) = self.path_to_inode.get(&normalized) {
            return inode;
        }

        let inode = match previous.and_then(|prev| prev.path_to_inode.get(&normalized)) {
            Some(&inode) => inode,
            None => {
                let inode = self.next_inode;
                self.next_inode += 1;
                inode
            }
        };

        self.path_to_inode.insert(normalized.clone(), inode);
        self.inode_to_path.insert(inode, normalized);
        inode
    }

    /// Get the inode for a path if it exists
    pub fn get_inode(&self, path: &str) -> Option<Inode> {
        let normalized = Self::normalize_path(path);
        self.path_to_inode.get(&normalized).copied()
    }

    /// Get the path for an inode if it exists
    pub fn get_path(&self, inode: Inode) -> Option<&str> {
        self.inode_to_path.get(&inode).map(String::as_str)
    }

    /// Normalize a path to a consistent format
    pub fn normalize_path(path: &str) -> String {
        let path = path.trim();

        if path.is_empty() || path == "/" {
            return "/".to_string();
        }

        let mut normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        while normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }

        normalized
    }

    /// Join an encoded segment onto a normalized parent path.
    pub fn join(parent: &str, segment: &str) -> String {
        if parent == "/" {
            format!("/{}", segment)
        } else {
            format!("{}/{}", parent, segment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_inode() {
        let table = InodeTable::new();
        assert_eq!(table.get_inode("/"), Some(InodeTable::ROOT_INODE));
        assert_eq!(table.get_path(InodeTable::ROOT_INODE), Some("/"));
    }

    #[test]
    fn test_get_or_create() {
        let mut table = InodeTable::new();

        let inode1 = table.get_or_create("/foo", None);
        let inode2 = table.get_or_create("/foo", None);
        let inode3 = table.get_or_create("/bar", None);

        assert_eq!(inode1, inode2);
        assert_ne!(inode1, inode3);
        assert_ne!(inode1, InodeTable::ROOT_INODE);
    }

    #[test]
    fn test_successor_reuses_known_paths() {
        let mut first = InodeTable::new();
        let foo = first.get_or_create("/foo", None);
        let bar = first.get_or_create("/bar", None);

        let mut second = first.successor();
        assert!(second.get_inode("/foo").is_none());

        let foo_again = second.get_or_create("/foo", Some(&first));
        let baz = second.get_or_create("/baz", Some(&first));

        assert_eq!(foo_again, foo);
        assert_ne!(baz, bar);
        assert!(baz > bar);
    }

    #[test]
    fn test_retired_inodes_are_not_reused() {
        let mut first = InodeTable::new();
        let gone = first.get_or_create("/gone", None);

        let second = first.successor();
        let mut third = second.successor();
        let fresh = third.get_or_create("/new", Some(&second));

        assert!(fresh > gone);
        assert_eq!(third.get_or_create("/gone", Some(&second)), fresh + 1);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(InodeTable::normalize_path(""), "/");
        assert_eq!(InodeTable::normalize_path("/"), "/");
        assert_eq!(InodeTable::normalize_path("foo"), "/foo");
        assert_eq!(InodeTable::normalize_path("/foo"), "/foo");
        assert_eq!(InodeTable::normalize_path("/foo/"), "/foo");
        assert_eq!(InodeTable::normalize_path("/foo/bar"), "/foo/bar");
    }

    #[test]
    fn test_join() {
        assert_eq!(InodeTable::join("/", "example"), "/example");
        assert_eq!(InodeTable::join("/example", "alice"), "/example/alice");
    }
}
