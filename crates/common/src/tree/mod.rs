//! The projected tree: inode bookkeeping, snapshots, their builder, and the
//! slot holding the current one.

pub mod builder;
pub mod cache;
pub mod inode_table;
pub mod snapshot;
pub mod sudoers;

pub use builder::{build_once, BuildError, BuildOptions, SnapshotBuilder};
pub use cache::{CacheStats, SnapshotCache};
pub use inode_table::{Inode, InodeTable};
pub use snapshot::{
    DirEntry, LookupError, NodeKind, NodeType, PhotoRef, RecordEntry, TreeSnapshot, VirtualNode,
    DIR_MODE,
};
pub use sudoers::SudoersPolicy;
