//! Read-only projection of LDB directory records as a filesystem tree.
//!
//! Records come from a [`record::RecordSource`], are decoded into an
//! immutable [`tree::TreeSnapshot`], and published through the
//! [`tree::SnapshotCache`] slot that the request [`handlers`] read from.
//! The [`refresh`] scheduler rebuilds the tree periodically and reports
//! photo changes to a [`notify::PhotoSink`].

pub mod codec;
pub mod decode;
pub mod handlers;
pub mod notify;
pub mod record;
pub mod refresh;
pub mod tree;

pub mod prelude {
    pub use crate::decode::{AttributeClass, ContentType, ImageFormat, Schema};
    pub use crate::handlers::{FsError, FsHandlers, NodeAttr, Ownership};
    pub use crate::notify::{NotifierBridge, NotifyError, PhotoSink};
    pub use crate::record::{
        LdbSearchSource, LdifFileSource, Record, RecordId, RecordSource, SourceError,
    };
    pub use crate::refresh::{
        ChangeEvent, RefreshConfig, RefreshDispatcher, RefreshScheduler,
    };
    pub use crate::tree::{
        BuildOptions, CacheStats, InodeTable, SnapshotCache, SudoersPolicy, TreeSnapshot,
    };
}
