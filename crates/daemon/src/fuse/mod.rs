//! FUSE transport for the LDB projection.
//!
//! - `LdbFs`: `fuser::Filesystem` forwarding every callback to `FsHandlers`
//! - [`mount`]: background session with the read-only mount options

mod ldb_fs;

use std::path::Path;
use std::sync::Arc;

use fuser::{BackgroundSession, MountOption};

use common::handlers::FsHandlers;

pub use ldb_fs::{file_attr, file_type, LdbFs};

pub const FS_NAME: &str = "ldbfs";

pub fn mount_options(allow_other: bool) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(FS_NAME.to_string()),
        MountOption::RO,
        MountOption::DefaultPermissions,
        MountOption::AutoUnmount,
    ];
    // AutoUnmount needs one of these
    if allow_other {
        options.push(MountOption::AllowOther);
    } else {
        options.push(MountOption::AllowRoot);
    }
    options
}

/// Mount on a background thread. Dropping the session unmounts.
pub fn mount(
    handlers: Arc<FsHandlers>,
    mountpoint: &Path,
    allow_other: bool,
) -> std::io::Result<BackgroundSession> {
    tracing::info!(mountpoint = %mountpoint.display(), allow_other, "mounting");
    fuser::spawn_mount2(LdbFs::new(handlers), mountpoint, &mount_options(allow_other))
}
