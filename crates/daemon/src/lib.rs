//! Daemon side of ldbfs: configuration, logging, the AccountsService sink,
//! the FUSE transport and the mount lifecycle.

pub mod accounts;
pub mod config;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod logging;
pub mod process;

pub use accounts::AccountsServiceSink;
pub use config::{Config, ConfigError, SourceConfig};
pub use process::{build_snapshot, MountpointGuard, ProcessError};
#[cfg(feature = "fuse")]
pub use process::run_mount;
