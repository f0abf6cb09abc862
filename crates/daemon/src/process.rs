//! Daemon lifecycle: first build, mount, refresh loop, signals, teardown.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::handlers::Ownership;
use common::notify::NotifierBridge;
use common::refresh::{RefreshError, RefreshScheduler};
use common::tree::{SnapshotCache, TreeSnapshot};

use crate::accounts::AccountsServiceSink;
use crate::config::{Config, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("initial snapshot build failed: {0}")]
    InitialBuild(#[source] RefreshError),
    #[error("mountpoint {}: {source}", path.display())]
    Mountpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to mount {}: {source}", path.display())]
    Mount {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Owns the mountpoint directory for the lifetime of the mount and removes
/// it on drop, but only if it was created here.
#[derive(Debug)]
pub struct MountpointGuard {
    path: PathBuf,
    created: bool,
}

impl MountpointGuard {
    pub fn prepare(path: &Path) -> Result<Self, ProcessError> {
        let error = |source: std::io::Error| ProcessError::Mountpoint {
            path: path.to_path_buf(),
            source,
        };

        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => Ok(Self {
                path: path.to_path_buf(),
                created: false,
            }),
            Ok(_) => Err(error(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "exists and is not a directory",
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::fs::create_dir_all(path).map_err(error)?;
                tracing::info!(path = %path.display(), "created mountpoint");
                Ok(Self {
                    path: path.to_path_buf(),
                    created: true,
                })
            }
            Err(e) => Err(error(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owner reported for every node: whoever owns the mountpoint.
    pub fn ownership(&self) -> Ownership {
        std::fs::metadata(&self.path)
            .map(|metadata| Ownership {
                uid: metadata.uid(),
                gid: metadata.gid(),
            })
            .unwrap_or_default()
    }
}

impl Drop for MountpointGuard {
    fn drop(&mut self) {
        if !self.created {
            return;
        }
        match std::fs::remove_dir(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed mountpoint"),
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "failed to remove mountpoint")
            }
        }
    }
}

/// Scheduler wired to the configured source, with the icon sink attached
/// when icon sync is on.
pub fn scheduler(config: &Config, cache: Arc<SnapshotCache>) -> Result<RefreshScheduler, ProcessError> {
    let source = config.record_source()?;
    let mut scheduler = RefreshScheduler::new(cache, source, config.refresh_config());

    if config.sync_user_icons {
        let sink = AccountsServiceSink::new(&config.accounts.busctl, &config.mountpoint);
        scheduler = scheduler.with_notifier(NotifierBridge::new(Arc::new(sink)));
    }

    Ok(scheduler)
}

/// Build one snapshot from the configured source without mounting.
pub async fn build_snapshot(config: &Config) -> Result<Arc<TreeSnapshot>, ProcessError> {
    config.validate()?;
    let cache = Arc::new(SnapshotCache::new());
    let source = config.record_source()?;
    let scheduler = RefreshScheduler::new(Arc::clone(&cache), source, config.refresh_config());
    scheduler.prime().await.map_err(ProcessError::InitialBuild)?;
    Ok(cache.current())
}

/// Mount and serve until SIGINT or SIGTERM. SIGHUP triggers a refresh.
#[cfg(feature = "fuse")]
pub async fn run_mount(config: &Config) -> Result<(), ProcessError> {
    use common::handlers::FsHandlers;
    use common::refresh::RefreshDispatcher;

    config.validate()?;

    let cache = Arc::new(SnapshotCache::new());
    let scheduler = Arc::new(scheduler(config, Arc::clone(&cache))?);
    tracing::debug!(?scheduler, "starting");

    // No mount without a first snapshot
    scheduler.prime().await.map_err(ProcessError::InitialBuild)?;

    let mountpoint = MountpointGuard::prepare(&config.mountpoint)?;
    let handlers = Arc::new(FsHandlers::new(cache, mountpoint.ownership()));
    let session = crate::fuse::mount(handlers, mountpoint.path(), config.allow_other).map_err(
        |source| ProcessError::Mount {
            path: mountpoint.path().to_path_buf(),
            source,
        },
    )?;

    let (dispatcher, jobs) = RefreshDispatcher::new();
    let refresh = Arc::clone(&scheduler).spawn(jobs);
    tracing::info!(
        mountpoint = %mountpoint.path().display(),
        interval_secs = scheduler.interval().as_secs(),
        "ldbfs is running"
    );

    let result = wait_for_exit(&dispatcher).await;

    if dispatcher.shutdown().is_err() {
        tracing::debug!("refresh task already stopped");
    }
    if let Err(error) = refresh.await {
        tracing::warn!(%error, "refresh task ended abnormally");
    }

    // unmount before the mountpoint is removed
    drop(session);
    drop(mountpoint);
    tracing::info!("unmounted");

    result
}

#[cfg(feature = "fuse")]
async fn wait_for_exit(
    dispatcher: &common::refresh::RefreshDispatcher,
) -> Result<(), ProcessError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).map_err(ProcessError::Signal)?;
    let mut sighup = signal(SignalKind::hangup()).map_err(ProcessError::Signal)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = sighup.recv() => {
                tracing::info!("received SIGHUP, refreshing");
                if dispatcher.request_refresh("SIGHUP").is_err() {
                    tracing::warn!("refresh task is gone, shutting down");
                    break;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use std::io::Write;

    #[test]
    fn test_guard_removes_directory_it_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("ldb-fuse");

        let guard = MountpointGuard::prepare(&path).unwrap();
        assert!(path.is_dir());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_keeps_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let guard = MountpointGuard::prepare(dir.path()).unwrap();
        let owner = guard.ownership();
        drop(guard);
        assert!(dir.path().is_dir());

        let metadata = std::fs::metadata(dir.path()).unwrap();
        assert_eq!(owner.uid, metadata.uid());
    }

    #[test]
    fn test_guard_rejects_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = MountpointGuard::prepare(file.path());
        assert!(matches!(result, Err(ProcessError::Mountpoint { .. })));
    }

    #[tokio::test]
    async fn test_build_snapshot_from_ldif() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dn: cn=alice,dc=example\nmail: alice@example.com").unwrap();

        let config = Config {
            source: Some(SourceConfig::Ldif {
                path: file.path().to_path_buf(),
            }),
            ..Config::default()
        };
        let snapshot = build_snapshot(&config).await.unwrap();
        assert_eq!(snapshot.generation(), 1);
        assert!(snapshot.resolve("/example/alice/mail").is_ok());
    }

    #[tokio::test]
    async fn test_build_snapshot_failures() {
        let missing_source = build_snapshot(&Config::default()).await;
        assert!(matches!(
            missing_source,
            Err(ProcessError::Config(ConfigError::MissingSource))
        ));

        let config = Config {
            source: Some(SourceConfig::Ldif {
                path: PathBuf::from("/nonexistent/export.ldif"),
            }),
            ..Config::default()
        };
        let unreadable = build_snapshot(&config).await;
        assert!(matches!(unreadable, Err(ProcessError::InitialBuild(_))));
    }

    #[test]
    fn test_scheduler_uses_configured_interval() {
        let config = Config {
            source: Some(SourceConfig::ldb("/tmp/cache.ldb")),
            refresh_interval_secs: 42,
            sync_user_icons: true,
            ..Config::default()
        };
        let scheduler = scheduler(&config, Arc::new(SnapshotCache::new())).unwrap();
        assert_eq!(scheduler.interval().as_secs(), 42);
    }
}
