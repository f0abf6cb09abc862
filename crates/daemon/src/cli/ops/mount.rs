use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use ldbfs_daemon::{run_mount, ProcessError};

/// Mount the projection and keep it fresh until interrupted
#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Directory to mount on (created if missing)
    #[arg(long, env = "LDBFS_MOUNTPOINT")]
    pub mountpoint: Option<PathBuf>,

    /// Let users other than the mounting one see the filesystem
    #[arg(long)]
    pub allow_other: bool,

    /// Seconds between refreshes
    #[arg(long)]
    pub refresh_interval: Option<u64>,

    /// Point AccountsService login icons at photos in the mount
    #[arg(long)]
    pub sync_user_icons: bool,
}

#[derive(Debug)]
pub struct MountOutput {
    pub mountpoint: PathBuf,
}

impl fmt::Display for MountOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            "Unmounted".green(),
            self.mountpoint.display().bold()
        )
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mount {
    type Error = ProcessError;
    type Output = MountOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = ctx.config.clone();
        if let Some(mountpoint) = &self.mountpoint {
            config.mountpoint = mountpoint.clone();
        }
        if let Some(secs) = self.refresh_interval {
            config.refresh_interval_secs = secs;
        }
        config.allow_other |= self.allow_other;
        config.sync_user_icons |= self.sync_user_icons;

        run_mount(&config).await?;

        Ok(MountOutput {
            mountpoint: config.mountpoint,
        })
    }
}
