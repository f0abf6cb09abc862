use std::fmt;

use clap::Args;

use common::tree::CacheStats;
use ldbfs_daemon::{build_snapshot, ProcessError};

/// Build a snapshot once and print its statistics as JSON
#[derive(Args, Debug, Clone)]
pub struct Stats;

#[derive(Debug)]
pub struct StatsOutput(pub CacheStats);

impl fmt::Display for StatsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.0).map_err(|_| fmt::Error)?;
        write!(f, "{json}")
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Stats {
    type Error = ProcessError;
    type Output = StatsOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let snapshot = build_snapshot(&ctx.config).await?;
        Ok(StatsOutput(CacheStats::of(&snapshot)))
    }
}
