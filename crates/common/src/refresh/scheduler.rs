//! Periodic rebuild, publish, diff and notify.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::diff::diff_photos;
use super::jobs::{RefreshJob, RefreshReceiver};
use crate::notify::{NotifierBridge, NotifyReport};
use crate::record::{RecordSource, SourceError};
use crate::tree::{BuildError, BuildOptions, SnapshotBuilder, SnapshotCache, TreeSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub build: BuildOptions,
}

impl RefreshConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            build: BuildOptions::default(),
        }
    }
}

/// Summary of one completed refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub generation: u64,
    pub records: usize,
    pub changes: usize,
    pub notify: NotifyReport,
}

pub struct RefreshScheduler {
    cache: Arc<SnapshotCache>,
    source: Arc<dyn RecordSource>,
    builder: SnapshotBuilder,
    interval: Duration,
    notifier: Option<NotifierBridge>,
    /// Snapshot the next diff compares against. Holding the lock also keeps
    /// cycles from overlapping.
    baseline: Mutex<Arc<TreeSnapshot>>,
}

impl RefreshScheduler {
    pub fn new(
        cache: Arc<SnapshotCache>,
        source: Arc<dyn RecordSource>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            cache,
            source,
            builder: SnapshotBuilder::new(config.build),
            interval: config.interval,
            notifier: None,
            baseline: Mutex::new(Arc::new(TreeSnapshot::empty())),
        }
    }

    pub fn with_notifier(mut self, notifier: NotifierBridge) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Build and publish the first snapshot without notifying anyone.
    #[tracing::instrument(skip(self), fields(source = %self.source.describe()))]
    pub async fn prime(&self) -> Result<u64, RefreshError> {
        let _cycle = self.baseline.lock().await;
        let snapshot = self.build().await?;
        let generation = snapshot.generation();
        let records = snapshot.record_count();
        self.cache.publish(snapshot);
        tracing::info!(generation, records, "initial snapshot published");
        Ok(generation)
    }

    /// One refresh cycle. On error nothing is published and the diff
    /// baseline is left alone.
    #[tracing::instrument(skip(self), fields(source = %self.source.describe()))]
    pub async fn run_cycle(&self) -> Result<CycleReport, RefreshError> {
        let mut baseline = self.baseline.lock().await;

        let next = Arc::new(self.build().await?);
        self.cache.publish(Arc::clone(&next));

        let photo_attribute = &self.builder.options().schema.photo_attribute;
        let events = diff_photos(&baseline, &next, photo_attribute);
        *baseline = Arc::clone(&next);

        let notify = match &self.notifier {
            Some(notifier) if !events.is_empty() => notifier.dispatch(&events).await,
            _ => NotifyReport::default(),
        };

        Ok(CycleReport {
            generation: next.generation(),
            records: next.record_count(),
            changes: events.len(),
            notify,
        })
    }

    /// Run the loop on its own task until a shutdown job arrives or every
    /// dispatcher is dropped.
    pub fn spawn(self: Arc<Self>, jobs: RefreshReceiver) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(jobs).await })
    }

    pub async fn run(&self, jobs: RefreshReceiver) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.cycle("interval").await,
                job = jobs.recv() => match job {
                    Some(RefreshJob::Refresh { reason }) => {
                        self.cycle(reason).await;
                        ticker.reset();
                    }
                    Some(RefreshJob::Shutdown) | None => break,
                },
            }
        }

        tracing::info!("refresh loop stopped");
    }

    async fn cycle(&self, reason: &str) {
        match self.run_cycle().await {
            Ok(report) => tracing::info!(
                reason,
                generation = report.generation,
                records = report.records,
                changes = report.changes,
                delivered = report.notify.delivered,
                failed = report.notify.failed,
                "refresh cycle complete"
            ),
            Err(error) => tracing::warn!(
                reason,
                %error,
                generation = self.cache.generation(),
                "refresh cycle skipped; keeping current snapshot"
            ),
        }
    }

    async fn build(&self) -> Result<TreeSnapshot, RefreshError> {
        let records = self.source.enumerate_records().await?;
        let previous = self.cache.current();
        Ok(self.builder.build_blocking(previous, records).await?)
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("source", &self.source.describe())
            .field("interval", &self.interval)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}
