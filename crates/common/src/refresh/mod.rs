//! Background refresh: job queue, scheduler loop and photo diffing.

pub mod diff;
pub mod jobs;
pub mod scheduler;

pub use diff::{diff_photos, ChangeEvent};
pub use jobs::{RefreshDispatcher, RefreshJob, RefreshReceiver, RefreshTaskGone};
pub use scheduler::{CycleReport, RefreshConfig, RefreshError, RefreshScheduler};
