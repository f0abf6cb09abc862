//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use ::common::notify::{NotifyError, PhotoSink};
use ::common::record::{Record, RecordSource, SourceError};
use ::common::refresh::{ChangeEvent, RefreshConfig, RefreshScheduler};
use ::common::tree::SnapshotCache;
use tokio::time::Instant;

pub const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
pub const JPEG_V2: &[u8] = &[0xff, 0xd8, 0xff, 0xe1, 0x00, 0x10, b'E', b'x', b'i', b'f', 0x00];

/// Record source whose contents can be swapped or broken between cycles.
/// It can also be slowed down, and it tracks overlapping calls.
pub struct MemorySource {
    state: Mutex<Result<Vec<Record>, String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Ok(records)),
            delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        })
    }

    /// Make every enumeration take this long.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Most enumerations ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// When each enumeration started.
    pub fn started(&self) -> Vec<Instant> {
        self.started.lock().clone()
    }

    pub fn set_records(&self, records: Vec<Record>) {
        *self.state.lock() = Ok(records);
    }

    pub fn fail(&self, reason: &str) {
        *self.state.lock() = Err(reason.to_string());
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn enumerate_records(&self) -> Result<Vec<Record>, SourceError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.started.lock().push(Instant::now());

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.state.lock().clone().map_err(SourceError::Unavailable);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Photo sink that remembers every event and can be told to fail.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
    failing: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl PhotoSink for RecordingSink {
    async fn set_user_photo(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event.clone());
        if *self.failing.lock() {
            return Err(NotifyError::Sink("sink offline".to_string()));
        }
        Ok(())
    }
}

pub fn user(name: &str, uid: u32, photo: Option<&'static [u8]>) -> Record {
    let record = Record::new(format!("cn={},dc=example", name).as_str())
        .with_value("uidNumber", uid.to_string())
        .with_value("mail", format!("{}@example.com", name));
    match photo {
        Some(photo) => record.with_value("jpegPhoto", Bytes::from_static(photo)),
        None => record,
    }
}

pub fn scheduler(source: Arc<MemorySource>) -> RefreshScheduler {
    RefreshScheduler::new(
        Arc::new(SnapshotCache::new()),
        source,
        RefreshConfig::default(),
    )
}
