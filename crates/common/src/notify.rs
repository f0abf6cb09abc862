//! Hands photo changes to an external sink.
//!
//! Delivery is best effort: a failed event is logged and dropped, and the
//! snapshot swap that produced it stands.

use std::sync::Arc;

use async_trait::async_trait;

use crate::refresh::ChangeEvent;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("record {record} has no numeric uid")]
    MissingUid { record: String },
    #[error("photo sink failed: {0}")]
    Sink(String),
}

/// Receiver of photo change events.
#[async_trait]
pub trait PhotoSink: Send + Sync {
    async fn set_user_photo(&self, event: &ChangeEvent) -> Result<(), NotifyError>;
}

/// Outcome of dispatching one batch of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotifierBridge {
    sink: Arc<dyn PhotoSink>,
}

impl NotifierBridge {
    pub fn new(sink: Arc<dyn PhotoSink>) -> Self {
        Self { sink }
    }

    pub async fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        self.sink.set_user_photo(event).await
    }

    /// Deliver events one after another. Failures never stop the batch.
    pub async fn dispatch(&self, events: &[ChangeEvent]) -> NotifyReport {
        let mut report = NotifyReport::default();

        for event in events {
            match self.notify(event).await {
                Ok(()) => {
                    tracing::info!(
                        record = %event.record_id,
                        uid = ?event.uid,
                        removed = event.is_removal(),
                        "photo change delivered"
                    );
                    report.delivered += 1;
                }
                Err(error) => {
                    tracing::warn!(record = %event.record_id, %error, "photo change not delivered");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for NotifierBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierBridge").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;
    use bytes::Bytes;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FlakySink {
        seen: Mutex<Vec<RecordId>>,
    }

    #[async_trait]
    impl PhotoSink for FlakySink {
        async fn set_user_photo(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
            self.seen.lock().push(event.record_id.clone());
            match event.uid {
                Some(_) => Ok(()),
                None => Err(NotifyError::MissingUid {
                    record: event.record_id.to_string(),
                }),
            }
        }
    }

    fn event(dn: &str, uid: Option<u32>) -> ChangeEvent {
        ChangeEvent {
            record_id: RecordId::from(dn),
            attribute: "jpegPhoto".to_string(),
            previously_present: false,
            new_value: Some(Bytes::from_static(b"\xff\xd8\xff")),
            photo_path: Some(format!("/{}/jpegPhoto.jpg", dn)),
            uid,
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let sink = Arc::new(FlakySink::default());
        let bridge = NotifierBridge::new(sink.clone());

        let report = bridge
            .dispatch(&[event("cn=a", None), event("cn=b", Some(1001))])
            .await;

        assert_eq!(
            report,
            NotifyReport {
                delivered: 1,
                failed: 1
            }
        );
        assert_eq!(sink.seen.lock().len(), 2);
    }
}
