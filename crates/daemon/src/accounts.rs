//! AccountsService photo sink.
//!
//! Points a user's login icon at the photo file inside the mount by calling
//! `org.freedesktop.Accounts.User.SetIconFile` through `busctl`.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use common::notify::{NotifyError, PhotoSink};
use common::refresh::ChangeEvent;

const DESTINATION: &str = "org.freedesktop.Accounts";
const USER_INTERFACE: &str = "org.freedesktop.Accounts.User";
const OBJECT_PREFIX: &str = "/org/freedesktop/Accounts/User";

#[derive(Debug, Clone)]
pub struct AccountsServiceSink {
    busctl: PathBuf,
    mountpoint: PathBuf,
}

impl AccountsServiceSink {
    pub fn new(busctl: impl Into<PathBuf>, mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            busctl: busctl.into(),
            mountpoint: mountpoint.into(),
        }
    }

    /// Absolute path of the photo as seen through the mount. Empty when the
    /// photo was removed, which resets the icon.
    pub fn icon_path(&self, event: &ChangeEvent) -> String {
        event
            .photo_path
            .as_deref()
            .map(|path| {
                self.mountpoint
                    .join(path.trim_start_matches('/'))
                    .display()
                    .to_string()
            })
            .unwrap_or_default()
    }

    pub fn call_args(&self, uid: u32, icon: &str) -> Vec<String> {
        vec![
            "--system".to_string(),
            "call".to_string(),
            DESTINATION.to_string(),
            format!("{}{}", OBJECT_PREFIX, uid),
            USER_INTERFACE.to_string(),
            "SetIconFile".to_string(),
            "s".to_string(),
            icon.to_string(),
        ]
    }
}

#[async_trait]
impl PhotoSink for AccountsServiceSink {
    async fn set_user_photo(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        let uid = event.uid.ok_or_else(|| NotifyError::MissingUid {
            record: event.record_id.to_string(),
        })?;
        let icon = self.icon_path(event);

        tracing::debug!(uid, icon = %icon, "setting account icon");
        let output = Command::new(&self.busctl)
            .args(self.call_args(uid, &icon))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| NotifyError::Sink(format!("{}: {}", self.busctl.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NotifyError::Sink(format!(
                "SetIconFile for uid {} failed ({}): {}",
                uid,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::record::RecordId;

    fn event(uid: Option<u32>, photo_path: Option<&str>) -> ChangeEvent {
        ChangeEvent {
            record_id: RecordId::from("cn=alice,dc=example"),
            attribute: "jpegPhoto".to_string(),
            previously_present: false,
            new_value: photo_path.map(|_| Bytes::from_static(b"\xff\xd8\xff")),
            photo_path: photo_path.map(String::from),
            uid,
        }
    }

    #[test]
    fn test_icon_path_is_inside_mount() {
        let sink = AccountsServiceSink::new("busctl", "/run/ldb-fuse/");
        assert_eq!(
            sink.icon_path(&event(Some(1000), Some("/example/alice/jpegPhoto.jpg"))),
            "/run/ldb-fuse/example/alice/jpegPhoto.jpg"
        );
        assert_eq!(sink.icon_path(&event(Some(1000), None)), "");
    }

    #[test]
    fn test_call_args() {
        let sink = AccountsServiceSink::new("busctl", "/mnt");
        let args = sink.call_args(1000, "/mnt/a.jpg");
        assert_eq!(args[0], "--system");
        assert_eq!(args[3], "/org/freedesktop/Accounts/User1000");
        assert_eq!(args[5], "SetIconFile");
        assert_eq!(args.last().map(String::as_str), Some("/mnt/a.jpg"));
    }

    #[tokio::test]
    async fn test_missing_uid_is_rejected() {
        let sink = AccountsServiceSink::new("busctl", "/mnt");
        let result = sink.set_user_photo(&event(None, Some("/a/jpegPhoto.jpg"))).await;
        assert!(matches!(result, Err(NotifyError::MissingUid { .. })));
    }

    #[tokio::test]
    async fn test_missing_busctl_is_a_sink_error() {
        let sink = AccountsServiceSink::new("/nonexistent/busctl", "/mnt");
        let result = sink.set_user_photo(&event(Some(1000), None)).await;
        assert!(matches!(result, Err(NotifyError::Sink(_))));
    }

    #[tokio::test]
    async fn test_exit_status_decides_outcome() {
        let ok = AccountsServiceSink::new("true", "/mnt");
        ok.set_user_photo(&event(Some(1000), None)).await.unwrap();

        let failing = AccountsServiceSink::new("false", "/mnt");
        let result = failing.set_user_photo(&event(Some(1000), None)).await;
        assert!(matches!(result, Err(NotifyError::Sink(_))));
    }
}
