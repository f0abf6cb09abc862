//! Integration tests for building a projection from a daemon configuration
//! without mounting it.

use std::io::Write;
use std::sync::Arc;

use common::notify::NotifierBridge;
use common::refresh::RefreshScheduler;
use common::tree::SnapshotCache;
use tempfile::NamedTempFile;

use ldbfs_daemon::{build_snapshot, process, AccountsServiceSink, Config, SourceConfig};

const EXPORT: &str = "\
version: 1

# people
dn: cn=alice,ou=people,dc=example
uidNumber: 1000
mail: alice@example.com
jpegPhoto:: /9j/4AAQSkZJRgA=

dn: cn=bob,ou=people,dc=example
uidNumber: 1001
description: a long description that the exporter folded
  across two lines

dn: cn=admins,ou=sudoers,dc=example
sudoHost: ws01
sudoCommand: ALL
sudoUser: alice@ldap.example.com
sudoUser: bob@ldap.example.com

dn: cn=ops,ou=sudoers,dc=example
sudoHost: other-host
sudoCommand: ALL
sudoUser: carol@ldap.example.com
";

fn export_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(EXPORT.as_bytes()).unwrap();
    file
}

fn config_for(file: &NamedTempFile) -> Config {
    let mut config = Config::from_toml(
        r#"
        [sudoers]
        enabled = true
        hostname = "ws01"
        strip_suffix = "@ldap.example.com"
        "#,
    )
    .unwrap();
    config.source = Some(SourceConfig::Ldif {
        path: file.path().to_path_buf(),
    });
    config
}

fn read_all(snapshot: &common::tree::TreeSnapshot, path: &str) -> Vec<u8> {
    let node = snapshot.resolve(path).unwrap();
    snapshot
        .read_content(node.ino, 0, node.size() as usize)
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_projection_from_ldif_export() {
    let file = export_file();
    let snapshot = build_snapshot(&config_for(&file)).await.unwrap();

    assert_eq!(snapshot.record_count(), 4);
    assert_eq!(
        read_all(&snapshot, "/example/people/alice/mail"),
        b"alice@example.com"
    );
    assert_eq!(
        read_all(&snapshot, "/example/people/bob/description"),
        b"a long description that the exporter folded across two lines"
    );
    assert_eq!(
        read_all(&snapshot, "/example/people/alice/jpegPhoto.jpg")[..3],
        [0xff, 0xd8, 0xff]
    );
    assert_eq!(
        read_all(&snapshot, "/example/sudoers/admins/sudoUser.txt"),
        b"alice@ldap.example.com\nbob@ldap.example.com\n"
    );
}

#[tokio::test]
async fn test_sudoers_file_at_root() {
    let file = export_file();
    let snapshot = build_snapshot(&config_for(&file)).await.unwrap();

    // carol's rule is for another host
    assert_eq!(read_all(&snapshot, "/sudoers.txt"), b"alice\nbob\n");
}

#[tokio::test]
async fn test_sudoers_disabled_by_default() {
    let file = export_file();
    let config = Config {
        source: Some(SourceConfig::Ldif {
            path: file.path().to_path_buf(),
        }),
        ..Config::default()
    };
    let snapshot = build_snapshot(&config).await.unwrap();
    assert!(snapshot.resolve("/sudoers.txt").is_err());
}

#[tokio::test]
async fn test_icon_sync_reports_failures_without_failing_refresh() {
    let file = export_file();
    let mut config = config_for(&file);
    config.sync_user_icons = true;
    config.accounts.busctl = "/nonexistent/busctl".into();

    let cache = Arc::new(SnapshotCache::new());
    let scheduler = process::scheduler(&config, Arc::clone(&cache)).unwrap();
    scheduler.prime().await.unwrap();

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.changes, 1);
    assert_eq!(report.notify.failed, 1);
    assert_eq!(cache.generation(), 2);
}

#[tokio::test]
async fn test_icon_sync_through_busctl_stand_in() {
    let file = export_file();
    let config = config_for(&file);

    let sink = AccountsServiceSink::new("true", &config.mountpoint);
    let scheduler = RefreshScheduler::new(
        Arc::new(SnapshotCache::new()),
        config.record_source().unwrap(),
        config.refresh_config(),
    )
    .with_notifier(NotifierBridge::new(Arc::new(sink)));

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.notify.delivered, 1);
    assert_eq!(report.notify.failed, 0);
}
