//! Daemon configuration.
//!
//! Loaded once at startup from an optional TOML file; command line flags are
//! applied on top by the binary. Nothing here is re-read while mounted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::decode::Schema;
use common::record::{LdbSearchSource, LdifFileSource, RecordSource};
use common::refresh::RefreshConfig;
use common::tree::{BuildOptions, SudoersPolicy};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ldbfs/config.toml";
pub const DEFAULT_MOUNTPOINT: &str = "/run/ldb-fuse/";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no record source configured (use --ldb or --ldif)")]
    MissingSource,
    #[error("refresh interval must be at least one second")]
    ZeroInterval,
    #[error("invalid log level: {0}")]
    LogLevel(String),
}

/// Where records are enumerated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Query an LDB database with `ldbsearch`.
    Ldb {
        path: PathBuf,
        #[serde(default = "default_ldbsearch")]
        ldbsearch: PathBuf,
        #[serde(default)]
        filter: Option<String>,
    },
    /// Read an LDIF export.
    Ldif { path: PathBuf },
}

fn default_ldbsearch() -> PathBuf {
    PathBuf::from(LdbSearchSource::DEFAULT_PROGRAM)
}

impl SourceConfig {
    pub fn ldb(path: impl Into<PathBuf>) -> Self {
        Self::Ldb {
            path: path.into(),
            ldbsearch: default_ldbsearch(),
            filter: None,
        }
    }

    pub fn build(&self) -> Arc<dyn RecordSource> {
        match self {
            SourceConfig::Ldb {
                path,
                ldbsearch,
                filter,
            } => Arc::new(
                LdbSearchSource::new(path)
                    .with_program(ldbsearch)
                    .with_filter(filter.clone()),
            ),
            SourceConfig::Ldif { path } => Arc::new(LdifFileSource::new(path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SudoersConfig {
    pub enabled: bool,
    /// Host the rules are evaluated for; the machine's hostname when unset.
    pub hostname: Option<String>,
    /// Suffix removed from each `sudoUser` value, e.g. `@ldap.example.com`.
    pub strip_suffix: Option<String>,
    pub file_name: String,
}

impl Default for SudoersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hostname: None,
            strip_suffix: None,
            file_name: SudoersPolicy::DEFAULT_FILE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// `busctl` binary used to reach the system bus.
    pub busctl: PathBuf,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            busctl: PathBuf::from("busctl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: Option<SourceConfig>,
    pub mountpoint: PathBuf,
    pub allow_other: bool,
    pub refresh_interval_secs: u64,
    pub sync_user_icons: bool,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub schema: Schema,
    pub sudoers: SudoersConfig,
    pub accounts: AccountsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            mountpoint: PathBuf::from(DEFAULT_MOUNTPOINT),
            allow_other: false,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            sync_user_icons: false,
            log_level: "info".to_string(),
            log_dir: None,
            schema: Schema::default(),
            sudoers: SudoersConfig::default(),
            accounts: AccountsConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`] when it exists.
    /// With neither, the defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Checks needed before mounting or building.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.is_none() {
            return Err(ConfigError::MissingSource);
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))?;
        Ok(())
    }

    pub fn record_source(&self) -> Result<Arc<dyn RecordSource>, ConfigError> {
        self.source
            .as_ref()
            .map(SourceConfig::build)
            .ok_or(ConfigError::MissingSource)
    }

    pub fn build_options(&self) -> BuildOptions {
        let sudoers = self.sudoers.enabled.then(|| {
            let hostname = self.sudoers.hostname.clone().unwrap_or_else(hostname);
            let mut policy =
                SudoersPolicy::new(hostname).with_strip_suffix(self.sudoers.strip_suffix.clone());
            policy.file_name = self.sudoers.file_name.clone();
            policy
        });

        BuildOptions {
            schema: self.schema.clone(),
            sudoers,
        }
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: Duration::from_secs(self.refresh_interval_secs),
            build: self.build_options(),
        }
    }
}

/// This machine's hostname as reported by gethostname(2), falling back to
/// `localhost` when it cannot be read.
pub fn hostname() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().trim().to_string())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mountpoint, PathBuf::from("/run/ldb-fuse/"));
        assert_eq!(config.refresh_interval_secs, 1800);
        assert!(!config.sync_user_icons);
        assert!(config.build_options().sudoers.is_none());
        assert!(matches!(config.validate(), Err(ConfigError::MissingSource)));
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml(
            r#"
            mountpoint = "/mnt/ldb"
            allow_other = true
            refresh_interval_secs = 60
            sync_user_icons = true
            log_level = "debug"

            [source]
            kind = "ldb"
            path = "/var/lib/sss/db/cache_example.ldb"
            filter = "(objectClass=user)"

            [schema]
            multiline_attributes = ["sudoRule"]

            [sudoers]
            enabled = true
            hostname = "ws01"
            strip_suffix = "@ldap.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.mountpoint, PathBuf::from("/mnt/ldb"));
        assert_eq!(
            config.source,
            Some(SourceConfig::Ldb {
                path: PathBuf::from("/var/lib/sss/db/cache_example.ldb"),
                ldbsearch: PathBuf::from("ldbsearch"),
                filter: Some("(objectClass=user)".to_string()),
            })
        );
        // unspecified schema fields keep their defaults
        assert_eq!(config.schema.multiline_attributes, vec!["sudoRule"]);
        assert_eq!(config.schema.photo_attribute, "jpegPhoto");
        config.validate().unwrap();

        let refresh = config.refresh_config();
        assert_eq!(refresh.interval, Duration::from_secs(60));
        let sudoers = refresh.build.sudoers.unwrap();
        assert_eq!(sudoers.hostname, "ws01");
        assert_eq!(sudoers.strip_suffix.as_deref(), Some("@ldap.example.com"));
        assert_eq!(sudoers.file_name, "sudoers.txt");
    }

    #[test]
    fn test_ldif_source() {
        let config = Config::from_toml(
            r#"
            [source]
            kind = "ldif"
            path = "/tmp/export.ldif"
            "#,
        )
        .unwrap();
        let source = config.record_source().unwrap();
        assert!(source.describe().contains("/tmp/export.ldif"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            source: Some(SourceConfig::ldb("/tmp/cache.ldb")),
            ..Config::default()
        };
        config.validate().unwrap();

        config.refresh_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval)));

        config.refresh_interval_secs = 10;
        config.log_level = "chatty".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::LogLevel(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "refresh_interval_secs = 5").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.refresh_interval_secs, 5);

        let missing = Config::load(Some(Path::new("/nonexistent/ldbfs.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "refresh_interval_secs = \"soon\"").unwrap();
        let error = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_hostname_is_never_empty() {
        assert!(!hostname().is_empty());
    }

    #[test]
    fn test_hostname_comes_from_the_system() {
        let system = hostname::get().unwrap();
        assert_eq!(hostname(), system.to_string_lossy().trim());
    }

    #[test]
    fn test_sudoers_host_defaults_to_system_hostname() {
        let config = Config::from_toml("[sudoers]\nenabled = true\n").unwrap();
        let sudoers = config.build_options().sudoers.unwrap();
        assert_eq!(sudoers.hostname, hostname());
    }
}
