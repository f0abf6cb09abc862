pub mod op;
pub mod ops;

use std::path::PathBuf;

use clap::Args;

use ldbfs_daemon::{Config, SourceConfig};

/// Flags accepted by every command. Each one overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct Globals {
    /// Config file (default: /etc/ldbfs/config.toml when present)
    #[arg(long, global = true, env = "LDBFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// LDB database to read with ldbsearch
    #[arg(long, global = true, env = "LDBFS_LDB", conflicts_with = "ldif")]
    pub ldb: Option<PathBuf>,

    /// LDIF export to read instead of an LDB database
    #[arg(long, global = true, env = "LDBFS_LDIF")]
    pub ldif: Option<PathBuf>,

    /// ldbsearch binary (only with --ldb)
    #[arg(long, global = true)]
    pub ldbsearch: Option<PathBuf>,

    /// LDAP search filter passed to ldbsearch (only with --ldb)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, env = "LDBFS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "LDBFS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Globals {
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.ldb {
            config.source = Some(SourceConfig::ldb(path));
        }
        if let Some(path) = &self.ldif {
            config.source = Some(SourceConfig::Ldif { path: path.clone() });
        }

        if let Some(SourceConfig::Ldb {
            ldbsearch, filter, ..
        }) = &mut config.source
        {
            if let Some(program) = &self.ldbsearch {
                *ldbsearch = program.clone();
            }
            if self.filter.is_some() {
                *filter = self.filter.clone();
            }
        }

        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config {
            source: Some(SourceConfig::Ldif {
                path: PathBuf::from("/tmp/old.ldif"),
            }),
            ..Config::default()
        };
        let globals = Globals {
            ldb: Some(PathBuf::from("/var/lib/sss/db/cache.ldb")),
            filter: Some("(uid=*)".to_string()),
            log_level: Some("debug".to_string()),
            ..Globals::default()
        };
        globals.apply(&mut config);

        assert_eq!(
            config.source,
            Some(SourceConfig::Ldb {
                path: PathBuf::from("/var/lib/sss/db/cache.ldb"),
                ldbsearch: PathBuf::from("ldbsearch"),
                filter: Some("(uid=*)".to_string()),
            })
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = Config::default();
        Globals::default().apply(&mut config);
        assert_eq!(config, Config::default());
    }
}
