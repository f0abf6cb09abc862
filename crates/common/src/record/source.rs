//! Record sources: the narrow interface the refresh path pulls records from.

use std::path::PathBuf;

use async_trait::async_trait;

use super::ldif::{self, LdifError};
use super::Record;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("record source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record data: {0}")]
    Malformed(#[from] LdifError),
}

/// Anything that can enumerate the current set of directory records.
///
/// Callable repeatedly; each call returns the view at that moment.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn enumerate_records(&self) -> Result<Vec<Record>, SourceError>;

    /// Short human-readable description used in log lines.
    fn describe(&self) -> String;
}

/// Reads an LDIF export from disk.
#[derive(Debug, Clone)]
pub struct LdifFileSource {
    path: PathBuf,
}

impl LdifFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for LdifFileSource {
    async fn enumerate_records(&self) -> Result<Vec<Record>, SourceError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(ldif::parse(&content)?)
    }

    fn describe(&self) -> String {
        format!("ldif:{}", self.path.display())
    }
}

/// Queries an LDB database through the `ldbsearch` tool.
///
/// `ldbsearch` only reads the database, which matters because LDB will
/// happily rewrite a file it was pointed at by mistake when opened for
/// writing. Binary values come back base64 encoded.
#[derive(Debug, Clone)]
pub struct LdbSearchSource {
    db_path: PathBuf,
    program: PathBuf,
    filter: Option<String>,
}

impl LdbSearchSource {
    pub const DEFAULT_PROGRAM: &'static str = "ldbsearch";

    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            program: PathBuf::from(Self::DEFAULT_PROGRAM),
            filter: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.arg("-H").arg(&self.db_path);
        if let Some(filter) = &self.filter {
            command.arg(filter);
        }
        command.stdin(std::process::Stdio::null());
        command
    }
}

#[async_trait]
impl RecordSource for LdbSearchSource {
    async fn enumerate_records(&self) -> Result<Vec<Record>, SourceError> {
        let output = self.command().output().await.map_err(|e| {
            SourceError::Unavailable(format!("failed to run {}: {}", self.program.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let records = ldif::parse(&output.stdout)?;

        // LDB keeps its own bookkeeping in special records such as
        // @ATTRIBUTES and @INDEXLIST.
        let (special, records): (Vec<Record>, Vec<Record>) = records
            .into_iter()
            .partition(|record| record.id.as_bytes().starts_with(b"@"));
        if !special.is_empty() {
            tracing::debug!(count = special.len(), "ignoring LDB special records");
        }

        Ok(records)
    }

    fn describe(&self) -> String {
        format!("ldb:{}", self.db_path.display())
    }
}
