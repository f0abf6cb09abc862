use std::fmt;

use bytes::Bytes;
use clap::Args;
use owo_colors::OwoColorize;

use common::decode::ContentType;
use common::tree::LookupError;
use ldbfs_daemon::{build_snapshot, ProcessError};

/// Binary files print at most this many bytes as hex.
const HEX_PREVIEW_BYTES: usize = 512;

/// Build a snapshot once and print one file of it
#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Path inside the projection
    pub path: String,
}

#[derive(Debug)]
pub enum CatContent {
    Text(String),
    Binary { mime: Option<&'static str>, bytes: Bytes },
}

#[derive(Debug)]
pub struct CatOutput {
    pub path: String,
    pub size: u64,
    pub content: CatContent,
}

impl fmt::Display for CatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}  {} {} bytes",
            "File:".dimmed(),
            self.path.bold(),
            "Size:".dimmed(),
            self.size
        )?;
        match &self.content {
            CatContent::Text(text) => write!(f, "{text}"),
            CatContent::Binary { mime, bytes } => {
                if let Some(mime) = mime {
                    writeln!(f, "{} {}", "Type:".dimmed(), mime)?;
                }
                let hex = bytes
                    .iter()
                    .take(HEX_PREVIEW_BYTES)
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "{} {hex}", "Binary content (hex):".dimmed())?;
                if bytes.len() > HEX_PREVIEW_BYTES {
                    write!(f, " {}", "...".dimmed())?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    Build(#[from] ProcessError),
    #[error("cat failed: {0}")]
    Lookup(#[from] LookupError),
}

impl CatContent {
    pub fn classify(content_type: Option<ContentType>, bytes: Bytes) -> Self {
        match content_type {
            Some(ContentType::Image(format)) => CatContent::Binary {
                mime: Some(format.mime_type()),
                bytes,
            },
            Some(ContentType::Text) => match std::str::from_utf8(&bytes) {
                Ok(text) => CatContent::Text(text.to_string()),
                Err(_) => CatContent::Binary { mime: None, bytes },
            },
            _ => CatContent::Binary { mime: None, bytes },
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = CatOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let snapshot = build_snapshot(&ctx.config).await?;
        let node = snapshot.resolve(&self.path)?;
        if node.is_dir() {
            return Err(LookupError::IsADirectory(self.path.clone()).into());
        }

        let size = node.size();
        let bytes = snapshot.read_content(node.ino, 0, size as usize)?;

        Ok(CatOutput {
            path: self.path.clone(),
            size,
            content: CatContent::classify(node.content_type(), bytes),
        })
    }
}
