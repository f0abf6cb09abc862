use std::fmt;

use clap::Args;
use comfy_table::Table;

use common::tree::{DirEntry, LookupError, NodeType};
use ldbfs_daemon::{build_snapshot, ProcessError};

/// Build a snapshot once and list a directory of it
#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Path inside the projection (defaults to root)
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug)]
pub struct LsOutput {
    pub items: Vec<DirEntry>,
}

impl fmt::Display for LsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "No items found");
        }

        let mut table = Table::new();
        table.set_header(vec!["TYPE", "NAME", "SIZE", "INODE"]);
        for item in &self.items {
            let type_str = match item.kind {
                NodeType::Directory => "dir",
                NodeType::File => "file",
            };
            table.add_row(vec![
                type_str.to_string(),
                item.name.clone(),
                item.size.to_string(),
                item.ino.to_string(),
            ]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Build(#[from] ProcessError),
    #[error("ls failed: {0}")]
    Lookup(#[from] LookupError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = LsOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let snapshot = build_snapshot(&ctx.config).await?;
        let items = snapshot.list_children(&self.path)?;

        Ok(LsOutput { items })
    }
}
