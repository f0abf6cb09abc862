use anyhow::Context;
use clap::Parser;

mod cli;

use cli::op::{Op, OpContext};
use cli::ops::Command;
use cli::Globals;

use ldbfs_daemon::{logging, Config};

#[derive(Parser, Debug)]
#[command(name = "ldbfs", version, about = "Mount an LDB directory database as a read-only filesystem")]
struct Cli {
    #[command(flatten)]
    globals: Globals,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.globals.config.as_deref()).context("loading configuration")?;
    cli.globals.apply(&mut config);

    let _log_guard = logging::init(&config.log_level, config.log_dir.as_deref());

    let ctx = OpContext::new(config);
    match cli.command.execute(&ctx).await {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(error) => {
            tracing::error!(%error, "command failed");
            Err(error.into())
        }
    }
}
