//! ticketai CLI entrypoint

use anyhow::Result;
use clap::Parser;

use ticketai::cli::{init_tracing, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configuration decides the default log level, so load it first
    let loaded = cli.load_config()?;
    init_tracing(cli.log_format, &loaded.config.log_level);

    cli.execute(loaded).await
}
