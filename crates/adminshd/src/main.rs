#![forbid(unsafe_code)]

//! # adminshd
//!
//! Serves the SSH administrative console.
//!
//! ## Usage
//!
//! ```bash
//! adminshd --config /etc/adminsh.toml -v
//! ```

use adminshd::{Cli, Config, logging};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    let config = Config::resolve(&cli).context("failed to load configuration")?;

    if cli.check {
        println!("configuration ok: {}", adminshd::summary(&config));
        return Ok(());
    }

    logging::init(cli.log_level()).map_err(|e| anyhow::anyhow!(e))?;
    adminshd::run(config).await?;
    Ok(())
}
