//! CLI Entry Point for biofum
//!
//! Opens a session on the Tango stage, runs one command, and closes the
//! session again.
//!
//! # Usage
//!
//! ```bash
//! biofum position
//! biofum move 250 --axis z --relative
//! biofum --config rig.toml set-velocity z 15
//! ```

use anyhow::{Context, Result};
use biofum::cli::{self, Cli};
use biofum::config::BiofumConfig;
use biofum::logging;
use clap::Parser;
use tracing::{error, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BiofumConfig::load_from(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config)?;

    info!(config = %cli.config.display(), command = ?cli.command, "Starting biofum");

    let mut stage = cli::open_stage(&config.stage)?;
    let outcome = cli::execute(&mut stage, &cli.command);

    if let Err(err) = stage.close() {
        error!(error = %err, "Failed to close stage session");
    }

    let output = outcome?;
    println!("{}", output);
    Ok(())
}
