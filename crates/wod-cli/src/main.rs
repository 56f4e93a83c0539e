//! wireguard-on-demand
//!
//! Brings up a disposable WireGuard exit host (`update`) and prints the
//! client config to stdout, or tears the host down (`destroy`).
//! Logs go to stderr so stdout stays pipeable into a `.conf` file.

mod cli;
mod orchestrator;
mod settings;

use crate::cli::Intent;
use crate::orchestrator::{Orchestrator, RunError};
use crate::settings::{SETTINGS_FILE, Settings};
use anyhow::Result;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wod_stack::PulumiCli;
use wod_wireguard::OsKeySource;

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    let intent = match cli::parse(&args) {
        Ok(intent) => intent,
        Err(usage) => {
            error!(args = ?usage.args, "Unexpected arguments");
            return Err(usage.into());
        }
    };

    run(intent).await?;
    Ok(())
}

async fn run(intent: Intent) -> Result<(), RunError> {
    let settings = Settings::load_or_default(Path::new(SETTINGS_FILE))?;
    let engine = PulumiCli::new(&settings.deployment.work_dir);

    let mut orchestrator = Orchestrator::new(engine, OsKeySource, settings);
    orchestrator.run(intent, &mut std::io::stdout()).await?;

    info!(?intent, "Done");
    Ok(())
}
