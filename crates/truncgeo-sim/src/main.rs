//! truncgeo-sim: replays synthetic markets through the oracle.
//!
//! A volatile market (every move far beyond the cap) should push the cap to
//! its ceiling; a calm market (every move inside the floor) should let it
//! decay to its floor. Cap events are logged as they start and end, and the
//! final state is printed as JSON.
//!
//! Usage: `truncgeo-sim [--config <path>]`, or set `TRUNCGEO_CONFIG`.

mod config;
mod runner;
mod scenario;

use std::path::PathBuf;

use tracing::info;

use crate::config::SimConfig;

fn config_arg() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => Ok(None),
        Some("--config") => match args.next() {
            Some(path) => Ok(Some(PathBuf::from(path))),
            None => anyhow::bail!("--config requires a path"),
        },
        Some(other) => anyhow::bail!("unknown argument: {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SimConfig::load(config_arg()?)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("truncgeo={}", config.logging.level).parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(kind = ?config.scenario.kind, "truncgeo-sim starting");

    tokio::select! {
        result = runner::run(&config) => {
            let report = result?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, stopping simulation");
        }
    }

    Ok(())
}
