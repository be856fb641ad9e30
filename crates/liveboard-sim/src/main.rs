//! Headless Liveboard driver.
//!
//! Runs a JSON script of pointer events and commands for several peers
//! sharing one room through an in-process relay, then prints every peer's
//! final render frame.
//!
//! ```text
//! liveboard-sim scripts/two-peers.json --config board.json
//! ```

mod relay;
mod script;

use clap::Parser;
use liveboard_core::BoardConfig;
use script::{Script, Simulation};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

/// Liveboard headless multi-peer simulator.
#[derive(Parser, Debug)]
#[command(name = "liveboard-sim", about = "Replay a multi-peer Liveboard session without a UI")]
struct CliArgs {
    /// Script describing the peers and their steps.
    #[arg(value_name = "SCRIPT.json")]
    script: PathBuf,

    /// Board configuration; missing fields take their defaults.
    #[arg(short, long, value_name = "CONFIG.json")]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum SimError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] liveboard_core::ConfigError),
    #[error(transparent)]
    Script(#[from] script::ScriptError),
    #[error("Failed to encode frames: {0}")]
    Output(#[from] serde_json::Error),
}

fn read(path: &Path) -> Result<String, SimError> {
    std::fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn run(args: &CliArgs) -> Result<String, SimError> {
    let config = match &args.config {
        Some(path) => BoardConfig::from_json(&read(path)?)?,
        None => BoardConfig::default(),
    };
    let script = Script::from_json(&read(&args.script)?)?;
    log::info!(
        "Running {} step(s) for {} peer(s) in room {}",
        script.steps.len(),
        script.peers.len(),
        script.room
    );

    let mut sim = Simulation::new(&script, &config);
    sim.run(&script.steps)?;
    Ok(serde_json::to_string_pretty(&sim.frames())?)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = CliArgs::parse();

    match run(&args) {
        Ok(frames) => {
            println!("{frames}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
