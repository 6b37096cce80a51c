// src/main.rs - Command-line entry point
use std::path::{Path, PathBuf};

use clap::Parser;
use procsim::shared::{ConfigError, Policy, SimConfig, load_config};
use procsim::{Simulation, SimulationInput};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Parser, Debug)]
#[command(name = "procsim", about = "Simulates a non-preemptive process scheduler backed by LRU virtual memory.")]
struct Cli {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process list: `arrival burst` pairs
    #[arg(long, default_value = "processes.txt")]
    processes: PathBuf,

    /// Memory command list, one per line
    #[arg(long, default_value = "commands.txt")]
    commands: PathBuf,

    /// File holding the main-memory capacity
    #[arg(long, default_value = "memconfig.txt")]
    memconfig: PathBuf,

    /// Trace output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Mirror the disk tier to this file
    #[arg(long)]
    disk: Option<PathBuf>,

    /// round-robin or shortest-remaining
    #[arg(long)]
    policy: Option<Policy>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut SimConfig) {
        if let Some(output) = &self.output {
            config.trace.output = output.clone();
        }
        if let Some(disk) = &self.disk {
            config.memory.disk_path = Some(disk.clone());
        }
        if let Some(policy) = self.policy {
            config.scheduler.policy = policy;
        }
        if let Some(seed) = self.seed {
            config.scheduler.seed = Some(seed);
        }
        if self.verbose {
            config.trace.log_level = "debug".to_string();
        }
    }
}

/// Loads the config file, if any, logging failures through a temporary
/// subscriber since the configured log level is not known yet.
fn load_startup_config<W>(path: Option<&Path>, level: tracing::Level, writer: W) -> Result<SimConfig, ConfigError>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let startup = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(startup, || match path {
        Some(path) => load_config(path).map_err(|e| {
            tracing::error!("Failed to load config from '{}': {}", path.display(), e);
            e
        }),
        None => Ok(SimConfig::default()),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let startup_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let loaded = load_startup_config(cli.config.as_deref(), startup_level, std::io::stderr);
    let mut config = loaded?;
    cli.apply(&mut config);

    let level = config
        .trace
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting procsim {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli.config {
        tracing::info!("Configuration loaded from {}", path.display());
    }

    let input = SimulationInput::load(&config, &cli.processes, &cli.commands, &cli.memconfig)
        .await
        .map_err(|e| {
            tracing::error!("Failed to read input: {}", e);
            e
        })?;
    let simulation = Simulation::new(config, input).map_err(|e| {
        tracing::error!("Refusing to start: {}", e);
        e
    })?;

    match simulation.run().await {
        Ok(report) => {
            tracing::info!(
                "Done at {:.0}: {} process(es), {} command(s), peak {} slot(s) in use",
                report.final_time,
                report.summary.processes.len(),
                report.commands_executed,
                report.peak_slots
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Simulation aborted: {}", e);
            Err(e.into())
        }
    }
}
