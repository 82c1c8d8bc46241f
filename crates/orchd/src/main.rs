use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use orch_config::OrchdConfig;
use orch_runtime::lifecycle::{Reactor, wait_for_signal};
use orch_runtime::tracing_init::init_tracing;

#[derive(Parser)]
#[command(name = "orchd", about = "Switch orchestration daemons")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestration daemons
    Run {
        /// Path to the orchd.toml config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config_path = config
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("config path '{}': {e}", config.display()))?;
            let orchd_config = OrchdConfig::load(&config_path)?;
            let base_dir = config_path
                .parent()
                .expect("config path must have a parent directory");

            let _guard = init_tracing(&orchd_config.logging, base_dir)?;

            let reactor = Reactor::start(orchd_config, base_dir)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            tracing::info!(domain = "sys", listen = %reactor.listen_addr(), "orchd started");

            wait_for_signal(reactor.cancel_token()).await;
            reactor.shutdown();
            reactor.wait().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        }
    }

    Ok(())
}
