use std::path::PathBuf;

use clap::{Parser, Subcommand};
use manager_core::ManagerConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Scale-to-zero manager for the engine-care inference worker.
#[derive(Debug, Parser)]
#[command(name = "enginecare", version)]
struct Cli {
    /// Config file (defaults to $ENGINECARE_CONFIG or ./enginecare.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the proxy and idle reaper (default).
    Serve {
        /// Listen port, overriding config and environment.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the derived worker state.
    Status,
    /// Stop the worker container now.
    Stop,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,enginecare=info,tower_http=warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let mut config =
        ManagerConfig::load_with(cli.config.as_deref(), &manager_core::env::process_env)?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.listen_port = port;
            }
            runtime::serve(config)
        }
        Command::Status => {
            let state = runtime::status(&config)?;
            stdio::raw(&format!("{}: {}", config.worker.name, state));
            Ok(())
        }
        Command::Stop => {
            if runtime::stop(&config)? {
                stdio::success("CONTAINER", &format!("Stopped {}", config.worker.name));
            } else {
                stdio::info("CONTAINER", &format!("{} is not running", config.worker.name));
            }
            Ok(())
        }
    }
}
