//! Trellis server binary.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trellis::ServerConfig;

#[derive(Parser)]
#[command(name = "trellis", version, about = "Visual AI workflow platform")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Path to the configuration file.
        #[arg(long, default_value = "trellis.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => {
            let config = ServerConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let router = trellis::bootstrap(&config).await?;

            let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
                .await
                .with_context(|| format!("binding port {}", config.port))?;
            info!(port = config.port, "trellis listening");
            axum::serve(listener, router).await?;
        }
    }
    Ok(())
}
