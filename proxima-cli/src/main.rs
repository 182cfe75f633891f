//! Proxima CLI
//!
//! Command-line interface for inspecting and waiting on cluster tasks.

mod commands;
mod config;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "proxima")]
#[command(about = "Proxmox VE task CLI", long_about = None)]
struct Cli {
    /// Cluster API endpoint
    #[arg(long, env = "PROXIMA_ENDPOINT", default_value = "https://localhost:8006")]
    endpoint: String,

    /// API token (USER@REALM!TOKENID=SECRET)
    #[arg(long, env = "PROXIMA_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "PROXIMA_INSECURE")]
    insecure: bool,

    /// Timeout for a single HTTP request, in seconds
    #[arg(long, env = "PROXIMA_REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proxima_cli=info,proxima_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        endpoint: cli.endpoint,
        api_token: cli.api_token,
        insecure: cli.insecure,
        request_timeout: Duration::from_secs(cli.request_timeout),
    };

    handle_command(cli.command, &config).await
}
