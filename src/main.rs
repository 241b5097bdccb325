use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

mod client;
mod console;
mod conversation;
mod dashboard;
mod history;
mod panel;
mod server;
mod settings;
mod upstream;

#[cfg(test)]
mod test_support;

use client::{DirectAgent, RelayClient};
use settings::{DashboardDefaults, RelaySettings};
use upstream::UpstreamClient;

#[derive(Debug, Parser)]
#[command(name = "agent-duet")]
#[command(about = "Talk to two remote agents side by side", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the relay that holds the agent credentials.
    Start {
        #[arg(long, env = "RELAY_LISTEN", default_value = "127.0.0.1:7171")]
        listen: String,
    },
    /// Open the two-panel console.
    Console {
        #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:7171")]
        relay: Url,
        /// Call the agents directly with credentials from the environment.
        #[arg(long)]
        direct: bool,
    },
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen } => {
            let addr: SocketAddr = listen.parse()?;
            let settings = RelaySettings::from_env()?;
            let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
            let state = server::AppState::new(settings).with_metrics(recorder);
            server::serve(addr, state, shutdown_signal()).await?;
        }
        Commands::Console { relay, direct } => {
            let defaults = DashboardDefaults::from_env()?;
            let http = reqwest::Client::new();
            if direct {
                let settings = RelaySettings::from_env()?;
                let dashboard = console::build_dashboard(&defaults, [None, None], |key| {
                    DirectAgent::new(settings.agent(key).cloned().map(|s| UpstreamClient::new(http.clone(), s)))
                });
                console::run(dashboard).await?;
            } else {
                tracing::info!(%relay, "using relay");
                let dashboard = console::build_dashboard(&defaults, [None, None], |key| {
                    RelayClient::new(http.clone(), relay.clone(), key)
                });
                console::run(dashboard).await?;
            }
        }
    }
    Ok(())
}
