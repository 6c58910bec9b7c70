//! ML Studio server entry point.

use clap::Parser;
use mlstudio::server::{run_server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "mlstudio", about = "Training and evaluation backend for tabular ML")]
struct Cli {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding uploaded datasets
    #[arg(long)]
    data_dir: Option<String>,

    /// Directory holding preprocessed datasets
    #[arg(long)]
    processed_dir: Option<String>,

    /// Directory for persisted models
    #[arg(long)]
    models_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mlstudio=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::default();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.processed_dir {
        config.processed_dir = dir;
    }
    if let Some(dir) = cli.models_dir {
        config.models_dir = dir;
    }

    run_server(config).await
}
