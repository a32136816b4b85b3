//! Paper Search MCP Server - Entry point
//!
//! Serves authenticated MCP tools for searching a directory of PDF papers.

use clap::Parser;
use paper_search_mcp::{run_server, Cli, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paper_search_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::try_from(Cli::parse())?;

    tracing::info!("Starting Paper Search MCP Server");

    run_server(config).await
}
