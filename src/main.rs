use anyhow::Result;
use clap::Parser;

mod ai;
mod cli;
mod config;
mod finance;
mod handlers;
mod ingest;
mod middleware;
mod parsers;
mod router;
mod schemas;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; the filter is controlled via RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fintrack=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    cli.run().await?;

    Ok(())
}
