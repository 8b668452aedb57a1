use anyhow::Result;
use clap::Parser;
use poster::{api, config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let cfg = config::Config::load(&cli)?;
    let level = if cfg.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().json().with_max_level(level).init();
    let state = api::AppState::new(cfg)?;
    api::run_http_server(state).await
}
