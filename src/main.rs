//! ganda - make http requests in parallel

use anyhow::Result;
use clap::Parser;
use ganda_core::{Pipeline, PipelineIo};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    // contractual status lines own stderr; tracing only speaks up on RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    if let Some(cli::Commands::Echoserver { port, delay_millis }) = &cli.command {
        ganda_echoserver::serve(*port, *delay_millis).await?;
        return Ok(());
    }

    let config = cli.into_config()?;
    let io = PipelineIo::standard(&config)?;
    let pipeline = Pipeline::new(config)?;
    pipeline.run_with_signal_handling(io).await?;

    Ok(())
}
