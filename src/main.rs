//! wggen - Main Entry Point

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wggen::{auth::TokenClient, output, Cli, Pipeline, Settings, WgGenError};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("wggen v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("{} stage failed: {}", e.stage(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), WgGenError> {
    let settings: Settings = cli.into_settings()?;
    settings.log_summary();

    tracing::info!("Starting WireGuard configuration generation");

    let token = TokenClient::new(settings.token_url.clone())?
        .fetch_token(&settings.username, &settings.password)
        .await?;

    let pipeline = Pipeline::from_settings(&settings)?;
    let selection = pipeline.run(&token).await?;

    let paths = output::write_outputs(
        &settings.output_dir,
        &selection.region,
        &selection.tunnel,
        settings.port_forward,
    )?;

    tracing::info!("WireGuard configuration generation completed successfully");
    tracing::info!("Configuration: {}", paths.config.display());
    tracing::info!("Metadata: {}", paths.metadata.display());
    Ok(())
}
