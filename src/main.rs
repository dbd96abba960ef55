use anyhow::Result;
use clap::Parser;
use medscribe::app;
use medscribe::cli::{Cli, Commands};
use medscribe::config::Config;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs stay out of the way of the live transcript unless RUST_LOG asks.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medscribe=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Record {
            device,
            language,
            max_duration,
        } => {
            app::run_record(config, device, language, max_duration, cli.quiet).await?;
        }
        Commands::Transcribe { file, language } => {
            app::run_transcribe(config, &file, language, cli.quiet).await?;
        }
        Commands::Report {
            conversation,
            assessment,
        } => {
            app::run_report(config, &conversation, assessment).await?;
        }
        Commands::Sessions { limit } => {
            app::run_sessions(config, limit)?;
        }
        Commands::Devices => {
            app::run_devices()?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Config {
    let config = match path {
        Some(path) => Config::load_or_default(path),
        None => Config::load_or_default(&Config::default_path()),
    };
    config.with_env_overrides()
}
