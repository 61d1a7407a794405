mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "prospekt-cli")]
#[command(about = "Locate retailer flyers and detect sale items on their pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the flyers a retailer currently publishes.
    Flyers {
        #[arg(long)]
        retailer: String,
    },
    /// Run detection over one flyer and print the result as JSON.
    Detect {
        #[arg(long)]
        retailer: String,
        /// 1-based position in the retailer's flyer listing.
        #[arg(long, default_value_t = 1)]
        ordinal: usize,
        /// Overrides `PROSPEKT_CONFIDENCE_THRESHOLD`.
        #[arg(long)]
        confidence: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = prospekt_core::load_app_config()?;
    // stdout carries the JSON result; logs go to stderr
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Flyers { retailer } => commands::run_flyers(&config, &retailer).await,
        Commands::Detect {
            retailer,
            ordinal,
            confidence,
        } => commands::run_detect(&config, &retailer, ordinal, confidence).await,
    }
}

#[cfg(test)]
mod tests;
