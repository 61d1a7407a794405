//! Subcommand handlers. Each prints its result to stdout as pretty JSON.

use std::sync::Arc;

use anyhow::Context as _;

use prospekt_core::AppConfig;
use prospekt_detect::{Detector, DetectorConfig};
use prospekt_extract::ProductExtractor;
use prospekt_pipeline::{Pipeline, PipelineSettings};
use prospekt_scraper::{FlyerFetcher, FlyerLocator, HttpClient};

fn build_locator(config: &AppConfig) -> anyhow::Result<(HttpClient, FlyerLocator)> {
    let registry = prospekt_core::load_retailers(&config.retailers_path)?;
    let client = HttpClient::from_config(config)
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
    let locator = FlyerLocator::new(client.clone(), Arc::new(registry));
    Ok((client, locator))
}

/// Prints the flyers a retailer currently publishes.
///
/// # Errors
///
/// Returns an error if the registry cannot be loaded or the listing cannot be read.
pub(crate) async fn run_flyers(config: &AppConfig, retailer: &str) -> anyhow::Result<()> {
    let (_, locator) = build_locator(config)?;
    let flyers = locator.list_flyers(retailer).await?;
    if flyers.is_empty() {
        tracing::warn!(retailer, "listing contains no flyers");
    }
    println!("{}", serde_json::to_string_pretty(&flyers)?);
    Ok(())
}

/// Loads the model, runs the pipeline once and prints the `FlyerResult`.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded, the flyer cannot be
/// resolved, or none of its pages could be processed.
pub(crate) async fn run_detect(
    config: &AppConfig,
    retailer: &str,
    ordinal: usize,
    confidence: Option<f32>,
) -> anyhow::Result<()> {
    let (client, locator) = build_locator(config)?;
    let detector = Detector::load(&DetectorConfig::from_app_config(config))
        .context("detection model failed to load")?;

    let mut pipeline = Pipeline::new(
        locator,
        FlyerFetcher::new(client.clone(), config.scraper_max_concurrent_pages),
        Arc::new(detector),
        PipelineSettings::from_app_config(config),
    );
    if let Some(settings) = &config.extractor {
        pipeline = pipeline.with_extractor(Arc::new(ProductExtractor::new(client, settings)));
    }
    let confidence = confidence.unwrap_or(config.confidence_threshold);
    let result = pipeline.run(retailer, ordinal, confidence).await?;

    if result.summary.pages_failed > 0 {
        tracing::warn!(
            pages_failed = result.summary.pages_failed,
            pages_ok = result.summary.pages_ok,
            "some pages could not be processed"
        );
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
