mod api;
mod middleware;

use std::sync::Arc;

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

use prospekt_detect::{Detector, DetectorConfig};
use prospekt_extract::ProductExtractor;
use prospekt_pipeline::{Pipeline, PipelineSettings};
use prospekt_scraper::{FlyerFetcher, FlyerLocator, HttpClient};

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(prospekt_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = prospekt_core::load_retailers(&config.retailers_path)?;
    tracing::info!(retailers = ?registry.keys(), "retailer registry loaded");

    // A model that cannot be loaded must stop the process before it serves anything.
    let detector = Detector::load(&DetectorConfig::from_app_config(&config))
        .context("detection model failed to load; refusing to start")?;
    let model = Arc::new(detector.info().clone());

    let client = HttpClient::from_config(&config)?;
    let mut pipeline = Pipeline::new(
        FlyerLocator::new(client.clone(), Arc::new(registry)),
        FlyerFetcher::new(client.clone(), config.scraper_max_concurrent_pages),
        Arc::new(detector),
        PipelineSettings::from_app_config(&config),
    );
    if let Some(settings) = &config.extractor {
        let extractor = ProductExtractor::new(client, settings);
        tracing::info!(model = extractor.model(), "product extraction enabled");
        pipeline = pipeline.with_extractor(Arc::new(extractor));
    }

    let auth = AuthState::from_env();
    let app = build_app(
        AppState {
            pipeline,
            model,
            default_confidence: config.confidence_threshold,
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
