use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use prospekt_core::{
    AppConfig, FailureStage, FlyerListing, FlyerReference, FlyerResult, FlyerSummary,
    PageLocator, PageOutcome, RetailerRegistry,
};
use prospekt_detect::{Detect, RefineOptions};
use prospekt_extract::ProductExtractor;
use prospekt_scraper::{FlyerFetcher, FlyerLocator};

use crate::error::PipelineError;
use crate::page::{detect_page, failed, fetch_failed, timed_out};

/// Tunables of a pipeline run that do not change per request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub iou_threshold: f32,
    pub class_names: Vec<String>,
    pub grouping_proximity: f32,
    /// Upper bound on simultaneous model invocations across all requests.
    pub max_concurrent_inferences: usize,
    /// Whole-request deadline. Pages unfinished at the deadline become
    /// timeout failures; finished pages are kept.
    pub request_timeout: Duration,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            iou_threshold: config.iou_threshold,
            class_names: config.class_names.clone(),
            grouping_proximity: config.grouping_proximity,
            max_concurrent_inferences: config.max_concurrent_inferences,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Flyer-to-detections orchestrator: locate, fetch, detect, optionally
/// extract products, aggregate.
///
/// Cheap to clone; clones share the detector and the inference permits.
#[derive(Clone)]
pub struct Pipeline {
    locator: FlyerLocator,
    fetcher: FlyerFetcher,
    detector: Arc<dyn Detect>,
    inference_permits: Arc<Semaphore>,
    refine: Arc<RefineOptions>,
    grouping_proximity: f32,
    request_timeout: Duration,
    extractor: Option<Arc<ProductExtractor>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("locator", &self.locator)
            .field("fetcher", &self.fetcher)
            .field("refine", &self.refine)
            .field("grouping_proximity", &self.grouping_proximity)
            .field("request_timeout", &self.request_timeout)
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(
        locator: FlyerLocator,
        fetcher: FlyerFetcher,
        detector: Arc<dyn Detect>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            locator,
            fetcher,
            detector,
            inference_permits: Arc::new(Semaphore::new(settings.max_concurrent_inferences.max(1))),
            refine: Arc::new(RefineOptions {
                iou_threshold: settings.iou_threshold,
                class_names: settings.class_names,
            }),
            grouping_proximity: settings.grouping_proximity,
            request_timeout: settings.request_timeout,
            extractor: None,
        }
    }

    /// Enables product extraction on every successfully detected page.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<ProductExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Resolved model id of the product extractor, if one is configured.
    #[must_use]
    pub fn extractor_model(&self) -> Option<&str> {
        self.extractor.as_deref().map(ProductExtractor::model)
    }

    #[must_use]
    pub fn registry(&self) -> &RetailerRegistry {
        self.locator.registry()
    }

    /// Currently published flyers of a retailer.
    ///
    /// # Errors
    ///
    /// Propagates [`prospekt_scraper::LocatorError`] wrapped in [`PipelineError::Locator`].
    pub async fn list_flyers(&self, retailer_key: &str) -> Result<Vec<FlyerListing>, PipelineError> {
        Ok(self.locator.list_flyers(retailer_key).await?)
    }

    /// Runs detection over every page of the `ordinal`-th published flyer.
    ///
    /// Per-page failures are recorded in the result in place of the page.
    /// The result always has one entry per page locator, in page order.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidThreshold`] if the threshold is outside `[0, 1]`
    /// - [`PipelineError::Locator`] if the flyer cannot be resolved
    /// - [`PipelineError::Timeout`] if resolving does not finish before the deadline
    /// - [`PipelineError::FlyerUnprocessable`] if no page could be processed
    pub async fn run(
        &self,
        retailer_key: &str,
        ordinal: usize,
        confidence_threshold: f32,
    ) -> Result<FlyerResult, PipelineError> {
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(PipelineError::InvalidThreshold(confidence_threshold));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let deadline = Instant::now() + self.request_timeout;
        tracing::info!(%run_id, retailer = retailer_key, ordinal, confidence_threshold, "pipeline run started");

        tracing::debug!(%run_id, "locating");
        let reference = tokio::time::timeout_at(deadline, self.locator.resolve(retailer_key, ordinal))
            .await
            .map_err(|_| PipelineError::Timeout(self.request_timeout.as_secs()))??;

        tracing::debug!(%run_id, pages = reference.page_count(), "fetching and detecting");
        let pages = self.process_pages(&reference, confidence_threshold, deadline).await;

        tracing::debug!(%run_id, "aggregating");
        let summary = FlyerSummary::from_pages(&pages);
        if summary.pages_ok == 0 {
            tracing::warn!(%run_id, retailer = retailer_key, ordinal, pages = pages.len(), "every page failed");
            return Err(PipelineError::FlyerUnprocessable {
                retailer: reference.retailer_key,
                ordinal,
                pages: pages.len(),
            });
        }

        let finished_at = Utc::now();
        tracing::info!(
            %run_id,
            retailer = retailer_key,
            ordinal,
            pages_ok = summary.pages_ok,
            pages_failed = summary.pages_failed,
            detections = summary.detections,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "pipeline run finished"
        );

        Ok(FlyerResult {
            run_id,
            retailer_key: reference.retailer_key,
            ordinal: reference.ordinal,
            title: reference.title,
            source_url: reference.source_url,
            validity: reference.validity,
            confidence_threshold,
            started_at,
            finished_at,
            summary,
            pages,
        })
    }

    async fn process_pages(
        &self,
        reference: &FlyerReference,
        confidence_threshold: f32,
        deadline: Instant,
    ) -> Vec<PageOutcome> {
        let timeout_secs = self.request_timeout.as_secs();
        let mut pages: Vec<PageOutcome> = stream::iter(reference.pages())
            .map(|(page_number, locator)| {
                async move {
                    let work = self.process_page(
                        reference,
                        page_number,
                        locator,
                        confidence_threshold,
                        deadline,
                    );
                    match tokio::time::timeout_at(deadline, work).await {
                        Ok((outcome, page_bytes)) => {
                            self.extract_products(outcome, page_bytes, deadline).await
                        }
                        Err(_) => timed_out(page_number, timeout_secs),
                    }
                }
            })
            .boxed()
            .buffer_unordered(self.fetcher.max_concurrent_pages())
            .collect()
            .await;
        pages.sort_by_key(PageOutcome::page_number);
        pages
    }

    async fn process_page(
        &self,
        reference: &FlyerReference,
        page_number: usize,
        locator: &PageLocator,
        confidence_threshold: f32,
        deadline: Instant,
    ) -> (PageOutcome, Option<Vec<u8>>) {
        let page = match self
            .fetcher
            .fetch_page(reference.format, page_number, locator)
            .await
        {
            Ok(page) => page,
            Err(failure) => return (fetch_failed(&failure), None),
        };
        let page_bytes = self.extractor.as_ref().map(|_| page.bytes.clone());

        let Ok(permit) = Arc::clone(&self.inference_permits).acquire_owned().await else {
            let outcome = failed(page_number, FailureStage::Inference, &"inference pool closed");
            return (outcome, None);
        };
        let detector = Arc::clone(&self.detector);
        let options = Arc::clone(&self.refine);
        let proximity = self.grouping_proximity;
        // Dropping this future at the deadline does not stop the blocking task;
        // it re-checks the deadline itself so abandoned pages release the permit.
        let deadline = deadline.into_std();
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            detect_page(
                detector.as_ref(),
                page,
                confidence_threshold,
                &options,
                proximity,
                deadline,
            )
        })
        .await;

        let outcome =
            joined.unwrap_or_else(|err| failed(page_number, FailureStage::Inference, &err));
        (outcome, page_bytes)
    }

    /// Runs the product extractor over a detected page. Pages that failed,
    /// or runs without an extractor, pass through unchanged.
    async fn extract_products(
        &self,
        outcome: PageOutcome,
        page_bytes: Option<Vec<u8>>,
        deadline: Instant,
    ) -> PageOutcome {
        match (outcome, &self.extractor, page_bytes) {
            (PageOutcome::Ok(page), Some(extractor), Some(bytes)) => {
                PageOutcome::Ok(extractor.annotate_page(bytes, page, deadline).await)
            }
            (outcome, _, _) => outcome,
        }
    }
}
