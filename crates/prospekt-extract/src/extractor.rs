use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use prospekt_core::{ExtractedProduct, ExtractorSettings, PageResult, ProductExtraction};
use prospekt_scraper::HttpClient;

use crate::crop::crop_groups;
use crate::error::ExtractError;
use crate::gemini::{
    parse_product, resolve_model, GenerateRequest, GenerateResponse, API_KEY_HEADER,
};

/// Reads product name and price from cropped flyer regions through a
/// `generateContent` vision endpoint.
///
/// Requests are issued one at a time and spaced at least `min_interval`
/// apart across all callers sharing the extractor.
pub struct ProductExtractor {
    client: HttpClient,
    api_key: String,
    model: String,
    endpoint: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for ProductExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductExtractor")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}

impl ProductExtractor {
    #[must_use]
    pub fn new(client: HttpClient, settings: &ExtractorSettings) -> Self {
        let model = resolve_model(&settings.model);
        let endpoint = format!(
            "{}/v1beta/models/{model}:generateContent",
            settings.base_url.trim_end_matches('/')
        );
        Self {
            client,
            api_key: settings.api_key.clone(),
            model,
            endpoint,
            min_interval: Duration::from_millis(settings.min_interval_ms),
            last_request: Mutex::new(None),
        }
    }

    /// Model id requests are sent to, after alias resolution.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extracts one product from a JPEG crop.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Request`] when the endpoint fails after
    /// retries, [`ExtractError::EmptyResponse`] when the answer has no text
    /// and [`ExtractError::Parse`] when the text is not the expected JSON.
    pub async fn extract(&self, jpeg: &[u8]) -> Result<ExtractedProduct, ExtractError> {
        let body = GenerateRequest::for_jpeg(jpeg);
        let response: GenerateResponse = {
            let mut last = self.last_request.lock().await;
            if let Some(previous) = *last {
                tokio::time::sleep_until(previous + self.min_interval).await;
            }
            *last = Some(Instant::now());
            self.client
                .post_json(&self.endpoint, &[(API_KEY_HEADER, self.api_key.as_str())], &body)
                .await?
        };
        let text = response.text().ok_or(ExtractError::EmptyResponse)?;
        parse_product(&text)
    }

    /// Fills `extraction` on every product group of `page`, cropping from
    /// the original `page_bytes`.
    ///
    /// Never fails: a group whose crop or request fails, or that is reached
    /// after `deadline`, is marked [`ProductExtraction::Failed`].
    pub async fn annotate_page(
        &self,
        page_bytes: Vec<u8>,
        mut page: PageResult,
        deadline: Instant,
    ) -> PageResult {
        if page.products.is_empty() {
            return page;
        }

        let snapshot = page.clone();
        let crops =
            match tokio::task::spawn_blocking(move || crop_groups(&page_bytes, &snapshot)).await {
                Ok(Ok(crops)) => crops,
                Ok(Err(e)) => return mark_all_failed(page, &e.to_string()),
                Err(e) => return mark_all_failed(page, &format!("crop task failed: {e}")),
            };

        let mut extracted = 0usize;
        for (group, crop) in page.products.iter_mut().zip(crops) {
            let outcome = match crop {
                None => ProductExtraction::Failed {
                    reason: "group covers no pixels".to_string(),
                },
                Some(_) if Instant::now() >= deadline => ProductExtraction::Failed {
                    reason: "request deadline reached before extraction".to_string(),
                },
                Some(jpeg) => match timeout_at(deadline, self.extract(&jpeg)).await {
                    Ok(Ok(product)) => {
                        extracted += 1;
                        ProductExtraction::Ok(product)
                    }
                    Ok(Err(e)) => {
                        warn!(page = page.page_number, error = %e, "product extraction failed");
                        ProductExtraction::Failed {
                            reason: e.to_string(),
                        }
                    }
                    Err(_) => ProductExtraction::Failed {
                        reason: "request deadline reached during extraction".to_string(),
                    },
                },
            };
            group.extraction = Some(outcome);
        }

        debug!(
            page = page.page_number,
            groups = page.products.len(),
            extracted,
            "extracted products"
        );
        page
    }
}

fn mark_all_failed(mut page: PageResult, reason: &str) -> PageResult {
    warn!(page = page.page_number, reason, "could not crop product groups");
    for group in &mut page.products {
        group.extraction = Some(ProductExtraction::Failed {
            reason: reason.to_string(),
        });
    }
    page
}
