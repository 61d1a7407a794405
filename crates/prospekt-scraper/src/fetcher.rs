use std::io::Cursor;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use prospekt_core::{FlyerPage, FlyerReference, ListingFormat, PageLocator};

use crate::client::HttpClient;
use crate::error::ScraperError;
use crate::formats::parser_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureReason {
    Timeout,
    NotFound,
    DecodeError,
    /// Retries exhausted on a transient error, or a non-retriable status.
    Unavailable,
}

impl std::fmt::Display for FetchFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailureReason::Timeout => write!(f, "timeout"),
            FetchFailureReason::NotFound => write!(f, "not found"),
            FetchFailureReason::DecodeError => write!(f, "decode error"),
            FetchFailureReason::Unavailable => write!(f, "unavailable"),
        }
    }
}

impl From<&ScraperError> for FetchFailureReason {
    fn from(err: &ScraperError) -> Self {
        match err {
            e if e.is_timeout() => FetchFailureReason::Timeout,
            ScraperError::NotFound { .. } => FetchFailureReason::NotFound,
            ScraperError::UnexpectedContentType { .. }
            | ScraperError::Decode { .. }
            | ScraperError::MissingViewerImage { .. } => FetchFailureReason::DecodeError,
            _ => FetchFailureReason::Unavailable,
        }
    }
}

/// A page that could not be retrieved; stands in for the page's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page_number} ({url}): {reason}: {message}")]
pub struct PageFetchFailure {
    pub page_number: usize,
    pub url: String,
    pub reason: FetchFailureReason,
    pub message: String,
}

pub type PageFetchResult = Result<FlyerPage, PageFetchFailure>;

/// Downloads flyer pages with bounded concurrency.
#[derive(Debug, Clone)]
pub struct FlyerFetcher {
    client: HttpClient,
    max_concurrent_pages: usize,
}

impl FlyerFetcher {
    #[must_use]
    pub fn new(client: HttpClient, max_concurrent_pages: usize) -> Self {
        Self {
            client,
            max_concurrent_pages: max_concurrent_pages.max(1),
        }
    }

    #[must_use]
    pub fn max_concurrent_pages(&self) -> usize {
        self.max_concurrent_pages
    }

    /// Fetches every page of `reference`, one result per page locator.
    ///
    /// A failing page never aborts the others. The output is ordered by page
    /// number regardless of completion order.
    pub async fn fetch(&self, reference: &FlyerReference) -> Vec<PageFetchResult> {
        let mut results: Vec<(usize, PageFetchResult)> = stream::iter(reference.pages())
            .map(|(page_number, locator)| async move {
                let result = self
                    .fetch_page(reference.format, page_number, locator)
                    .await;
                (page_number, result)
            })
            .buffer_unordered(self.max_concurrent_pages)
            .collect()
            .await;
        results.sort_by_key(|(page_number, _)| *page_number);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Fetches a single page. Viewer documents are fetched first and their
    /// main image downloaded afterwards; both reads go through the retry policy.
    ///
    /// # Errors
    ///
    /// Returns a [`PageFetchFailure`] classifying why the page is unusable.
    pub async fn fetch_page(
        &self,
        format: ListingFormat,
        page_number: usize,
        locator: &PageLocator,
    ) -> PageFetchResult {
        match self.download(format, locator).await {
            Ok((source_url, bytes)) => {
                decode_page(page_number, source_url, bytes).map_err(|err| {
                    failure(page_number, locator, &err)
                })
            }
            Err(err) => Err(failure(page_number, locator, &err)),
        }
    }

    async fn download(
        &self,
        format: ListingFormat,
        locator: &PageLocator,
    ) -> Result<(String, Vec<u8>), ScraperError> {
        let image_url = match locator {
            PageLocator::Image { url } => url.clone(),
            PageLocator::Viewer { url } => {
                let html = self.client.get_text(url).await?;
                parser_for(format)
                    .viewer_image(url, &html)
                    .ok_or_else(|| ScraperError::MissingViewerImage { url: url.clone() })?
            }
        };
        let bytes = self.client.get_image(&image_url).await?;
        Ok((image_url, bytes))
    }
}

fn decode_page(
    page_number: usize,
    source_url: String,
    bytes: Vec<u8>,
) -> Result<FlyerPage, ScraperError> {
    let decode_err = |reason: String| ScraperError::Decode {
        url: source_url.clone(),
        reason,
    };
    let (width, height) = image::ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .into_dimensions()
        .map_err(|e| decode_err(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(decode_err("image has zero area".to_string()));
    }
    Ok(FlyerPage {
        page_number,
        source_url,
        bytes,
        width,
        height,
    })
}

fn failure(page_number: usize, locator: &PageLocator, err: &ScraperError) -> PageFetchFailure {
    let failure = PageFetchFailure {
        page_number,
        url: locator.url().to_string(),
        reason: FetchFailureReason::from(err),
        message: err.to_string(),
    };
    tracing::warn!(
        page = page_number,
        url = %failure.url,
        reason = %failure.reason,
        error = %err,
        "page fetch failed"
    );
    failure
}
