use std::sync::Arc;

use thiserror::Error;

use prospekt_core::{FlyerListing, FlyerReference, RetailerRegistry, RetailerSource};

use crate::client::HttpClient;
use crate::error::ScraperError;
use crate::formats::{parser_for, FlyerLink};

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("unknown retailer: {0}")]
    UnknownRetailer(String),

    #[error("ordinal must be at least 1, got {0}")]
    InvalidOrdinal(usize),

    #[error("flyer {requested} not found for {retailer}: {available} currently published")]
    FlyerNotFound {
        retailer: String,
        requested: usize,
        available: usize,
    },

    #[error("upstream unavailable for {retailer}: {source}")]
    UpstreamUnavailable {
        retailer: String,
        #[source]
        source: ScraperError,
    },

    #[error("flyer {url} lists no pages")]
    EmptyFlyer { url: String },
}

/// Maps `(retailer, ordinal)` to a concrete flyer and its page locators.
///
/// Ordinals follow the order of the retailer's listing page at fetch time.
/// Two fetches may disagree if the upstream reorders in between; that is
/// accepted rather than papered over with caching.
#[derive(Debug, Clone)]
pub struct FlyerLocator {
    client: HttpClient,
    registry: Arc<RetailerRegistry>,
}

impl FlyerLocator {
    #[must_use]
    pub fn new(client: HttpClient, registry: Arc<RetailerRegistry>) -> Self {
        Self { client, registry }
    }

    #[must_use]
    pub fn registry(&self) -> &RetailerRegistry {
        &self.registry
    }

    /// Currently published flyers of a retailer, in listing order.
    ///
    /// # Errors
    ///
    /// [`LocatorError::UnknownRetailer`] or [`LocatorError::UpstreamUnavailable`].
    pub async fn list_flyers(&self, retailer_key: &str) -> Result<Vec<FlyerListing>, LocatorError> {
        let source = self.source(retailer_key)?;
        let parser = parser_for(source.format);
        let links = self.flyer_links(source).await?;
        Ok(links
            .into_iter()
            .enumerate()
            .map(|(idx, link)| FlyerListing {
                ordinal: idx + 1,
                validity: parser.validity(&link.url),
                title: link.title,
                url: link.url,
            })
            .collect())
    }

    /// Resolves the `ordinal`-th published flyer (1-based) of `retailer_key`.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::UnknownRetailer`] when the key is not configured.
    /// - [`LocatorError::InvalidOrdinal`] for ordinal 0.
    /// - [`LocatorError::FlyerNotFound`] when fewer flyers are published.
    /// - [`LocatorError::UpstreamUnavailable`] when the listing or flyer document
    ///   cannot be retrieved after retries.
    /// - [`LocatorError::EmptyFlyer`] when the flyer document has no pages.
    pub async fn resolve(
        &self,
        retailer_key: &str,
        ordinal: usize,
    ) -> Result<FlyerReference, LocatorError> {
        let source = self.source(retailer_key)?;
        if ordinal == 0 {
            return Err(LocatorError::InvalidOrdinal(ordinal));
        }
        let parser = parser_for(source.format);

        let links = self.flyer_links(source).await?;
        let available = links.len();
        let Some(FlyerLink { url, title }) = links.into_iter().nth(ordinal - 1) else {
            return Err(LocatorError::FlyerNotFound {
                retailer: source.key.clone(),
                requested: ordinal,
                available,
            });
        };

        let html = self
            .client
            .get_text(&url)
            .await
            .map_err(|source_err| LocatorError::UpstreamUnavailable {
                retailer: source.key.clone(),
                source: source_err,
            })?;

        let mut page_locators = parser.page_locators(&url, &html);
        if page_locators.is_empty() {
            return Err(LocatorError::EmptyFlyer { url });
        }
        if page_locators.len() > source.max_pages {
            tracing::warn!(
                retailer = %source.key,
                ordinal,
                pages = page_locators.len(),
                max_pages = source.max_pages,
                "flyer exceeds page limit, dropping trailing pages"
            );
            page_locators.truncate(source.max_pages);
        }

        tracing::info!(
            retailer = %source.key,
            ordinal,
            pages = page_locators.len(),
            url = %url,
            "flyer resolved"
        );

        Ok(FlyerReference {
            retailer_key: source.key.clone(),
            format: source.format,
            ordinal,
            validity: parser.validity(&url),
            title,
            source_url: url,
            page_locators,
        })
    }

    fn source(&self, retailer_key: &str) -> Result<&RetailerSource, LocatorError> {
        self.registry
            .get(retailer_key)
            .ok_or_else(|| LocatorError::UnknownRetailer(retailer_key.to_string()))
    }

    async fn flyer_links(&self, source: &RetailerSource) -> Result<Vec<FlyerLink>, LocatorError> {
        let html = self
            .client
            .get_text(&source.listing_url)
            .await
            .map_err(|err| LocatorError::UpstreamUnavailable {
                retailer: source.key.clone(),
                source: err,
            })?;
        let links = parser_for(source.format).flyer_links(&source.listing_url, &html);
        tracing::debug!(retailer = %source.key, flyers = links.len(), "listing parsed");
        Ok(links)
    }
}
