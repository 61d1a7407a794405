use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("unexpected content type \"{content_type}\" from {url}")]
    UnexpectedContentType { content_type: String, url: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not decode image from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("no page image found in viewer document {url}")]
    MissingViewerImage { url: String },
}

impl ScraperError {
    /// Returns `true` if the error is a transient condition worth retrying after a
    /// backoff delay.
    ///
    /// **Retriable:** network timeouts and connect failures, HTTP 429, HTTP 5xx.
    ///
    /// **Permanent:** 404 and other 4xx statuses, content-type mismatches,
    /// undecodable bodies, malformed URLs. Retrying would return the same result.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            ScraperError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            ScraperError::RateLimited { .. } => true,
            ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
            ScraperError::NotFound { .. }
            | ScraperError::UnexpectedContentType { .. }
            | ScraperError::InvalidUrl { .. }
            | ScraperError::Decode { .. }
            | ScraperError::MissingViewerImage { .. } => false,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScraperError::Http(e) if e.is_timeout())
    }
}
