use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use prospekt_core::AppConfig;

use crate::error::ScraperError;
use crate::retry::retry_with_backoff;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml";
const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/png,image/jpeg,image/*;q=0.8";

/// HTTP client for retailer listing pages, viewer documents, page images and
/// the product extraction endpoint.
///
/// Handles rate limiting (429), not-found (404) and other non-2xx responses as
/// typed errors. Transient errors are retried with exponential backoff up to
/// `max_retries` additional attempts; permanent ones are returned at once.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    /// Maximum number of retry attempts after the first failure.
    max_retries: u32,
    backoff_base_ms: u64,
}

impl HttpClient {
    /// Creates an `HttpClient` with configured timeout, `User-Agent`, and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_ms,
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the client cannot be constructed.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Self::new(
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
            config.scraper_max_retries,
            config.scraper_retry_backoff_base_ms,
        )
    }

    /// Fetches an HTML document, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`] / [`ScraperError::Http`] after all retries are exhausted.
    /// - [`ScraperError::NotFound`] / [`ScraperError::UnexpectedStatus`] for non-2xx statuses.
    pub async fn get_text(&self, url: &str) -> Result<String, ScraperError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self.send(url, ACCEPT_HTML).await?;
            Ok(response.text().await?)
        })
        .await
    }

    /// Fetches an image resource, retrying transient failures.
    ///
    /// A response declaring a non-image content type fails permanently with
    /// [`ScraperError::UnexpectedContentType`]. A missing content type is
    /// accepted; the bytes are validated by the decoder instead.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::get_text`], plus [`ScraperError::UnexpectedContentType`].
    pub async fn get_image(&self, url: &str) -> Result<Vec<u8>, ScraperError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self.send(url, ACCEPT_IMAGE).await?;
            if let Some(content_type) = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
            {
                if !is_image_content_type(content_type) {
                    return Err(ScraperError::UnexpectedContentType {
                        content_type: content_type.to_owned(),
                        url: url.to_owned(),
                    });
                }
            }
            Ok(response.bytes().await?.to_vec())
        })
        .await
    }

    /// POSTs a JSON body and decodes a JSON response, retrying transient failures.
    ///
    /// `headers` are added to every attempt. Keep secrets in headers rather
    /// than the URL; the URL appears in errors and logs.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::get_text`]. A response body that is not the
    /// expected JSON fails permanently with [`ScraperError::Http`].
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<T, ScraperError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let mut request = self
                .client
                .post(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .json(body);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let response = check_status(request.send().await?, url)?;
            Ok(response.json::<T>().await?)
        })
        .await
    }

    async fn send(&self, url: &str, accept: &str) -> Result<Response, ScraperError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await?;
        check_status(response, url)
    }
}

/// Maps non-2xx statuses to typed errors.
fn check_status(response: Response, url: &str) -> Result<Response, ScraperError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(ScraperError::RateLimited {
            url: url.to_owned(),
            retry_after_secs,
        });
    }

    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(ScraperError::NotFound {
            url: url.to_owned(),
        });
    }

    if !status.is_success() {
        return Err(ScraperError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }

    Ok(response)
}

fn is_image_content_type(value: &str) -> bool {
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/") || mime == "application/octet-stream" || mime == "binary/octet-stream"
}
