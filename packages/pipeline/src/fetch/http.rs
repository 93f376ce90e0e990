//! HTTP page fetcher: reqwest + HTML-to-Markdown conversion.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::FetchError;
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{FetchedPage, Fetcher};

/// Fetches pages over plain HTTP and converts HTML bodies to Markdown.
///
/// Transient failures (timeouts, connection errors, 5xx/429/408) are retried
/// in-call with the configured backoff; everything else surfaces immediately.
pub struct HttpFetcher {
    client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("curbside-atlas-pipeline/0.1")
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn validate_url(url: &str) -> Result<url::Url, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }
        Ok(parsed)
    }

    async fn fetch_once(&self, url: &url::Url) -> Result<(String, String, bool), FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, url.as_str()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("text/html"))
            .unwrap_or(true);

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e, url.as_str()))?;

        Ok((body, final_url, is_html))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn scrape(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = Self::validate_url(url)?;

        let outcome = with_retry(
            &self.retry_policy,
            |error: &FetchError, _attempt| error.is_transient(),
            |_attempt| self.fetch_once(&parsed),
        )
        .await;

        let (body, final_url, is_html) = outcome.result?;

        let markdown = if is_html {
            match htmd::HtmlToMarkdown::new().convert(&body) {
                Ok(markdown) => markdown,
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "markdown conversion failed, using raw body");
                    body
                }
            }
        } else {
            body
        };

        if markdown.trim().is_empty() {
            return Err(FetchError::EmptyContent {
                url: url.to_string(),
            });
        }

        tracing::info!(
            url = %url,
            content_length = markdown.len(),
            attempts = outcome.attempts,
            "page fetched"
        );

        Ok(FetchedPage {
            url: url.to_string(),
            markdown,
            source_url: (final_url != url).then_some(final_url),
            title: None,
        })
    }
}

fn classify_reqwest_error(error: &reqwest::Error, url: &str) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = error.status() {
        FetchError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        }
    } else {
        FetchError::Connection(error.to_string())
    }
}
