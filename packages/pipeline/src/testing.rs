//! Mock collaborators for testing pipeline logic without network or LLM calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{FetchError, PipelineError};
use crate::traits::{Extraction, Extractor, FetchedPage, Fetcher};
use crate::types::ExtractedTruck;

/// Scripted fetch results keyed by URL, with call tracking.
#[derive(Default)]
pub struct MockFetcher {
    pages: Mutex<HashMap<String, String>>,
    errors: Mutex<HashMap<String, String>>,
    /// Deny this many calls with a transient error before succeeding
    transient_failures: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `markdown` for `url`.
    pub fn with_page(self, url: impl Into<String>, markdown: impl Into<String>) -> Self {
        self.pages.lock().unwrap().insert(url.into(), markdown.into());
        self
    }

    /// Fail `url` with a connection error carrying `message`.
    pub fn with_error(self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.lock().unwrap().insert(url.into(), message.into());
        self
    }

    /// Fail the first `count` calls with a timeout, then behave normally.
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// URLs this fetcher was asked to scrape, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn scrape(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(FetchError::Timeout {
                url: url.to_string(),
            });
        }

        if let Some(message) = self.errors.lock().unwrap().get(url) {
            return Err(FetchError::Connection(message.clone()));
        }

        match self.pages.lock().unwrap().get(url) {
            Some(markdown) => Ok(FetchedPage {
                url: url.to_string(),
                markdown: markdown.clone(),
                source_url: None,
                title: None,
            }),
            None => Err(FetchError::Http {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// Scripted extraction results, with call tracking.
#[derive(Default)]
pub struct MockExtractor {
    /// Result served for any source URL without a specific script
    default_truck: Mutex<Option<ExtractedTruck>>,
    trucks: Mutex<HashMap<String, ExtractedTruck>>,
    error: Mutex<Option<String>>,
    tokens_used: Mutex<Option<u64>>,
    calls: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `truck` for every extraction.
    pub fn with_truck(self, truck: ExtractedTruck) -> Self {
        *self.default_truck.lock().unwrap() = Some(truck);
        self
    }

    /// Serve `truck` for a specific source URL.
    pub fn with_truck_for(self, source_url: impl Into<String>, truck: ExtractedTruck) -> Self {
        self.trucks.lock().unwrap().insert(source_url.into(), truck);
        self
    }

    /// Fail every extraction with `message`.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        *self.error.lock().unwrap() = Some(message.into());
        self
    }

    /// Report `tokens` consumed per extraction.
    pub fn with_tokens_used(self, tokens: u64) -> Self {
        *self.tokens_used.lock().unwrap() = Some(tokens);
        self
    }

    /// Source URLs this extractor was invoked for, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, _markdown: &str, source_url: &str) -> Result<Extraction, PipelineError> {
        self.calls.lock().unwrap().push(source_url.to_string());

        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(PipelineError::Extraction(message.clone()));
        }

        let truck = self
            .trucks
            .lock()
            .unwrap()
            .get(source_url)
            .cloned()
            .or_else(|| self.default_truck.lock().unwrap().clone())
            .ok_or_else(|| PipelineError::Extraction("no structured payload".to_string()))?;

        Ok(Extraction {
            truck,
            tokens_used: *self.tokens_used.lock().unwrap(),
        })
    }
}
