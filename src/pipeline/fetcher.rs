use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::FetchConfig;

const BODY_PREVIEW_CHARS: usize = 180;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed GET request {locator}: {source}")]
    Request {
        locator: String,
        source: reqwest::Error,
    },
    #[error("GET {locator} returned {status}: {preview}")]
    Status {
        locator: String,
        status: u16,
        preview: String,
    },
    #[error("{locator} unavailable: {reason}")]
    Unavailable { locator: String, reason: String },
}

/// Raw bytes of one observed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub locator: String,
    pub body: Vec<u8>,
}

impl RawDocument {
    pub fn new(locator: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            locator: locator.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<RawDocument, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<RawDocument, FetchError> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                locator: locator.to_string(),
                source,
            })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                locator: locator.to_string(),
                source,
            })?;
        if !status.is_success() {
            let preview: String = String::from_utf8_lossy(&body)
                .chars()
                .take(BODY_PREVIEW_CHARS)
                .collect();
            return Err(FetchError::Status {
                locator: locator.to_string(),
                status: status.as_u16(),
                preview,
            });
        }
        debug!(locator, bytes = body.len(), "fetched document");
        Ok(RawDocument::new(locator, body.to_vec()))
    }
}

/// Serves documents from memory, keyed by locator. Unknown locators fail.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    documents: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, locator: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.insert(locator, body);
        self
    }

    pub fn insert(&mut self, locator: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.documents.insert(locator.into(), body.into());
    }
}

#[async_trait]
impl DocumentFetcher for StaticFetcher {
    async fn fetch(&self, locator: &str) -> Result<RawDocument, FetchError> {
        self.documents
            .get(locator)
            .map(|body| RawDocument::new(locator, body.clone()))
            .ok_or_else(|| FetchError::Unavailable {
                locator: locator.to_string(),
                reason: "no document registered".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_fetcher_serves_registered_documents() {
        let fetcher = StaticFetcher::new().with_document("mem://a", "<html></html>");
        let doc = tokio_test::block_on(fetcher.fetch("mem://a")).expect("document");
        assert_eq!(doc.body, b"<html></html>".to_vec());

        let err = tokio_test::block_on(fetcher.fetch("mem://b")).expect_err("missing");
        assert!(err.to_string().contains("mem://b"));
    }

    #[test]
    fn http_fetcher_builds_from_defaults() {
        assert!(HttpFetcher::new(&FetchConfig::default()).is_ok());
    }
}
