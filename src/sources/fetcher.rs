use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::warn;

use crate::config::FetchConfig;
use crate::core::error::IocError;

const BINARY_CONTENT_TYPES: &[&str] = &[
    "image/",
    "audio/",
    "video/",
    "application/octet-stream",
    "application/zip",
    "application/pdf",
];

/// A successfully retrieved feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<FetchedDocument, IocError>;
}

/// Fetches `http(s)://` locations over the network and reads anything else
/// from the local filesystem.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, IocError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(IocError::from)?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &str) -> Result<FetchedDocument, IocError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = &content_type {
            let lowered = ct.to_lowercase();
            if BINARY_CONTENT_TYPES.iter().any(|b| lowered.starts_with(b)) {
                return Err(IocError::Fetch(format!("non-text content type: {}", ct)));
            }
        }
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "feed returned non-success status");
        }

        let body = response.text().await?;
        Ok(FetchedDocument {
            status_code: Some(status.as_u16()),
            content_type,
            body,
        })
    }

    async fn fetch_file(&self, path: &Path) -> Result<FetchedDocument, IocError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IocError::Fetch(format!("{}: {}", path.display(), e)))?;
        let body = String::from_utf8(bytes)
            .map_err(|_| IocError::Fetch(format!("{}: not valid UTF-8 text", path.display())))?;
        Ok(FetchedDocument {
            status_code: None,
            content_type: None,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, location: &str) -> Result<FetchedDocument, IocError> {
        let lowered = location.to_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            self.fetch_http(location).await
        } else {
            self.fetch_file(Path::new(location)).await
        }
    }
}
