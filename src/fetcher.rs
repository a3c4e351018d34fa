use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = "gator/0.1 (RSS Aggregator)";

#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// DNS, connection, TLS, timeout or body read failure
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body is not a readable RSS document
    #[error("malformed feed: {0}")]
    Malformed(String),
}

/// An RSS 2.0 document as served by the feed.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeedDocument {
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Channel {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "item")]
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FeedItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    /// Raw publication date; interpreted by the ingestion cycle
    #[serde(default, rename = "pubDate")]
    pub pub_date: String,
}

pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument, FetchError> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| FetchError::Malformed(format!("body is not UTF-8: {e}")))?;
    quick_xml::de::from_str(xml).map_err(|e| FetchError::Malformed(e.to_string()))
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<FeedDocument, FetchError> {
        debug!(url, "Fetching feed");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        parse_document(&bytes)
    }
}
