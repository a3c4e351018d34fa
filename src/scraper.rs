//! One ingestion cycle: pick the stalest feed, fetch it, store its new items.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{Database, NewPost, StoreError};
use crate::fetcher::{FeedItem, FetchError, Fetcher};

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Reasons a cycle stopped before storing anything. None of them are fatal.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no feeds to fetch")]
    NoFeeds,
    #[error("failed to select next feed: {0}")]
    Store(#[source] StoreError),
    #[error("failed to mark feed {feed_id} as fetched: {source}")]
    MarkFetched {
        feed_id: i64,
        #[source]
        source: StoreError,
    },
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// What one completed cycle did with its feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    pub items_seen: usize,
    pub posts_created: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Items stored without a timestamp because their date did not parse
    pub undated: usize,
}

pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_str(raw.trim(), PUB_DATE_FORMAT).map(|dt| dt.with_timezone(&Utc))
}

/// Runs a single ingestion cycle against the feed polled longest ago.
///
/// The feed is marked fetched before the request goes out, so a feed that
/// keeps failing still moves to the back of the queue. Item-level failures
/// are logged and counted; they never end the cycle early.
pub async fn scrape_next_feed(db: &Database, fetcher: &Fetcher) -> Result<CycleReport, CycleError> {
    let feed = match db.next_feed_to_fetch().await {
        Ok(feed) => feed,
        Err(StoreError::NotFound) => return Err(CycleError::NoFeeds),
        Err(e) => return Err(CycleError::Store(e)),
    };

    let feed = db
        .mark_feed_fetched(feed.id)
        .await
        .map_err(|source| CycleError::MarkFetched {
            feed_id: feed.id,
            source,
        })?;

    info!(feed = %feed.name, url = %feed.url, "Fetching feed");
    let document = fetcher
        .fetch(&feed.url)
        .await
        .map_err(|source| CycleError::Fetch {
            url: feed.url.clone(),
            source,
        })?;

    let mut report = CycleReport {
        feed_id: feed.id,
        feed_name: feed.name.clone(),
        items_seen: document.channel.items.len(),
        ..Default::default()
    };

    for item in &document.channel.items {
        store_item(db, feed.id, item, &mut report).await;
    }

    info!(
        feed = %report.feed_name,
        items = report.items_seen,
        created = report.posts_created,
        duplicates = report.duplicates,
        failed = report.failed,
        "Feed collected"
    );
    Ok(report)
}

async fn store_item(db: &Database, feed_id: i64, item: &FeedItem, report: &mut CycleReport) {
    let published_at = match parse_pub_date(&item.pub_date) {
        Ok(at) => Some(at),
        Err(e) => {
            warn!(link = %item.link, pub_date = %item.pub_date, error = %e, "Unparsable publication date");
            report.undated += 1;
            None
        }
    };

    let post = NewPost {
        feed_id,
        title: &item.title,
        url: &item.link,
        description: &item.description,
        published_at,
    };

    match db.create_post(&post).await {
        Ok(created) => {
            debug!(title = %created.title, "New post added");
            report.posts_created += 1;
        }
        Err(StoreError::Duplicate { .. }) => {
            debug!(url = %item.link, "Post already stored, skipping");
            report.duplicates += 1;
        }
        Err(e) => {
            warn!(url = %item.link, error = %e, "Failed to store post");
            report.failed += 1;
        }
    }
}
