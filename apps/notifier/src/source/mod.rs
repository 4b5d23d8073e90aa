//! Advisory sources, the feeds notices are fetched from.
//!
//! All feed access goes through the [`AdvisorySource`] trait so the scheduler
//! never depends on one upstream API. `AppState` carries the enabled sources as
//! `Arc<dyn AdvisorySource>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::SourceError;
use crate::models::Notice;

pub mod wid;

pub use wid::{known_endpoint, WidSource};

/// Result of one successful fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Notices published strictly after the watermark passed to the fetch.
    pub notices: Vec<Notice>,
    /// Newest `published_at` among `notices`, or the input watermark if empty.
    pub watermark: DateTime<Utc>,
}

#[async_trait]
pub trait AdvisorySource: Send + Sync {
    /// Stable key used for watermarks and the `api_endpoint` filter.
    fn id(&self) -> &str;

    /// Base URL of the human-facing portal, for links in notifications.
    fn portal_url(&self) -> &str;

    /// Issues one request and returns the notices newer than `since`.
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<FetchOutcome, SourceError>;
}

/// Client-side watermark filtering.
///
/// Upstream "published since" filters are not trusted to be precise, so every
/// source runs its decoded batch through this before returning it.
pub fn retain_newer(notices: Vec<Notice>, since: DateTime<Utc>) -> FetchOutcome {
    let notices: Vec<Notice> = notices
        .into_iter()
        .filter(|n| n.published_at > since)
        .collect();

    let watermark = notices
        .iter()
        .map(|n| n.published_at)
        .max()
        .unwrap_or(since);

    FetchOutcome { notices, watermark }
}
