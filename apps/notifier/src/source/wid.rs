//! WID portal client (Warn- und Informationsdienst of LSI Bayern and CERT-Bund).
//!
//! The public `securityAdvisory` endpoint returns a JSON page whose `content`
//! array holds the advisories, newest first. Its `publishedFromFilter`
//! parameter only honours the day, so it is not used; watermark filtering
//! happens client-side via [`retain_newer`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::USER_AGENT, Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{retain_newer, AdvisorySource, FetchOutcome};
use crate::errors::SourceError;
use crate::models::{Notice, UNKNOWN_BASE_SCORE};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/118.0";

/// Fixed query: the largest backlog the API hands out, newest first.
const QUERY: &[(&str, &str)] = &[
    ("size", "1000"),
    ("sort", "published,desc"),
    ("aboFilter", "false"),
];

/// A WID deployment the notifier knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub id: &'static str,
    pub url: &'static str,
    pub portal_url: &'static str,
}

pub const KNOWN_ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        id: "bay",
        url: "https://wid.lsi.bayern.de/content/public/securityAdvisory",
        portal_url: "https://wid.lsi.bayern.de/portal/wid/securityadvisory",
    },
    Endpoint {
        id: "bund",
        url: "https://wid.cert-bund.de/content/public/securityAdvisory",
        portal_url: "https://wid.cert-bund.de/portal/wid/securityadvisory",
    },
];

pub fn known_endpoint(id: &str) -> Option<&'static Endpoint> {
    KNOWN_ENDPOINTS.iter().find(|e| e.id == id)
}

pub struct WidSource {
    client: Client,
    id: String,
    url: String,
    portal_url: String,
}

impl WidSource {
    /// `client` should carry a request timeout; it is shared by all sources.
    pub fn new(client: Client, endpoint: &Endpoint) -> Self {
        Self {
            client,
            id: endpoint.id.to_string(),
            url: endpoint.url.to_string(),
            portal_url: endpoint.portal_url.to_string(),
        }
    }
}

#[async_trait]
impl AdvisorySource for WidSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn portal_url(&self) -> &str {
        &self.portal_url
    }

    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<FetchOutcome, SourceError> {
        debug!(source = %self.id, url = %self.url, %since, "Querying endpoint");

        let response = self
            .client
            .get(&self.url)
            .query(QUERY)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text().await?;
        let notices = parse_page(&body, &self.id, &self.portal_url)?;
        let received = notices.len();

        let outcome = retain_newer(notices, since);
        info!(
            source = %self.id,
            received,
            new = outcome.notices.len(),
            "Fetched notices"
        );
        Ok(outcome)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Payload decoding
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Page {
    content: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotice {
    uuid: String,
    name: String,
    title: String,
    classification: String,
    published: String,
    basescore: Option<f64>,
    status: Option<String>,
    product_names: Option<Vec<String>>,
    cves: Option<Vec<String>>,
    no_patch: Option<bool>,
}

#[derive(Debug, Error)]
enum ItemError {
    #[error("unexpected shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("unparseable published timestamp '{value}': {source}")]
    Published {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Decodes one response page. A malformed page is an error; a malformed item
/// is dropped with a warning and its siblings are still returned.
fn parse_page(body: &str, source_id: &str, portal_url: &str) -> Result<Vec<Notice>, SourceError> {
    let page: Page = serde_json::from_str(body)?;

    let mut notices = Vec::with_capacity(page.content.len());
    for (index, item) in page.content.into_iter().enumerate() {
        match decode_item(item, source_id, portal_url) {
            Ok(notice) => notices.push(notice),
            Err(e) => warn!(source = source_id, index, "Dropping malformed notice: {e}"),
        }
    }
    Ok(notices)
}

fn decode_item(
    item: serde_json::Value,
    source_id: &str,
    portal_url: &str,
) -> Result<Notice, ItemError> {
    let raw: RawNotice = serde_json::from_value(item)?;

    let published_at = DateTime::parse_from_rfc3339(&raw.published)
        .map_err(|source| ItemError::Published {
            value: raw.published.clone(),
            source,
        })?
        .with_timezone(&Utc);

    let portal_url = notice_portal_url(portal_url, &raw.name);

    Ok(Notice {
        uuid: raw.uuid,
        title: raw.title,
        classification: raw.classification,
        published_at,
        base_score: raw.basescore.map(|s| s as i32).unwrap_or(UNKNOWN_BASE_SCORE),
        status: raw.status.unwrap_or_default(),
        product_names: raw.product_names.unwrap_or_default(),
        cve_ids: raw.cves.unwrap_or_default(),
        no_patch: raw.no_patch,
        source_id: source_id.to_string(),
        portal_url,
        name: raw.name,
    })
}

fn notice_portal_url(base: &str, name: &str) -> String {
    Url::parse_with_params(base, &[("name", name)])
        .map(String::from)
        .unwrap_or_else(|_| format!("{base}?name={name}"))
}
