use chrono::{DateTime, Utc};
use serde::Serialize;

/// Base score reported for notices whose source does not publish one.
pub const UNKNOWN_BASE_SCORE: i32 = -1;

/// A single advisory item as delivered by one source.
///
/// Notices are never mutated after decoding. `uuid` is the identity used for
/// de-duplication and render caching, `published_at` for ordering and as the
/// watermark comparison key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub uuid: String,
    pub name: String,
    pub title: String,
    pub classification: String,
    pub published_at: DateTime<Utc>,

    // Optional fields, only fully populated by some sources.
    pub base_score: i32,            // UNKNOWN_BASE_SCORE = unknown
    pub status: String,             // "" = unknown
    pub product_names: Vec<String>, // empty = unknown
    pub cve_ids: Vec<String>,       // empty = unknown
    pub no_patch: Option<bool>,     // None = unknown

    pub source_id: String,
    pub portal_url: String,
}

impl Notice {
    pub fn has_base_score(&self) -> bool {
        self.base_score > UNKNOWN_BASE_SCORE
    }
}
