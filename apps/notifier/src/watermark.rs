//! Watermark Store: per-source "last delivered" timestamps.
//!
//! A watermark means: notices published at or before this instant have already
//! been considered delivered for that source. Watermarks only move forward.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::persist::JsonFile;

const DATA_FILE_MODE: u32 = 0o640;

/// How far back a never-seen source starts.
pub fn initial_lookback() -> Duration {
    Duration::hours(24)
}

/// On-disk shape of the watermark file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatermarkFile {
    /// source id -> time the last delivered notice was published
    pub last_published: BTreeMap<String, DateTime<Utc>>,
}

pub struct WatermarkStore {
    file: JsonFile<WatermarkFile>,
    marks: BTreeMap<String, DateTime<Utc>>,
    default_mark: DateTime<Utc>,
}

impl WatermarkStore {
    /// Opens (or creates) the watermark file. Sources in `source_ids` that the
    /// file has never seen start at `now - 24h`.
    pub fn open<'a>(
        path: impl Into<PathBuf>,
        source_ids: impl IntoIterator<Item = &'a str>,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let default_mark = now - initial_lookback();
        let file = JsonFile::new(path, false, DATA_FILE_MODE);

        let mut seeded = WatermarkFile::default();
        let source_ids: Vec<&str> = source_ids.into_iter().collect();
        for id in &source_ids {
            seeded.last_published.insert(id.to_string(), default_mark);
        }

        let (mut data, _) = file.load_or_init(seeded)?;
        for id in source_ids {
            data.last_published
                .entry(id.to_string())
                .or_insert(default_mark);
        }

        info!(
            "Loaded watermarks for {} source(s) from {}",
            data.last_published.len(),
            file.path().display()
        );

        Ok(Self {
            file,
            marks: data.last_published,
            default_mark,
        })
    }

    pub fn get(&self, source_id: &str) -> DateTime<Utc> {
        self.marks
            .get(source_id)
            .copied()
            .unwrap_or(self.default_mark)
    }

    /// Moves the watermark of `source_id` forward to `at`. Values at or before
    /// the current watermark are ignored. Returns whether the watermark moved.
    pub fn advance(&mut self, source_id: &str, at: DateTime<Utc>) -> bool {
        let current = self.get(source_id);
        if at <= current {
            debug!(source = source_id, %current, rejected = %at, "Ignoring non-forward watermark");
            return false;
        }
        self.marks.insert(source_id.to_string(), at);
        debug!(source = source_id, from = %current, to = %at, "Advanced watermark");
        true
    }

    /// Persists the full mapping. A failure leaves the in-memory state as is.
    pub fn commit(&self) -> Result<(), StoreError> {
        self.file.save(&WatermarkFile {
            last_published: self.marks.clone(),
        })
    }
}
