//! Cycle Scheduler: fetch, route, deliver, commit, sleep, repeat.
//!
//! Cycles never overlap. Watermark advances collected while fetching are only
//! applied when nothing was fetched or at least one subscriber got its mail, so
//! a total delivery failure means the same notices are retried next cycle.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::dispatch::DeliveryReport;
use crate::errors::SourceError;
use crate::router::route;
use crate::source::{AdvisorySource, FetchOutcome};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Routing,
    Delivering,
    Committing,
    Sleeping,
}

/// What happened during one cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Notices newer than their source's watermark, across all sources.
    pub fetched: usize,
    /// Sources that failed both the initial fetch and the retry.
    pub failed_sources: Vec<String>,
    /// Subscribers with at least one routed notice.
    pub routed: usize,
    pub delivery: Option<DeliveryReport>,
    /// Whether watermark advances were applied.
    pub committed: bool,
}

pub struct Scheduler {
    state: AppState,
    phase: CyclePhase,
}

impl Scheduler {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            phase: CyclePhase::Idle,
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(from = ?self.phase, to = ?phase, "Cycle phase");
        self.phase = phase;
    }

    /// Runs cycles until `shutdown` resolves. Shutdown is only observed while
    /// sleeping; a running cycle always finishes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            let started = Instant::now();
            let report = self.run_cycle().await;
            info!(
                fetched = report.fetched,
                failed_sources = report.failed_sources.len(),
                routed = report.routed,
                committed = report.committed,
                "Cycle finished"
            );

            self.enter(CyclePhase::Sleeping);
            let pause = sleep_for(self.state.interval, started.elapsed());
            debug!("Sleeping for {:?}", pause);

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, leaving main loop");
                    break;
                }
            }
            self.enter(CyclePhase::Idle);
        }

        self.enter(CyclePhase::Idle);
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        // ── Fetching ──
        self.enter(CyclePhase::Fetching);
        let mut batch = Vec::new();
        let mut advances: Vec<(String, DateTime<Utc>)> = Vec::new();

        for source in &self.state.sources {
            let since = self.state.watermarks.get(source.id());
            info!("Querying source '{}' for new notices", source.id());

            match fetch_with_retry(source.as_ref(), since).await {
                Ok(outcome) => {
                    if outcome.watermark > since {
                        advances.push((source.id().to_string(), outcome.watermark));
                    }
                    batch.extend(outcome.notices);
                }
                Err(e) => {
                    error!(source = source.id(), "Could not query notices: {e}");
                    report.failed_sources.push(source.id().to_string());
                }
            }
        }
        report.fetched = batch.len();
        debug!("Got {} new notices", batch.len());

        // ── Routing / Delivering ──
        if !batch.is_empty() {
            self.enter(CyclePhase::Routing);
            let routing = route(&self.state.subscribers, &batch);
            report.routed = routing.len();

            self.enter(CyclePhase::Delivering);
            info!("Sending notifications to {} recipient(s)", routing.len());
            let delivery = self
                .state
                .dispatcher
                .deliver(&routing, self.state.renderer.as_ref())
                .await;
            info!(
                "Notifications sent to {} of {} recipients",
                delivery.notified, delivery.attempted
            );
            report.delivery = Some(delivery);
        }

        // ── Committing ──
        self.enter(CyclePhase::Committing);
        let notified = report.delivery.as_ref().map_or(0, |d| d.notified);
        if batch.is_empty() || notified > 0 {
            for (source_id, at) in &advances {
                self.state.watermarks.advance(source_id, *at);
            }
            if let Err(e) = self.state.watermarks.commit() {
                error!("Could not save watermarks: {e}");
            }
            report.committed = true;
        } else if report.routed == 0 {
            info!("No subscriber matched the {} new notice(s), keeping watermarks", batch.len());
        } else {
            error!("Could not notify any recipient, notices will be retried next cycle");
        }

        report
    }
}

/// One attempt plus exactly one immediate retry.
pub async fn fetch_with_retry(
    source: &dyn AdvisorySource,
    since: DateTime<Utc>,
) -> Result<FetchOutcome, SourceError> {
    match source.fetch_since(since).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            warn!(source = source.id(), "Could not query notices, retrying: {e}");
            source.fetch_since(since).await
        }
    }
}

/// Time left in the interval after a cycle that took `elapsed`.
pub fn sleep_for(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}
