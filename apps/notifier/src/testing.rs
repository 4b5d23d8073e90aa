//! In-memory doubles for the source, renderer and transport capabilities.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::{RenderError, SourceError, TransportError};
use crate::models::Notice;
use crate::render::{NoticeRenderer, RenderedDocument};
use crate::source::{retain_newer, AdvisorySource, FetchOutcome};
use crate::transport::DocumentSender;

/// Returns scripted responses, one per call; runs out into errors.
pub struct ScriptedSource {
    id: String,
    responses: Mutex<VecDeque<Result<Vec<Notice>, SourceError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(id: &str, responses: Vec<Result<Vec<Notice>, SourceError>>) -> Self {
        Self {
            id: id.to_string(),
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failure() -> Result<Vec<Notice>, SourceError> {
        Err(SourceError::Status {
            status: 503,
            url: "https://feed.invalid/".to_string(),
        })
    }
}

#[async_trait]
impl AdvisorySource for ScriptedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn portal_url(&self) -> &str {
        "https://portal.invalid/"
    }

    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<FetchOutcome, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Self::failure);
        next.map(|notices| retain_newer(notices, since))
    }
}

/// Renders `subject = uuid`, counts invocations, fails for chosen uuids.
#[derive(Default)]
pub struct CountingRenderer {
    pub calls: AtomicUsize,
    pub failing: HashSet<String>,
}

impl CountingRenderer {
    pub fn failing_for(uuids: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: uuids.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NoticeRenderer for CountingRenderer {
    fn render(&self, notice: &Notice) -> Result<RenderedDocument, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&notice.uuid) {
            let reason = handlebars::RenderErrorReason::Other(format!("cannot render {}", notice.uuid));
            return Err(RenderError::Render(reason.into()));
        }
        Ok(RenderedDocument {
            subject: notice.uuid.clone(),
            body: format!("{} published {}", notice.title, notice.published_at),
        })
    }
}

/// Records every batch it is asked to send; fails for chosen recipients.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, Vec<Arc<RenderedDocument>>)>>,
    pub failing: HashSet<String>,
    pub fail_all: bool,
}

impl RecordingSender {
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            failing: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    /// Subjects sent to `to`, in send order.
    pub fn subjects_for(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(address, _)| address == to)
            .flat_map(|(_, docs)| docs.iter().map(|d| d.subject.clone()))
            .collect()
    }

    pub fn batches(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentSender for RecordingSender {
    async fn send(
        &self,
        _from: &str,
        to: &str,
        documents: &[Arc<RenderedDocument>],
    ) -> Result<(), TransportError> {
        if self.fail_all || self.failing.contains(to) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), documents.to_vec()));
        Ok(())
    }
}
