//! Render cache and dispatcher: renders routed notices once per cycle and
//! hands each subscriber's batch to the mail transport.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::errors::{AppError, RenderError};
use crate::models::Notice;
use crate::render::{NoticeRenderer, RenderedDocument};
use crate::router::Routing;
use crate::transport::DocumentSender;

/// Rendered documents keyed by notice uuid, scoped to one delivery call.
/// The same notice usually goes to several subscribers per cycle. Failed
/// renders are remembered as `None`; rendering is a pure function of the
/// notice, so a retry within the call would fail the same way.
#[derive(Default)]
pub struct RenderCache {
    documents: HashMap<String, Option<Arc<RenderedDocument>>>,
    hits: usize,
    misses: usize,
}

impl RenderCache {
    /// Returns the error only the first time a notice fails to render;
    /// later lookups of the same notice yield `Ok(None)`.
    pub fn get_or_render(
        &mut self,
        notice: &Notice,
        renderer: &dyn NoticeRenderer,
    ) -> Result<Option<Arc<RenderedDocument>>, RenderError> {
        if let Some(cached) = self.documents.get(&notice.uuid) {
            self.hits += 1;
            return Ok(cached.clone());
        }

        self.misses += 1;
        match renderer.render(notice) {
            Ok(document) => {
                let document = Arc::new(document);
                self.documents
                    .insert(notice.uuid.clone(), Some(Arc::clone(&document)));
                Ok(Some(document))
            }
            Err(e) => {
                self.documents.insert(notice.uuid.clone(), None);
                Err(e)
            }
        }
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}

/// Outcome of one delivery call.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Subscribers present in the routing.
    pub attempted: usize,
    /// Subscribers whose whole batch was accepted by the transport.
    pub notified: usize,
    /// The last render or transport error encountered, if any.
    pub last_error: Option<AppError>,
}

pub struct Dispatcher {
    sender: Arc<dyn DocumentSender>,
    from: String,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn DocumentSender>, from: String) -> Self {
        Self { sender, from }
    }

    /// Renders and sends every routed batch. Failures are isolated: a notice
    /// that fails to render is skipped for that subscriber, a subscriber whose
    /// transport call fails does not stop the others.
    pub async fn deliver(&self, routing: &Routing, renderer: &dyn NoticeRenderer) -> DeliveryReport {
        let mut cache = RenderCache::default();
        let mut report = DeliveryReport {
            attempted: routing.len(),
            ..Default::default()
        };

        for (address, notices) in routing {
            debug!("Generating and sending mails for recipient {address}");

            let mut documents = Vec::with_capacity(notices.len());
            for notice in notices {
                match cache.get_or_render(notice, renderer) {
                    Ok(Some(document)) => documents.push(document),
                    Ok(None) => {
                        debug!(notice = %notice.uuid, "Skipping notice that failed to render");
                    }
                    Err(e) => {
                        error!(
                            notice = %notice.uuid,
                            recipient = %address,
                            "Could not create mail from template: {e}"
                        );
                        report.last_error = Some(e.into());
                    }
                }
            }

            if documents.is_empty() {
                warn!("Nothing left to send to {address} after rendering");
                continue;
            }

            match self.sender.send(&self.from, address, &documents).await {
                Ok(()) => {
                    debug!("Successfully sent {} mail(s) to {address}", documents.len());
                    report.notified += 1;
                }
                Err(e) => {
                    error!(recipient = %address, "Could not send notifications: {e}");
                    report.last_error = Some(e.into());
                }
            }
        }

        debug!(
            "{} mail cache hits, {} misses",
            cache.hits(),
            cache.misses()
        );
        report
    }
}
