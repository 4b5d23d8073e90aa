use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use super::{build_message, parse_mailbox, DocumentSender};
use crate::errors::TransportError;
use crate::render::RenderedDocument;

/// Prints what would be sent instead of connecting to a mail server.
pub struct ConsoleSender {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSender {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        warn!("Mail transfer debugging is active, mails are printed and not sent");
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl DocumentSender for ConsoleSender {
    async fn send(
        &self,
        from: &str,
        to: &str,
        documents: &[Arc<RenderedDocument>],
    ) -> Result<(), TransportError> {
        let from_mailbox = parse_mailbox(from)?;
        let to_mailbox = parse_mailbox(to)?;

        let mut transcript = Vec::new();
        for document in documents {
            let message = build_message(&from_mailbox, &to_mailbox, document)?;
            writeln!(transcript, "MAIL FROM:<{}>", from_mailbox.email)?;
            writeln!(transcript, "RCPT TO:<{}>", to_mailbox.email)?;
            writeln!(transcript, "DATA")?;
            transcript.extend_from_slice(&message.formatted());
            writeln!(transcript, "\r\n.")?;
        }

        // A poisoned lock only means an earlier write panicked; keep printing.
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        out.write_all(&transcript)?;
        out.flush()?;
        Ok(())
    }
}
