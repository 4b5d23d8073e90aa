//! Mail transport. Delivers rendered documents to one recipient.
//!
//! The dispatcher only talks to [`DocumentSender`]. Which implementation is
//! used is a runtime setting (`smtp.transport` in the configuration):
//! - `SmtpSender`: real delivery through an SMTP relay (default)
//! - `ConsoleSender`: prints the SMTP transcript to stdout, never connects

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use serde::{Deserialize, Serialize};

use crate::errors::TransportError;
use crate::render::RenderedDocument;

pub mod console;
pub mod smtp;

pub use console::ConsoleSender;
pub use smtp::SmtpSender;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Smtp,
    Console,
}

#[async_trait]
pub trait DocumentSender: Send + Sync {
    /// Sends every document, in order, from `from` to `to`. Either the whole
    /// batch is handed over or an error is returned.
    async fn send(
        &self,
        from: &str,
        to: &str,
        documents: &[Arc<RenderedDocument>],
    ) -> Result<(), TransportError>;
}

pub fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| TransportError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Builds a UTF-8 plain-text message. lettre picks the header and body
/// transfer encodings.
fn build_message(
    from: &Mailbox,
    to: &Mailbox,
    document: &RenderedDocument,
) -> Result<Message, TransportError> {
    Ok(Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(document.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(document.body.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mailbox_accepts_display_names() {
        assert!(parse_mailbox("alerts@example.org").is_ok());
        assert!(parse_mailbox("Security Team <security@example.org>").is_ok());
    }

    #[test]
    fn test_parse_mailbox_rejects_garbage() {
        let err = parse_mailbox("not an address").unwrap_err();
        assert!(matches!(err, TransportError::Address { .. }));
        assert!(err.to_string().contains("not an address"));
    }

    #[test]
    fn test_build_message_encodes_non_ascii_subject() {
        let from = parse_mailbox("from@example.org").unwrap();
        let to = parse_mailbox("to@example.org").unwrap();
        let doc = RenderedDocument {
            subject: "[hoch] Schwachstelle ermöglicht Codeausführung".to_string(),
            body: "Größe".to_string(),
        };

        let raw = String::from_utf8(build_message(&from, &to, &doc).unwrap().formatted()).unwrap();
        assert!(raw.contains("From: from@example.org"));
        assert!(raw.contains("To: to@example.org"));
        assert!(raw.contains("Subject: =?utf-8?"));
        assert!(raw.contains("Content-Type: text/plain; charset=utf-8"));
    }
}
