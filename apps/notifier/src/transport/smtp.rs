use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

use super::{build_message, parse_mailbox, DocumentSender};
use crate::config::SmtpSettings;
use crate::errors::TransportError;
use crate::render::RenderedDocument;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers through an SMTP relay. STARTTLS is used when the server offers
/// it; credentials are only sent when a user is configured.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    pub fn new(settings: &SmtpSettings) -> Result<Self, TransportError> {
        let tls = TlsParameters::new(settings.host.clone())?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            .port(settings.port)
            .tls(Tls::Opportunistic(tls))
            .timeout(Some(SMTP_TIMEOUT));

        if !settings.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ));
        }

        debug!("SMTP transport configured for {}:{}", settings.host, settings.port);
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl DocumentSender for SmtpSender {
    async fn send(
        &self,
        from: &str,
        to: &str,
        documents: &[Arc<RenderedDocument>],
    ) -> Result<(), TransportError> {
        let from = parse_mailbox(from)?;
        let to_mailbox = parse_mailbox(to)?;

        for document in documents {
            let message = build_message(&from, &to_mailbox, document)?;
            self.transport.send(message).await?;
        }

        debug!("Sent {} mail(s) to {}", documents.len(), to);
        Ok(())
    }
}
