use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::errors::{AppError, ConfigError, SourceError};
use crate::models::Subscriber;
use crate::render::{MailTemplate, NoticeRenderer};
use crate::source::{known_endpoint, AdvisorySource, WidSource};
use crate::transport::{ConsoleSender, DocumentSender, SmtpSender, TransportKind};
use crate::watermark::WatermarkStore;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the cycle scheduler needs, wired from a validated [`Config`].
pub struct AppState {
    pub sources: Vec<Arc<dyn AdvisorySource>>,
    pub subscribers: Vec<Subscriber>,
    pub renderer: Arc<dyn NoticeRenderer>,
    pub dispatcher: Dispatcher,
    pub watermarks: WatermarkStore,
    pub interval: Duration,
}

impl AppState {
    /// `subscribers` is the flattened set returned by [`Config::validate`].
    pub fn from_config(config: &Config, subscribers: Vec<Subscriber>) -> Result<Self, AppError> {
        let template = MailTemplate::new(&config.template.subject, &config.template.body)
            .map_err(ConfigError::Template)?;

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(SourceError::Http)?;

        let sources = config
            .enabled_api_endpoints
            .iter()
            .map(|id| {
                let endpoint = known_endpoint(id)
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown api endpoint '{id}'")))?;
                let source: Arc<dyn AdvisorySource> =
                    Arc::new(WidSource::new(client.clone(), endpoint));
                Ok(source)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        for source in &sources {
            info!("Enabled source '{}' ({})", source.id(), source.portal_url());
        }

        let watermarks = WatermarkStore::open(
            config.data_file.clone(),
            sources.iter().map(|s| s.id()),
            Utc::now(),
        )?;

        let sender: Arc<dyn DocumentSender> = match config.smtp.transport {
            TransportKind::Smtp => Arc::new(SmtpSender::new(&config.smtp)?),
            TransportKind::Console => Arc::new(ConsoleSender::stdout()),
        };

        info!(
            "{} subscriber(s), fetching every {}s",
            subscribers.len(),
            config.api_fetch_interval
        );

        Ok(Self {
            sources,
            subscribers,
            renderer: Arc::new(template),
            dispatcher: Dispatcher::new(sender, config.smtp.from.clone()),
            watermarks,
            interval: config.fetch_interval(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilterRule;
    use crate::transport::TransportKind;

    fn make_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config {
            subscribers: vec![Subscriber {
                address: "alice@example.org".to_string(),
                rules: vec![FilterRule {
                    any: true,
                    ..Default::default()
                }],
            }],
            lists: vec![],
            data_file: dir.path().join("data.json"),
            ..Default::default()
        };
        config.smtp.transport = TransportKind::Console;
        config
    }

    #[test]
    fn test_state_wires_enabled_sources() {
        let dir = tempfile::tempdir().unwrap();
        let config = make_config(&dir);
        let subscribers = config.validate().unwrap();

        let state = AppState::from_config(&config, subscribers).unwrap();

        let ids: Vec<_> = state.sources.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["bay", "bund"]);
        assert_eq!(state.subscribers.len(), 1);
        assert_eq!(state.interval, Duration::from_secs(600));
        // Opening the store writes the seeded watermarks.
        assert!(dir.path().join("data.json").exists());
    }

    #[test]
    fn test_broken_template_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = make_config(&dir);
        config.template.body = "{{#each cve_ids}}".to_string();
        let subscribers = config.validate().unwrap();

        let err = AppState::from_config(&config, subscribers).err().unwrap();
        assert!(matches!(err, AppError::Config(ConfigError::Template(_))));
    }
}
