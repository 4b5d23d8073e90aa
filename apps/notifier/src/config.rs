use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::models::{FilterRule, NotifyList, Subscriber};
use crate::persist::JsonFile;
use crate::source::known_endpoint;
use crate::transport::{parse_mailbox, TransportKind};

const CONFIG_FILE_MODE: u32 = 0o600;

/// Application configuration, read from the JSON file given on the command
/// line. SMTP credentials can be overridden from the environment (or `.env`):
/// `NOTIFIER_SMTP_USER`, `NOTIFIER_SMTP_PASSWORD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between the starts of two fetch cycles.
    pub api_fetch_interval: u64,
    pub enabled_api_endpoints: Vec<String>,
    #[serde(rename = "datafile")]
    pub data_file: PathBuf,
    pub log_level: String,
    /// Canonical per-recipient subscriptions.
    pub subscribers: Vec<Subscriber>,
    /// Legacy named lists, flattened into `subscribers` by [`Config::validate`].
    pub lists: Vec<NotifyList>,
    pub smtp: SmtpSettings,
    pub template: TemplateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub transport: TransportKind,
    pub from: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// Handlebars templates; empty strings select the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub subject: String,
    pub body: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_fetch_interval: 60 * 10,
            enabled_api_endpoints: vec!["bay".to_string(), "bund".to_string()],
            data_file: PathBuf::from("data.json"),
            log_level: "info".to_string(),
            subscribers: vec![],
            lists: vec![NotifyList {
                name: "Example List".to_string(),
                recipients: vec![],
                filter: vec![],
            }],
            smtp: SmtpSettings::default(),
            template: TemplateConfig::default(),
        }
    }
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Smtp,
            from: "user@localhost".to_string(),
            host: "127.0.0.1".to_string(),
            port: 587,
            user: "user@localhost".to_string(),
            password: "change me :)".to_string(),
        }
    }
}

impl Config {
    /// Reads the configuration file. If it does not exist, an incomplete
    /// default configuration is written there and an error is returned so the
    /// operator can fill it in.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let file = JsonFile::<Config>::new(path, true, CONFIG_FILE_MODE);
        let (mut config, created) = file.load_or_init(Config::default())?;
        if created {
            return Err(ConfigError::Incomplete(format!(
                "a default configuration was written to {}, edit it and start again",
                file.path().display()
            )));
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(user) = std::env::var("NOTIFIER_SMTP_USER") {
            self.smtp.user = user;
        }
        if let Ok(password) = std::env::var("NOTIFIER_SMTP_PASSWORD") {
            self.smtp.password = password;
        }
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.api_fetch_interval)
    }

    /// Checks everything the cycle relies on and returns the flattened
    /// subscriber set.
    pub fn validate(&self) -> Result<Vec<Subscriber>, ConfigError> {
        if self.api_fetch_interval == 0 {
            return Err(ConfigError::Invalid(
                "api_fetch_interval must be at least 1 second".to_string(),
            ));
        }

        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "'{}' is not a log level (error, warn, info, debug, trace)",
                self.log_level
            )));
        }

        if self.enabled_api_endpoints.is_empty() {
            return Err(ConfigError::Incomplete(
                "no api endpoints are enabled".to_string(),
            ));
        }
        for id in &self.enabled_api_endpoints {
            if known_endpoint(id).is_none() {
                return Err(ConfigError::Invalid(format!("unknown api endpoint '{id}'")));
            }
        }

        for subscriber in &self.subscribers {
            if subscriber.rules.is_empty() {
                return Err(missing_filter(&format!("subscriber {}", subscriber.address)));
            }
        }
        for list in &self.lists {
            if !list.recipients.is_empty() && list.filter.is_empty() {
                return Err(missing_filter(&format!("list {}", list.name)));
            }
        }

        let subscribers = self.flatten_subscribers();
        if subscribers.is_empty() {
            return Err(ConfigError::Incomplete(
                "no subscribers are configured".to_string(),
            ));
        }

        for subscriber in &subscribers {
            check_address(&subscriber.address)?;
            for rule in &subscriber.rules {
                check_rule(rule)?;
            }
        }
        check_address(&self.smtp.from)?;

        Ok(subscribers)
    }

    /// Merges flat subscribers and list recipients into one subscriber per
    /// address. Rules keep file order: flat entries first, then lists.
    pub fn flatten_subscribers(&self) -> Vec<Subscriber> {
        let mut merged: Vec<Subscriber> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        let mut add = |address: &str, rules: &[FilterRule]| {
            let slot = *index.entry(address.to_string()).or_insert_with(|| {
                merged.push(Subscriber {
                    address: address.to_string(),
                    rules: vec![],
                });
                merged.len() - 1
            });
            merged[slot].rules.extend_from_slice(rules);
        };

        for subscriber in &self.subscribers {
            add(&subscriber.address, &subscriber.rules);
        }
        for list in &self.lists {
            for recipient in &list.recipients {
                add(recipient, &list.filter);
            }
        }

        merged
    }
}

fn missing_filter(owner: &str) -> ConfigError {
    ConfigError::Incomplete(format!(
        "{owner} has no filter defined - at least [{{\"any\": true}}] should be configured"
    ))
}

fn check_address(address: &str) -> Result<(), ConfigError> {
    parse_mailbox(address)
        .map(|_| ())
        .map_err(|_| ConfigError::Invalid(format!("'{address}' is not a valid e-mail address")))
}

fn check_rule(rule: &FilterRule) -> Result<(), ConfigError> {
    match rule.no_patch.as_str() {
        "" | "true" | "false" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "no_patch must be \"true\" or \"false\", got '{other}'"
        ))),
    }
}
