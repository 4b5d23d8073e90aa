use thiserror::Error;

/// Failure fetching or decoding one advisory source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure rendering a notice into a document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("render error: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Failure handing a rendered batch to the mail transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid mail address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reading or writing a persisted JSON file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not replace {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: tempfile::PersistError,
    },
}

/// Configuration rejected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration is incomplete: {0}")]
    Incomplete(String),

    #[error("configuration includes invalid data: {0}")]
    Invalid(String),

    #[error("could not parse mail template: {0}")]
    Template(#[from] RenderError),
}

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
