//! Mail templates. Turns a notice into a (subject, body) document.
//!
//! Rendering is a pure function of the notice and the templates, which are
//! parsed once at startup and never change while the process runs. That is
//! what makes rendered documents safe to cache by notice uuid.

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::errors::RenderError;
use crate::models::Notice;

const SUBJECT_TEMPLATE: &str = "subject";
const BODY_TEMPLATE: &str = "body";

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "[{{classification}}] {{title}}";

pub const DEFAULT_BODY_TEMPLATE: &str = r#"{{#if status}}[{{status}}] {{/if}}{{name}}
-> {{portal_url}}
{{#if no_patch}}

No patch available!
{{/if}}
{{#if has_base_score}}
Basescore: {{base_score}}
{{/if}}
Published: {{published_at}}
{{#if product_names}}

Affected Products:
{{#each product_names}}
  - {{this}}
{{/each}}
{{/if}}
{{#if cve_ids}}

Assigned CVEs:
{{#each cve_ids}}
  - {{this}} -> https://www.cve.org/CVERecord?id={{this}}
{{/each}}
{{/if}}


Sent by {{notifier_name}} {{notifier_version}}
"#;

/// A transport-ready notification for one notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub subject: String,
    pub body: String,
}

/// Renders notices into documents. Implemented by [`MailTemplate`]; the
/// dispatcher only sees this trait.
pub trait NoticeRenderer: Send + Sync {
    fn render(&self, notice: &Notice) -> Result<RenderedDocument, RenderError>;
}

/// Values visible to templates: every notice field plus a few derived flags.
#[derive(Serialize)]
struct TemplateData<'a> {
    #[serde(flatten)]
    notice: &'a Notice,
    has_base_score: bool,
    notifier_name: &'static str,
    notifier_version: &'static str,
}

pub struct MailTemplate {
    registry: Handlebars<'static>,
}

impl MailTemplate {
    /// Parses the configured templates. Empty strings select the built-in
    /// defaults.
    pub fn new(subject: &str, body: &str) -> Result<Self, RenderError> {
        let mut registry = Handlebars::new();
        // Plain-text mail: no HTML escaping.
        registry.register_escape_fn(handlebars::no_escape);

        let subject = if subject.is_empty() {
            debug!("Using default template for mail subject");
            DEFAULT_SUBJECT_TEMPLATE
        } else {
            subject
        };
        let body = if body.is_empty() {
            debug!("Using default template for mail body");
            DEFAULT_BODY_TEMPLATE
        } else {
            body
        };

        registry.register_template_string(SUBJECT_TEMPLATE, subject)?;
        registry.register_template_string(BODY_TEMPLATE, body)?;

        Ok(Self { registry })
    }
}

impl NoticeRenderer for MailTemplate {
    fn render(&self, notice: &Notice) -> Result<RenderedDocument, RenderError> {
        let data = TemplateData {
            notice,
            has_base_score: notice.has_base_score(),
            notifier_name: env!("CARGO_PKG_NAME"),
            notifier_version: env!("CARGO_PKG_VERSION"),
        };

        let subject = self.registry.render(SUBJECT_TEMPLATE, &data)?;
        let body = self.registry.render(BODY_TEMPLATE, &data)?;

        Ok(RenderedDocument {
            // Header values must stay on one line.
            subject: subject.lines().map(str::trim).collect::<Vec<_>>().join(" "),
            body,
        })
    }
}
