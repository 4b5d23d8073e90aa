use serde::{Deserialize, Serialize};

/// One filter rule. Either the `any` wildcard, or a conjunction of every
/// criterion that carries a non-default value.
///
/// Field names follow the configuration file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRule {
    pub any: bool,
    pub title_contains: String,
    pub classification: String,
    pub min_basescore: i32,
    pub status: String,
    /// Truthy flag: any non-empty value requires the notice to list products.
    pub products_contain: String,
    /// `"true"` or `"false"`, empty = criterion inactive.
    pub no_patch: String,
    pub api_endpoint: String,
}

/// A notification recipient and its rules. A notice qualifies for the
/// subscriber if any of the rules matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub address: String,
    #[serde(rename = "include", default)]
    pub rules: Vec<FilterRule>,
}

/// Legacy subscription shape: a named list whose filters apply to all of its
/// recipients. Flattened into [`Subscriber`]s when the configuration loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyList {
    pub name: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub filter: Vec<FilterRule>,
}
