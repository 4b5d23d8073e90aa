//! Recipient Router: fans a notice batch out to subscribers.
//!
//! Per subscriber: every rule is run over the batch, the matches are unioned
//! and de-duplicated by uuid, then ordered oldest-published first. Subscribers
//! without a single match are left out of the result entirely.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::filter::filter_batch;
use crate::models::{Notice, Subscriber};

/// subscriber address -> notices to deliver, oldest first
pub type Routing = BTreeMap<String, Vec<Notice>>;

pub fn route(subscribers: &[Subscriber], notices: &[Notice]) -> Routing {
    let mut routing = Routing::new();

    for subscriber in subscribers {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut selected: Vec<&Notice> = Vec::new();

        for rule in &subscriber.rules {
            for notice in filter_batch(rule, notices) {
                // First occurrence wins.
                if seen.insert(notice.uuid.as_str()) {
                    selected.push(notice);
                }
            }
        }

        debug!(
            "Including {} of {} notices for recipient {}",
            selected.len(),
            notices.len(),
            subscriber.address
        );

        if selected.is_empty() {
            continue;
        }

        selected.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.uuid.cmp(&b.uuid))
        });

        routing.insert(
            subscriber.address.clone(),
            selected.into_iter().cloned().collect(),
        );
    }

    routing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notice::fixtures::make_notice;
    use crate::models::FilterRule;

    fn classification_rule(classification: &str) -> FilterRule {
        FilterRule {
            classification: classification.to_string(),
            ..Default::default()
        }
    }

    fn make_subscriber(address: &str, rules: Vec<FilterRule>) -> Subscriber {
        Subscriber {
            address: address.to_string(),
            rules,
        }
    }

    fn make_batch() -> Vec<Notice> {
        let mut critical = make_notice("critical", 300);
        critical.classification = "critical".to_string();
        critical.title = "OpenSSL".to_string();
        let mut low = make_notice("low", 100);
        low.classification = "low".to_string();
        vec![critical, low]
    }

    #[test]
    fn test_single_rule_routes_matching_notice_only() {
        let subscribers = vec![make_subscriber(
            "alice@example.org",
            vec![classification_rule("critical")],
        )];
        let routing = route(&subscribers, &make_batch());

        let uuids: Vec<_> = routing["alice@example.org"]
            .iter()
            .map(|n| n.uuid.as_str())
            .collect();
        assert_eq!(uuids, vec!["critical"]);
    }

    #[test]
    fn test_overlapping_rules_deliver_notice_once() {
        let title_rule = FilterRule {
            title_contains: "OpenSSL".to_string(),
            ..Default::default()
        };
        let subscribers = vec![make_subscriber(
            "alice@example.org",
            vec![classification_rule("critical"), title_rule],
        )];
        let routing = route(&subscribers, &make_batch());
        assert_eq!(routing["alice@example.org"].len(), 1);
    }

    #[test]
    fn test_routed_batch_is_oldest_first() {
        let batch = vec![
            make_notice("c", 300),
            make_notice("a", 100),
            make_notice("b2", 200),
            make_notice("b1", 200),
        ];
        let subscribers = vec![make_subscriber(
            "alice@example.org",
            vec![FilterRule {
                any: true,
                ..Default::default()
            }],
        )];

        let routing = route(&subscribers, &batch);
        let uuids: Vec<_> = routing["alice@example.org"]
            .iter()
            .map(|n| n.uuid.as_str())
            .collect();
        // Equal timestamps fall back to uuid order.
        assert_eq!(uuids, vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn test_subscriber_without_matches_is_omitted() {
        let subscribers = vec![
            make_subscriber("alice@example.org", vec![classification_rule("critical")]),
            make_subscriber("bob@example.org", vec![classification_rule("medium")]),
            make_subscriber("carol@example.org", vec![FilterRule::default()]),
        ];
        let routing = route(&subscribers, &make_batch());

        assert_eq!(routing.len(), 1);
        assert!(routing.contains_key("alice@example.org"));
        assert!(!routing.contains_key("bob@example.org"));
        assert!(!routing.contains_key("carol@example.org"));
    }

    #[test]
    fn test_empty_batch_routes_nothing() {
        let subscribers = vec![make_subscriber(
            "alice@example.org",
            vec![FilterRule {
                any: true,
                ..Default::default()
            }],
        )];
        assert!(route(&subscribers, &[]).is_empty());
    }
}
