//! Filter Engine: evaluates a single [`FilterRule`] against notices.
//!
//! A rule is either the `any` wildcard or a conjunction of its active criteria.
//! A rule without `any` and without a single active criterion never matches,
//! so an empty rule in the configuration cannot turn into "notify on everything".

use crate::models::{FilterRule, Notice};

/// Returns true if `notice` satisfies `rule`.
pub fn matches(rule: &FilterRule, notice: &Notice) -> bool {
    if rule.any {
        return true;
    }

    // `None` marks a criterion the rule leaves unset.
    let criteria = [
        (!rule.title_contains.is_empty()).then(|| notice.title.contains(&rule.title_contains)),
        (!rule.classification.is_empty()).then(|| rule.classification == notice.classification),
        (rule.min_basescore > 0).then(|| notice.base_score >= rule.min_basescore),
        (!rule.status.is_empty()).then(|| rule.status == notice.status),
        (!rule.products_contain.is_empty()).then(|| !notice.product_names.is_empty()),
        (!rule.no_patch.is_empty()).then(|| no_patch_matches(&rule.no_patch, notice.no_patch)),
        (!rule.api_endpoint.is_empty()).then(|| rule.api_endpoint == notice.source_id),
    ];

    let mut active = criteria.into_iter().flatten().peekable();
    active.peek().is_some() && active.all(|ok| ok)
}

/// Lazily yields the notices that match `rule`, preserving input order.
pub fn filter_batch<'a>(
    rule: &'a FilterRule,
    notices: &'a [Notice],
) -> impl Iterator<Item = &'a Notice> + 'a {
    notices.iter().filter(move |n| matches(rule, n))
}

fn no_patch_matches(configured: &str, actual: Option<bool>) -> bool {
    match actual {
        Some(true) => configured == "true",
        Some(false) => configured == "false",
        None => false,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notice::fixtures::make_notice;

    fn make_batch() -> Vec<Notice> {
        let mut critical = make_notice("a", 100);
        critical.classification = "critical".to_string();
        critical.title = "OpenSSL: Multiple vulnerabilities".to_string();
        critical.base_score = 9;
        critical.status = "UPDATE".to_string();
        critical.product_names = vec!["OpenSSL".to_string()];
        critical.no_patch = Some(false);

        let mut low = make_notice("b", 200);
        low.classification = "low".to_string();
        low.title = "Kernel: Information disclosure".to_string();
        low.base_score = 3;
        low.source_id = "bay".to_string();

        vec![critical, low, make_notice("c", 300)]
    }

    #[test]
    fn test_empty_rule_matches_nothing() {
        let rule = FilterRule::default();
        let batch = make_batch();
        assert_eq!(filter_batch(&rule, &batch).count(), 0);
    }

    #[test]
    fn test_any_matches_everything() {
        let batch = make_batch();
        let rule = FilterRule {
            any: true,
            ..Default::default()
        };
        assert_eq!(filter_batch(&rule, &batch).count(), batch.len());
    }

    #[test]
    fn test_any_short_circuits_other_criteria() {
        let batch = make_batch();
        let rule = FilterRule {
            any: true,
            classification: "does-not-exist".to_string(),
            min_basescore: 11,
            ..Default::default()
        };
        assert_eq!(filter_batch(&rule, &batch).count(), batch.len());
    }

    #[test]
    fn test_conjunction_requires_all_criteria() {
        let batch = make_batch();
        let rule = FilterRule {
            classification: "critical".to_string(),
            min_basescore: 7,
            title_contains: "OpenSSL".to_string(),
            ..Default::default()
        };
        let uuids: Vec<_> = filter_batch(&rule, &batch).map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a"]);

        // Flip a single criterion to fail.
        let rule = FilterRule {
            min_basescore: 10,
            ..rule
        };
        assert_eq!(filter_batch(&rule, &batch).count(), 0);
    }

    #[test]
    fn test_title_contains_is_case_sensitive() {
        let batch = make_batch();
        let rule = FilterRule {
            title_contains: "openssl".to_string(),
            ..Default::default()
        };
        assert_eq!(filter_batch(&rule, &batch).count(), 0);
    }

    #[test]
    fn test_min_basescore_is_inclusive_and_skips_unknown() {
        let batch = make_batch();
        let rule = FilterRule {
            min_basescore: 3,
            ..Default::default()
        };
        let uuids: Vec<_> = filter_batch(&rule, &batch).map(|n| n.uuid.as_str()).collect();
        // "c" has an unknown score (-1).
        assert_eq!(uuids, vec!["a", "b"]);
    }

    #[test]
    fn test_products_contain_is_a_presence_flag() {
        let batch = make_batch();
        let rule = FilterRule {
            products_contain: "anything at all".to_string(),
            ..Default::default()
        };
        let uuids: Vec<_> = filter_batch(&rule, &batch).map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a"]);
    }

    #[test]
    fn test_no_patch_unknown_never_matches() {
        let batch = make_batch();
        let rule = FilterRule {
            no_patch: "false".to_string(),
            ..Default::default()
        };
        let uuids: Vec<_> = filter_batch(&rule, &batch).map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a"]);

        let rule = FilterRule {
            no_patch: "true".to_string(),
            ..Default::default()
        };
        assert_eq!(filter_batch(&rule, &batch).count(), 0);
    }

    #[test]
    fn test_api_endpoint_and_status() {
        let batch = make_batch();
        let rule = FilterRule {
            api_endpoint: "bay".to_string(),
            ..Default::default()
        };
        let uuids: Vec<_> = filter_batch(&rule, &batch).map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["b"]);

        let rule = FilterRule {
            status: "UPDATE".to_string(),
            ..Default::default()
        };
        let uuids: Vec<_> = filter_batch(&rule, &batch).map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a"]);
    }

    #[test]
    fn test_filter_batch_preserves_order() {
        let batch = make_batch();
        let rule = FilterRule {
            api_endpoint: "bund".to_string(),
            ..Default::default()
        };
        let uuids: Vec<_> = filter_batch(&rule, &batch).map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a", "c"]);
    }
}
