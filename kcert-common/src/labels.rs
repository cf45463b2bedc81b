//! Label matching helpers.
//!
//! Workloads under test are marked with one of the configured
//! [`TargetPodLabel`]s on their pod template. The first configured label that
//! matches becomes the `applabel` selector handed to the chaos engine.

use crate::types::TargetPodLabel;
use std::collections::BTreeMap;

/// `key=value` form accepted by label selectors.
pub fn selector_string(label: &TargetPodLabel) -> String {
    format!("{}={}", label.key(), label.value)
}

/// First configured target label present on `labels`.
pub fn find_target_label<'a>(
    labels: &BTreeMap<String, String>,
    targets: &'a [TargetPodLabel],
) -> Option<&'a TargetPodLabel> {
    targets
        .iter()
        .find(|t| labels.get(&t.key()).is_some_and(|v| *v == t.value))
}

/// Render `matchLabels` as a comma-separated selector for list calls.
pub fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn target(prefix: &str, name: &str, value: &str) -> TargetPodLabel {
        TargetPodLabel {
            prefix: prefix.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_find_target_label_first_match_wins() {
        let pod = labels(&[("example.com/generic", "target"), ("app", "web")]);
        let targets = [
            target("", "app", "db"),
            target("", "app", "web"),
            target("example.com", "generic", "target"),
        ];

        let found = find_target_label(&pod, &targets).unwrap();
        assert_eq!(selector_string(found), "app=web");
    }

    #[test]
    fn test_find_target_label_value_must_match() {
        let pod = labels(&[("example.com/generic", "other")]);
        let targets = [target("example.com", "generic", "target")];
        assert!(find_target_label(&pod, &targets).is_none());
    }

    #[test]
    fn test_selector_query_is_sorted() {
        let selector = labels(&[("tier", "fe"), ("app", "web")]);
        assert_eq!(selector_query(&selector), "app=web,tier=fe");
    }
}
