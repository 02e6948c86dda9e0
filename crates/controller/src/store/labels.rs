//! Label selector evaluation.
//!
//! Selectors are parsed once into a `kube::core::Selector`, which both matches
//! label maps in memory and renders the API server query. Operators other
//! than `In`, `NotIn`, `Exists` and `DoesNotExist` are rejected.

use crate::crd::LabelSelector;
use crate::store::StoreError;
use kube::core::{Selector, SelectorExt};
use std::collections::BTreeMap;
use tracing::debug;

/// Parse a `metav1.LabelSelector`
pub fn parse(selector: &LabelSelector) -> Result<Selector, StoreError> {
    Selector::try_from(selector.clone())
        .map_err(|e| StoreError::InvalidObject(format!("invalid label selector: {e}")))
}

/// Whether `labels` satisfy `selector`
#[must_use]
pub fn selects(selector: &Selector, labels: Option<&BTreeMap<String, String>>) -> bool {
    match labels {
        Some(labels) => selector.matches(labels),
        None => selector.matches(&BTreeMap::new()),
    }
}

/// Whether `labels` satisfy every term of `selector`
///
/// An empty selector matches everything; an invalid one matches nothing.
#[must_use]
pub fn matches(selector: &LabelSelector, labels: Option<&BTreeMap<String, String>>) -> bool {
    match parse(selector) {
        Ok(parsed) => selects(&parsed, labels),
        Err(e) => {
            debug!("{}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn expr(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: (!values.is_empty()).then(|| values.iter().map(|v| (*v).to_string()).collect()),
        }
    }

    #[test]
    fn test_match_labels() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("team", "a")])),
            ..Default::default()
        };
        assert!(matches(&selector, Some(&labels(&[("team", "a"), ("x", "y")]))));
        assert!(!matches(&selector, Some(&labels(&[("team", "b")]))));
        assert!(!matches(&selector, None));
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        assert!(matches(&LabelSelector::default(), None));
    }

    #[test]
    fn test_match_expressions() {
        let selector = LabelSelector {
            match_expressions: Some(vec![
                expr("env", "In", &["prod", "staging"]),
                expr("tier", "NotIn", &["frontend"]),
                expr("team", "Exists", &[]),
                expr("legacy", "DoesNotExist", &[]),
            ]),
            ..Default::default()
        };
        assert!(matches(
            &selector,
            Some(&labels(&[("env", "prod"), ("team", "a")]))
        ));
        assert!(!matches(
            &selector,
            Some(&labels(&[("env", "prod"), ("team", "a"), ("legacy", "1")]))
        ));
        assert!(!matches(
            &selector,
            Some(&labels(&[("env", "dev"), ("team", "a")]))
        ));
        assert!(!matches(
            &selector,
            Some(&labels(&[("env", "prod"), ("team", "a"), ("tier", "frontend")]))
        ));
    }

    #[test]
    fn test_unknown_operator_is_rejected_everywhere() {
        let selector = LabelSelector {
            match_expressions: Some(vec![expr("env", "Like", &["prod"])]),
            ..Default::default()
        };
        assert!(parse(&selector).is_err());
        assert!(!matches(&selector, Some(&labels(&[("env", "prod")]))));
    }

    #[test]
    fn test_query_rendering() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("team", "a")])),
            match_expressions: Some(vec![expr("old", "DoesNotExist", &[])]),
        };
        let query = parse(&selector).unwrap().to_string();
        assert!(query.contains("team=a"));
        assert!(query.contains("!old"));
    }
}
