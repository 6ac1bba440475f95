//! Query filters over resource attributes.

use serde::{Deserialize, Serialize};

use crate::{Event, ResourceIdentity};

/// Attribute filters applied to a time-windowed scan
///
/// Each field may hold zero or more accepted values; empty means "any".
/// A filter matches an event iff every non-empty field contains the event's
/// corresponding attribute (case-sensitive).
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Accepted kinds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,
    /// Accepted namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Accepted API groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// Accepted versions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
}

impl EventFilter {
    /// A filter that matches everything
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to a single kind (builder-style)
    #[must_use]
    pub fn kind(mut self, kind: &str) -> Self {
        self.kinds.push(kind.to_string());
        self
    }

    /// Restrict to a single namespace (builder-style)
    #[must_use]
    pub fn namespace(mut self, ns: &str) -> Self {
        self.namespaces.push(ns.to_string());
        self
    }

    /// Whether no field restricts the scan
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
            && self.namespaces.is_empty()
            && self.groups.is_empty()
            && self.versions.is_empty()
    }

    /// Whether the identity passes every non-empty field
    #[must_use]
    pub fn matches(&self, resource: &ResourceIdentity) -> bool {
        fn ok(accepted: &[String], value: &str) -> bool {
            accepted.is_empty() || accepted.iter().any(|a| a == value)
        }
        ok(&self.kinds, &resource.kind)
            && ok(&self.namespaces, &resource.namespace)
            && ok(&self.groups, &resource.group)
            && ok(&self.versions, &resource.version)
    }

    /// Whether the event's resource passes the filter
    #[must_use]
    pub fn matches_event(&self, event: &Event) -> bool {
        self.matches(&event.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(kind: &str, ns: &str) -> ResourceIdentity {
        ResourceIdentity {
            uid: "u".into(),
            group: "apps".into(),
            version: "v1".into(),
            kind: kind.into(),
            namespace: ns.into(),
            name: "n".into(),
            involved_object_uid: None,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(EventFilter::any().matches(&ident("Pod", "default")));
    }

    #[test]
    fn multi_value_fields_are_disjunctive() {
        let filter = EventFilter::any().kind("Pod").kind("Deployment");
        assert!(filter.matches(&ident("Pod", "default")));
        assert!(filter.matches(&ident("Deployment", "prod")));
        assert!(!filter.matches(&ident("Service", "prod")));
    }

    #[test]
    fn fields_are_conjunctive_and_case_sensitive() {
        let filter = EventFilter::any().kind("Pod").namespace("prod");
        assert!(!filter.matches(&ident("Pod", "default")));
        assert!(!filter.matches(&ident("pod", "prod")));
        assert!(filter.matches(&ident("Pod", "prod")));
    }
}
