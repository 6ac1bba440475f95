//! Graph nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spectre_core::{ResourceIdentity, Timestamp};

/// The node labels Spectre writes
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    /// A cluster resource, keyed by its apiserver uid
    ResourceIdentity,
    /// One change event, keyed by the log event id
    ChangeEvent,
    /// A Grafana dashboard, keyed by its external uid
    Dashboard,
    /// A dashboard panel query, keyed by a content hash
    Query,
    /// A metric name
    Metric,
    /// A service derived from dashboard introspection
    Service,
    /// An alert rule (instances folded into one node, worst state wins)
    Alert,
    /// A computed behavioural baseline
    Baseline,
}

impl NodeKind {
    /// Label text used in rendered statements
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::ResourceIdentity => "ResourceIdentity",
            NodeKind::ChangeEvent => "ChangeEvent",
            NodeKind::Dashboard => "Dashboard",
            NodeKind::Query => "Query",
            NodeKind::Metric => "Metric",
            NodeKind::Service => "Service",
            NodeKind::Alert => "Alert",
            NodeKind::Baseline => "Baseline",
        }
    }
}

/// One node with its merge key and property bag
///
/// `key` is the MERGE key: the resource uid for resources, a content hash or
/// external id otherwise. Properties are overwritten on match; `first_seen`
/// is only set on create.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Node label
    pub kind: NodeKind,
    /// Merge key
    pub key: String,
    /// Properties written on create and match
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// When this node was first written
    pub first_seen: Timestamp,
    /// When this node was last confirmed by a write
    pub last_seen: Timestamp,
    /// Tombstone marker for kinds that require it
    #[serde(default)]
    pub deleted: bool,
}

impl GraphNode {
    /// A node with the given kind and key, observed now
    #[must_use]
    pub fn new(kind: NodeKind, key: &str, observed: Timestamp) -> Self {
        Self {
            kind,
            key: key.to_string(),
            properties: BTreeMap::new(),
            first_seen: observed,
            last_seen: observed,
            deleted: false,
        }
    }

    /// Set a property (builder-style)
    #[must_use]
    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Mark as tombstoned
    #[must_use]
    pub fn tombstone(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// The node for a resource identity
    #[must_use]
    pub fn resource(identity: &ResourceIdentity, observed: Timestamp) -> Self {
        Self::new(NodeKind::ResourceIdentity, &identity.uid, observed)
            .prop("group", identity.group.clone())
            .prop("version", identity.version.clone())
            .prop("kind", identity.kind.clone())
            .prop("namespace", identity.namespace.clone())
            .prop("name", identity.name.clone())
    }

    /// A string property, if present
    #[must_use]
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}
