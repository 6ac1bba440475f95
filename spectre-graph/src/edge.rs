//! Graph edges, evidence, and edge queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spectre_core::Timestamp;

use crate::node::NodeKind;

/// The edge types Spectre writes
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Native ownership, owner → owned
    Owns,
    /// ChangeEvent → changed resource
    Changed,
    /// ChangeEvent → the resource a Kubernetes Event names as its cause
    TriggeredBy,
    /// Resource → referent named in an explicit spec field
    ReferencesSpec,
    /// Controller → managed resource, inferred from evidence
    Manages,
    /// Source → target named by a label or annotation pointer
    Annotates,
    /// Cause → resource created shortly after its reconcile
    CreatesObserved,
    /// Alert → Alert self-edge recording a state change
    StateTransition,
    /// Alert → metric its rule evaluates
    Monitors,
    /// Metric → service derived from dashboard introspection
    Tracks,
    /// Dashboard → panel query
    Queries,
    /// Query → metric it references
    References,
}

impl EdgeType {
    /// Relationship text used in rendered statements
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            EdgeType::Owns => "OWNS",
            EdgeType::Changed => "CHANGED",
            EdgeType::TriggeredBy => "TRIGGERED_BY",
            EdgeType::ReferencesSpec => "REFERENCES_SPEC",
            EdgeType::Manages => "MANAGES",
            EdgeType::Annotates => "ANNOTATES",
            EdgeType::CreatesObserved => "CREATES_OBSERVED",
            EdgeType::StateTransition => "STATE_TRANSITION",
            EdgeType::Monitors => "MONITORS",
            EdgeType::Tracks => "TRACKS",
            EdgeType::Queries => "QUERIES",
            EdgeType::References => "REFERENCES",
        }
    }

    /// Whether edges of this type carry evidence and get revalidated
    #[must_use]
    pub fn is_inferred(&self) -> bool {
        matches!(self, EdgeType::Manages | EdgeType::CreatesObserved)
    }
}

/// Lifecycle of an inferred edge
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    /// Evidence recently recomputed and sufficient
    Valid,
    /// Flagged for revalidation (e.g. an endpoint was deleted)
    Stale,
    /// The referent no longer exists
    Invalid,
    /// Created but not yet validated
    Pending,
}

/// Kinds of evidence backing an inferred edge
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EvidenceKind {
    /// A controller-identifying label matched
    LabelMatch,
    /// Manager and managed share a namespace
    NamespaceMatch,
    /// The managed resource appeared shortly after the manager acted
    TemporalProximity,
    /// A reconcile event for the manager was observed
    ReconcileEvent,
}

/// One weighted item justifying an inferred edge
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// What was observed
    pub kind: EvidenceKind,
    /// Human-readable detail (label value, delta, event reason)
    pub value: String,
    /// Weight earned towards the confidence score
    pub weight: f64,
    /// When the evidence was observed
    pub timestamp: Timestamp,
}

/// A typed reference to one node endpoint
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    /// Node label
    pub kind: NodeKind,
    /// Merge key
    pub key: String,
}

impl NodeRef {
    /// Construct a reference
    #[must_use]
    pub fn new(kind: NodeKind, key: &str) -> Self {
        Self {
            kind,
            key: key.to_string(),
        }
    }

    /// Reference to a resource node by uid
    #[must_use]
    pub fn resource(uid: &str) -> Self {
        Self::new(NodeKind::ResourceIdentity, uid)
    }
}

/// Merge identity of one edge
///
/// `discriminator` separates edges that share endpoints and type, which is
/// how timestamp-keyed self-edges (alert state transitions) coexist instead
/// of forming node cycles.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct EdgeKey {
    /// Edge type
    pub edge_type: EdgeType,
    /// Source endpoint
    pub from: NodeRef,
    /// Target endpoint
    pub to: NodeRef,
    /// Disambiguator for multi-edges, empty for singleton edges
    #[serde(default)]
    pub discriminator: String,
}

/// One edge with its merge identity and properties
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Merge identity
    pub key: EdgeKey,
    /// When the relationship was first written
    pub first_observed: Timestamp,
    /// Inferred-edge confidence in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Evidence justifying an inferred edge
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
    /// Last time the evidence was recomputed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<Timestamp>,
    /// Lifecycle of an inferred edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_state: Option<ValidationState>,
    /// Read-side expiry for volatile edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    /// Additional typed properties (field paths, transition states, …)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

impl GraphEdge {
    /// A plain full-confidence edge
    #[must_use]
    pub fn new(edge_type: EdgeType, from: NodeRef, to: NodeRef, observed: Timestamp) -> Self {
        Self {
            key: EdgeKey {
                edge_type,
                from,
                to,
                discriminator: String::new(),
            },
            first_observed: observed,
            confidence: None,
            evidence: Vec::new(),
            last_validated: None,
            validation_state: None,
            expires_at: None,
            properties: BTreeMap::new(),
        }
    }

    /// Set the multi-edge discriminator (builder-style)
    #[must_use]
    pub fn discriminated(mut self, discriminator: &str) -> Self {
        self.key.discriminator = discriminator.to_string();
        self
    }

    /// Set a property (builder-style)
    #[must_use]
    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Attach inferred-edge scoring state
    #[must_use]
    pub fn inferred(mut self, confidence: f64, evidence: Vec<Evidence>, validated: Timestamp) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self.evidence = evidence;
        self.last_validated = Some(validated);
        self.validation_state = Some(ValidationState::Valid);
        self
    }

    /// Set the read-side expiry (builder-style)
    #[must_use]
    pub fn expires(mut self, at: Timestamp) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether the edge is visible at `now` under TTL rules
    #[must_use]
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

/// Predicates for edge reads
///
/// `unexpired_at` implements the read-side TTL rule: when set, expired edges
/// are filtered out by every backend. No background deletion is required for
/// correctness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeQuery {
    /// Restrict to one edge type
    pub edge_type: Option<EdgeType>,
    /// Restrict to edges leaving this node
    pub from: Option<NodeRef>,
    /// Restrict to edges entering this node
    pub to: Option<NodeRef>,
    /// Restrict to these validation states
    pub validation_states: Vec<ValidationState>,
    /// Restrict to edges whose `last_validated` is missing or older
    pub last_validated_before: Option<Timestamp>,
    /// Filter out edges whose `expires_at` is at or before this instant
    pub unexpired_at: Option<Timestamp>,
}

impl EdgeQuery {
    /// Whether the edge satisfies every set predicate
    #[must_use]
    pub fn matches(&self, edge: &GraphEdge) -> bool {
        if let Some(edge_type) = self.edge_type {
            if edge.key.edge_type != edge_type {
                return false;
            }
        }
        if let Some(from) = &self.from {
            if edge.key.from != *from {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if edge.key.to != *to {
                return false;
            }
        }
        if !self.validation_states.is_empty() {
            match edge.validation_state {
                Some(state) if self.validation_states.contains(&state) => {}
                _ => return false,
            }
        }
        if let Some(bound) = self.last_validated_before {
            if edge.last_validated.is_some_and(|v| v >= bound) {
                return false;
            }
        }
        if let Some(now) = self.unexpired_at {
            if !edge.is_live(now) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_filtering_is_strict() {
        let now = Timestamp::from_secs(100);
        let edge = GraphEdge::new(
            EdgeType::StateTransition,
            NodeRef::new(NodeKind::Alert, "a"),
            NodeRef::new(NodeKind::Alert, "a"),
            Timestamp::from_secs(1),
        )
        .expires(now);
        // expiry exactly at `now` is already invisible
        assert!(!edge.is_live(now));
        let query = EdgeQuery {
            unexpired_at: Some(now),
            ..Default::default()
        };
        assert!(!query.matches(&edge));
    }

    #[test]
    fn inferred_confidence_is_clamped() {
        let edge = GraphEdge::new(
            EdgeType::Manages,
            NodeRef::resource("m"),
            NodeRef::resource("t"),
            Timestamp::from_secs(1),
        )
        .inferred(1.7, Vec::new(), Timestamp::from_secs(1));
        assert_eq!(edge.confidence, Some(1.0));
        assert_eq!(edge.validation_state, Some(ValidationState::Valid));
    }

    #[test]
    fn queries_filter_on_validation_age() {
        let edge = GraphEdge::new(
            EdgeType::Manages,
            NodeRef::resource("m"),
            NodeRef::resource("t"),
            Timestamp::from_secs(1),
        )
        .inferred(0.8, Vec::new(), Timestamp::from_secs(50));
        let stale_query = EdgeQuery {
            edge_type: Some(EdgeType::Manages),
            last_validated_before: Some(Timestamp::from_secs(40)),
            ..Default::default()
        };
        assert!(!stale_query.matches(&edge));
        let fresh_query = EdgeQuery {
            edge_type: Some(EdgeType::Manages),
            last_validated_before: Some(Timestamp::from_secs(60)),
            ..Default::default()
        };
        assert!(fresh_query.matches(&edge));
    }
}
