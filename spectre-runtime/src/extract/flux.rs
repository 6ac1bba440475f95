//! Flux HelmRelease relationships.
//!
//! Two directions: a HelmRelease's spec names the Secrets, ConfigMaps and
//! chart sources it consumes (`REFERENCES_SPEC`), and resources carrying the
//! `helm.toolkit.fluxcd.io/{name,namespace}` labels are inferred to be
//! managed by that release (`MANAGES`, `CREATES_OBSERVED`) when the evidence
//! clears the confidence threshold.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use spectre_core::{Event, EventType, RawObject, Result, Timestamp};
use spectre_graph::{EdgeType, GraphEdge, GraphNode, NodeRef};
use tracing::debug;

use super::{evidence::EvidenceBuilder, Extractor, ResourceLookup, ScoringConfig};

const FLUX_GROUP: &str = "helm.toolkit.fluxcd.io";
const LABEL_NAME: &str = "helm.toolkit.fluxcd.io/name";
const LABEL_NAMESPACE: &str = "helm.toolkit.fluxcd.io/namespace";

/// Extractor for Flux HelmRelease relationships
pub struct HelmReleaseExtractor {
    scoring: ScoringConfig,
}

impl HelmReleaseExtractor {
    /// Extractor scoring inferences under the given config
    #[must_use]
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    async fn spec_references(
        &self,
        event: &Event,
        obj: &RawObject,
        lookup: &dyn ResourceLookup,
    ) -> Result<Vec<GraphEdge>> {
        let mut edges = Vec::new();
        let namespace = &event.resource.namespace;

        if let Some(values_from) = obj.path(&["spec", "valuesFrom"]).and_then(Value::as_array) {
            for (i, entry) in values_from.iter().enumerate() {
                let kind = entry.get("kind").and_then(Value::as_str).unwrap_or("Secret");
                let Some(name) = entry.get("name").and_then(Value::as_str) else {
                    continue;
                };
                self.push_reference(
                    &mut edges,
                    event,
                    lookup,
                    namespace,
                    kind,
                    name,
                    &format!("spec.valuesFrom[{i}]"),
                )
                .await?;
            }
        }

        if let Some(source_ref) = obj.path(&["spec", "chart", "spec", "sourceRef"]) {
            let kind = source_ref
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or("HelmRepository");
            let ref_ns = source_ref
                .get("namespace")
                .and_then(Value::as_str)
                .unwrap_or(namespace);
            if let Some(name) = source_ref.get("name").and_then(Value::as_str) {
                self.push_reference(
                    &mut edges,
                    event,
                    lookup,
                    ref_ns,
                    kind,
                    name,
                    "spec.chart.spec.sourceRef",
                )
                .await?;
            }
        }

        if let Some(name) = obj
            .path(&["spec", "kubeConfig", "secretRef", "name"])
            .and_then(Value::as_str)
        {
            self.push_reference(
                &mut edges,
                event,
                lookup,
                namespace,
                "Secret",
                name,
                "spec.kubeConfig.secretRef",
            )
            .await?;
        }

        Ok(edges)
    }

    #[allow(clippy::too_many_arguments)]
    async fn push_reference(
        &self,
        edges: &mut Vec<GraphEdge>,
        event: &Event,
        lookup: &dyn ResourceLookup,
        namespace: &str,
        kind: &str,
        name: &str,
        field_path: &str,
    ) -> Result<()> {
        match lookup.find_by_namespace(namespace, kind, name).await? {
            Some(target) => edges.push(
                GraphEdge::new(
                    EdgeType::ReferencesSpec,
                    NodeRef::resource(&event.resource.uid),
                    NodeRef::resource(&target.key),
                    event.timestamp,
                )
                .prop("fieldPath", field_path),
            ),
            None => debug!(kind, namespace, name, field_path, "spec referent not in graph yet"),
        }
        Ok(())
    }

    async fn managed_inference(
        &self,
        event: &Event,
        obj: &RawObject,
        lookup: &dyn ResourceLookup,
    ) -> Result<Vec<GraphEdge>> {
        let Some(release_name) = obj.label(LABEL_NAME) else {
            return Ok(Vec::new());
        };
        let release_namespace = obj.label(LABEL_NAMESPACE).unwrap_or(&event.resource.namespace);
        let Some(manager) = lookup
            .find_by_namespace(release_namespace, "HelmRelease", release_name)
            .await?
        else {
            return Ok(Vec::new());
        };

        let managed_first_seen = lookup
            .find_by_uid(&event.resource.uid)
            .await?
            .map_or(event.timestamp, |n| n.first_seen);
        if !self.scoring.temporal_order_ok(manager.first_seen, managed_first_seen) {
            debug!(
                manager = %manager.key,
                managed = %event.resource.uid,
                "manager first seen after managed resource, rejecting"
            );
            return Ok(Vec::new());
        }

        let gap = gap_between(manager.first_seen, event.timestamp);
        let reconcile = latest_reconcile(
            lookup
                .find_recent_events(&manager.key, self.scoring.proximity_window)
                .await?,
        );

        let at = event.timestamp;
        let builder = EvidenceBuilder::new(self.scoring.clone())
            .label_match(Some(&format!("{LABEL_NAME}={release_name}")), at)
            .namespace_match(
                release_namespace == event.resource.namespace,
                &event.resource.namespace,
                at,
            )
            .temporal_proximity(gap, at)
            .reconcile_event(reconcile.as_deref(), at);
        if !builder.sufficient() {
            return Ok(Vec::new());
        }
        let confidence = builder.confidence();

        let mut edges = vec![GraphEdge::new(
            EdgeType::Manages,
            NodeRef::resource(&manager.key),
            NodeRef::resource(&event.resource.uid),
            at,
        )
        .inferred(confidence, builder.into_evidence(), at)];

        // a create right after reconcile activity is also an observed creation
        if event.event_type == EventType::Create {
            let causal = EvidenceBuilder::new(self.scoring.clone())
                .temporal_proximity(gap, at)
                .reconcile_event(reconcile.as_deref(), at);
            if causal.sufficient() {
                let causal_confidence = causal.confidence();
                edges.push(
                    GraphEdge::new(
                        EdgeType::CreatesObserved,
                        NodeRef::resource(&manager.key),
                        NodeRef::resource(&event.resource.uid),
                        at,
                    )
                    .inferred(causal_confidence, causal.into_evidence(), at),
                );
            }
        }
        Ok(edges)
    }
}

fn gap_between(cause: Timestamp, effect: Timestamp) -> Duration {
    Duration::from_nanos(effect.as_nanos().saturating_sub(cause.as_nanos()).max(0) as u64)
}

/// The most recent change-event reason, if any activity was found
fn latest_reconcile(events: Vec<GraphNode>) -> Option<String> {
    events.last().map(|node| {
        node.str_prop("reason")
            .or_else(|| node.str_prop("eventType"))
            .unwrap_or("activity")
            .to_string()
    })
}

#[async_trait]
impl Extractor for HelmReleaseExtractor {
    fn name(&self) -> &'static str {
        "flux-helmrelease"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn matches(&self, event: &Event) -> bool {
        if event.event_type == EventType::Delete {
            return false;
        }
        event.resource.group == FLUX_GROUP && event.resource.kind == "HelmRelease"
            || event
                .object()
                .map(|o| o.label(LABEL_NAME).is_some())
                .unwrap_or(false)
    }

    async fn extract(
        &self,
        event: &Event,
        lookup: &dyn ResourceLookup,
    ) -> Result<Vec<GraphEdge>> {
        let obj = event.object()?;
        let mut edges = Vec::new();
        if event.resource.group == FLUX_GROUP && event.resource.kind == "HelmRelease" {
            edges.extend(self.spec_references(event, &obj, lookup).await?);
        }
        if obj.label(LABEL_NAME).is_some() {
            edges.extend(self.managed_inference(event, &obj, lookup).await?);
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spectre_graph::{GraphClient, GraphUpdate, MemoryGraph, NodeKind};
    use std::sync::Arc;

    const T0: i64 = 1_700_000_000_000_000_000;
    fn ts(offset_secs: i64) -> Timestamp {
        Timestamp::from_nanos(T0 + offset_secs * 1_000_000_000)
    }

    async fn seeded_graph() -> Arc<MemoryGraph> {
        let graph = Arc::new(MemoryGraph::new());
        graph
            .apply(
                GraphUpdate::new()
                    .node(
                        GraphNode::new(NodeKind::ResourceIdentity, "hr-uid", ts(0))
                            .prop("kind", "HelmRelease")
                            .prop("namespace", "prod")
                            .prop("name", "hr-1"),
                    )
                    .node(
                        GraphNode::new(NodeKind::ChangeEvent, "hr-create", ts(0))
                            .prop("timestamp", ts(0).as_nanos())
                            .prop("eventType", "create"),
                    )
                    .edge(GraphEdge::new(
                        EdgeType::Changed,
                        NodeRef::new(NodeKind::ChangeEvent, "hr-create"),
                        NodeRef::resource("hr-uid"),
                        ts(0),
                    ))
                    .node(
                        GraphNode::new(NodeKind::ResourceIdentity, "secret-uid", ts(1))
                            .prop("kind", "Secret")
                            .prop("namespace", "prod")
                            .prop("name", "values"),
                    ),
            )
            .await
            .unwrap();
        graph
    }

    fn helm_release() -> Event {
        let obj: RawObject = serde_json::from_value(json!({
            "apiVersion": "helm.toolkit.fluxcd.io/v2",
            "kind": "HelmRelease",
            "metadata": {"name": "hr-1", "namespace": "prod", "uid": "hr-uid"},
            "spec": {
                "valuesFrom": [{"kind": "Secret", "name": "values"}],
                "chart": {"spec": {"sourceRef": {"kind": "HelmRepository", "name": "charts"}}}
            }
        }))
        .unwrap();
        Event::from_object(EventType::Create, &obj, ts(0)).unwrap()
    }

    fn managed_deployment(offset_secs: i64) -> Event {
        let obj: RawObject = serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "app", "namespace": "prod", "uid": "dep-uid",
                "labels": {
                    "helm.toolkit.fluxcd.io/name": "hr-1",
                    "helm.toolkit.fluxcd.io/namespace": "prod"
                }
            }
        }))
        .unwrap();
        Event::from_object(EventType::Create, &obj, ts(offset_secs)).unwrap()
    }

    #[tokio::test]
    async fn values_from_becomes_a_spec_reference() {
        let graph = seeded_graph().await;
        let lookup = super::super::GraphLookup::new(graph, ts(10));
        let extractor = HelmReleaseExtractor::new(ScoringConfig::default());
        let edges = extractor.extract(&helm_release(), &lookup).await.unwrap();
        let reference = edges
            .iter()
            .find(|e| e.key.edge_type == EdgeType::ReferencesSpec && e.key.to.key == "secret-uid")
            .unwrap();
        assert_eq!(reference.properties["fieldPath"], json!("spec.valuesFrom[0]"));
        assert_eq!(reference.confidence, None); // explicit references are not scored
    }

    #[tokio::test]
    async fn labelled_resources_infer_manages_with_evidence() {
        // S3: hr-1 at t=0, managed Deployment labelled at t=8s
        let graph = seeded_graph().await;
        let lookup = super::super::GraphLookup::new(graph, ts(8));
        let extractor = HelmReleaseExtractor::new(ScoringConfig::default());
        let edges = extractor
            .extract(&managed_deployment(8), &lookup)
            .await
            .unwrap();
        let manages = edges
            .iter()
            .find(|e| e.key.edge_type == EdgeType::Manages)
            .unwrap();
        assert_eq!(manages.key.from.key, "hr-uid");
        assert_eq!(manages.key.to.key, "dep-uid");
        let confidence = manages.confidence.unwrap();
        assert!((0.90..0.96).contains(&confidence), "confidence was {confidence}");
        assert_eq!(manages.evidence.len(), 4);

        let creates = edges
            .iter()
            .find(|e| e.key.edge_type == EdgeType::CreatesObserved)
            .unwrap();
        assert!(creates.confidence.unwrap() >= 0.5);
    }

    #[tokio::test]
    async fn managers_created_after_the_resource_are_rejected() {
        let graph = Arc::new(MemoryGraph::new());
        graph
            .apply(
                GraphUpdate::new()
                    .node(
                        GraphNode::new(NodeKind::ResourceIdentity, "hr-uid", ts(100))
                            .prop("kind", "HelmRelease")
                            .prop("namespace", "prod")
                            .prop("name", "hr-1"),
                    )
                    .node(GraphNode::new(NodeKind::ResourceIdentity, "dep-uid", ts(0))),
            )
            .await
            .unwrap();
        let lookup = super::super::GraphLookup::new(graph, ts(100));
        let extractor = HelmReleaseExtractor::new(ScoringConfig::default());
        // the deployment existed long before the release: no MANAGES edge
        let edges = extractor
            .extract(&managed_deployment(0), &lookup)
            .await
            .unwrap();
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn distant_resources_fall_below_the_threshold() {
        let graph = seeded_graph().await;
        let lookup = super::super::GraphLookup::new(graph, ts(600));
        let extractor = HelmReleaseExtractor::new(ScoringConfig::default());
        // ten minutes later: label + namespace alone score 0.5, reconcile
        // activity has aged out, proximity earns nothing
        let edges = extractor
            .extract(&managed_deployment(600), &lookup)
            .await
            .unwrap();
        let manages = edges.iter().find(|e| e.key.edge_type == EdgeType::Manages);
        assert!(manages.map_or(true, |e| e.confidence.unwrap() <= 0.51));
        assert!(!edges
            .iter()
            .any(|e| e.key.edge_type == EdgeType::CreatesObserved));
    }
}
