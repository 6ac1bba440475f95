//! Native Kubernetes relationships: ownership, event attribution, and
//! annotation pointers.

use async_trait::async_trait;
use spectre_core::{Event, EventType, Result};
use spectre_graph::{EdgeType, GraphEdge, NodeKind, NodeRef};

use super::{Extractor, ResourceLookup};

/// Annotation whose value points at another resource as `Kind/namespace/name`
/// (`Kind//name` for cluster-scoped targets)
pub const ANNOTATES_KEY: &str = "spectre.io/annotates";

/// Emits `OWNS`, `TRIGGERED_BY` and `ANNOTATES` edges from fields every
/// Kubernetes object carries natively
#[derive(Default)]
pub struct NativeOwnershipExtractor;

#[async_trait]
impl Extractor for NativeOwnershipExtractor {
    fn name(&self) -> &'static str {
        "native-ownership"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn matches(&self, event: &Event) -> bool {
        event.event_type != EventType::Delete
    }

    async fn extract(
        &self,
        event: &Event,
        lookup: &dyn ResourceLookup,
    ) -> Result<Vec<GraphEdge>> {
        let mut edges = Vec::new();
        let obj = event.object()?;

        // ownerReferences: owner → owned, implicit full confidence
        for owner in &obj.metadata.owner_references {
            let mut edge = GraphEdge::new(
                EdgeType::Owns,
                NodeRef::resource(&owner.uid),
                NodeRef::resource(&event.resource.uid),
                event.timestamp,
            )
            .prop("ownerKind", owner.kind.clone());
            if owner.controller == Some(true) {
                edge = edge.prop("controller", true);
            }
            edges.push(edge);
        }

        // a Kubernetes Event names the resource that caused it
        if event.resource.kind == "Event" {
            if let Some(cause) = &event.resource.involved_object_uid {
                edges.push(
                    GraphEdge::new(
                        EdgeType::TriggeredBy,
                        NodeRef::new(NodeKind::ChangeEvent, &event.id),
                        NodeRef::resource(cause),
                        event.timestamp,
                    )
                    .prop(
                        "reason",
                        obj.path(&["reason"])
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or_default(),
                    ),
                );
            }
        }

        // explicit annotation pointer, resolved against the live graph
        if let Some(pointer) = obj.annotation(ANNOTATES_KEY) {
            let mut parts = pointer.splitn(3, '/');
            if let (Some(kind), Some(namespace), Some(name)) =
                (parts.next(), parts.next(), parts.next())
            {
                if let Some(target) = lookup.find_by_namespace(namespace, kind, name).await? {
                    edges.push(
                        GraphEdge::new(
                            EdgeType::Annotates,
                            NodeRef::resource(&event.resource.uid),
                            NodeRef::resource(&target.key),
                            event.timestamp,
                        )
                        .prop("annotation", ANNOTATES_KEY),
                    );
                }
            }
        }

        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::GraphLookup;
    use serde_json::json;
    use spectre_core::{RawObject, Timestamp};
    use spectre_graph::{GraphClient, GraphNode, GraphUpdate, MemoryGraph};
    use std::sync::Arc;

    fn ts() -> Timestamp {
        Timestamp::from_secs(1_700_000_000)
    }

    #[tokio::test]
    async fn owner_references_become_owns_edges() {
        let obj: RawObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-0", "namespace": "ns", "uid": "p-1",
                "ownerReferences": [
                    {"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web", "uid": "rs-1", "controller": true}
                ]
            }
        }))
        .unwrap();
        let event = Event::from_object(EventType::Create, &obj, ts()).unwrap();
        let lookup = GraphLookup::new(Arc::new(MemoryGraph::new()), ts());
        let edges = NativeOwnershipExtractor
            .extract(&event, &lookup)
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key.edge_type, EdgeType::Owns);
        assert_eq!(edges[0].key.from.key, "rs-1");
        assert_eq!(edges[0].key.to.key, "p-1");
        assert_eq!(edges[0].properties["controller"], json!(true));
    }

    #[tokio::test]
    async fn kubernetes_events_yield_triggered_by() {
        let obj: RawObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": {"name": "e", "namespace": "ns", "uid": "e-1"},
            "involvedObject": {"kind": "Deployment", "uid": "d-1"},
            "reason": "ScalingReplicaSet"
        }))
        .unwrap();
        let event = Event::from_object(EventType::Create, &obj, ts()).unwrap();
        let lookup = GraphLookup::new(Arc::new(MemoryGraph::new()), ts());
        let edges = NativeOwnershipExtractor
            .extract(&event, &lookup)
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key.edge_type, EdgeType::TriggeredBy);
        assert_eq!(edges[0].key.to.key, "d-1");
        assert_eq!(edges[0].properties["reason"], json!("ScalingReplicaSet"));
    }

    #[tokio::test]
    async fn annotation_pointers_resolve_through_the_graph() {
        let graph = Arc::new(MemoryGraph::new());
        graph
            .apply(GraphUpdate::new().node(
                GraphNode::new(NodeKind::ResourceIdentity, "cm-1", ts())
                    .prop("kind", "ConfigMap")
                    .prop("namespace", "ns")
                    .prop("name", "settings"),
            ))
            .await
            .unwrap();
        let obj: RawObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-0", "namespace": "ns", "uid": "p-1",
                "annotations": {"spectre.io/annotates": "ConfigMap/ns/settings"}
            }
        }))
        .unwrap();
        let event = Event::from_object(EventType::Create, &obj, ts()).unwrap();
        let lookup = GraphLookup::new(graph, ts());
        let edges = NativeOwnershipExtractor
            .extract(&event, &lookup)
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key.edge_type, EdgeType::Annotates);
        assert_eq!(edges[0].key.to.key, "cm-1");
    }
}
