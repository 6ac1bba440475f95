//! Gateway API spec references.

use async_trait::async_trait;
use serde_json::Value;
use spectre_core::{Event, EventType, Result};
use spectre_graph::{EdgeType, GraphEdge, NodeRef};
use tracing::debug;

use super::{Extractor, ResourceLookup};

const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

/// Emits `REFERENCES_SPEC` edges for Gateway API objects:
/// Gateway → GatewayClass via `spec.gatewayClassName`, HTTPRoute → Gateway
/// via `spec.parentRefs`, and HTTPRoute → Service via
/// `spec.rules[*].backendRefs`
#[derive(Default)]
pub struct GatewayApiExtractor;

impl GatewayApiExtractor {
    #[allow(clippy::too_many_arguments)]
    async fn push_reference(
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
}

#[async_trait]
impl Extractor for GatewayApiExtractor {
    fn name(&self) -> &'static str {
        "gateway-api"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn matches(&self, event: &Event) -> bool {
        event.event_type != EventType::Delete
            && event.resource.group == GATEWAY_GROUP
            && matches!(event.resource.kind.as_str(), "Gateway" | "HTTPRoute")
    }

    async fn extract(
        &self,
        event: &Event,
        lookup: &dyn ResourceLookup,
    ) -> Result<Vec<GraphEdge>> {
        let obj = event.object()?;
        let namespace = &event.resource.namespace;
        let mut edges = Vec::new();

        if event.resource.kind == "Gateway" {
            if let Some(class) = obj.path(&["spec", "gatewayClassName"]).and_then(Value::as_str) {
                // GatewayClass is cluster-scoped
                Self::push_reference(
                    &mut edges,
                    event,
                    lookup,
                    "",
                    "GatewayClass",
                    class,
                    "spec.gatewayClassName",
                )
                .await?;
            }
            return Ok(edges);
        }

        if let Some(parents) = obj.path(&["spec", "parentRefs"]).and_then(Value::as_array) {
            for (i, parent) in parents.iter().enumerate() {
                let Some(name) = parent.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let kind = parent.get("kind").and_then(Value::as_str).unwrap_or("Gateway");
                let ns = parent
                    .get("namespace")
                    .and_then(Value::as_str)
                    .unwrap_or(namespace);
                Self::push_reference(
                    &mut edges,
                    event,
                    lookup,
                    ns,
                    kind,
                    name,
                    &format!("spec.parentRefs[{i}]"),
                )
                .await?;
            }
        }

        if let Some(rules) = obj.path(&["spec", "rules"]).and_then(Value::as_array) {
            for (i, rule) in rules.iter().enumerate() {
                let Some(backends) = rule.get("backendRefs").and_then(Value::as_array) else {
                    continue;
                };
                for (j, backend) in backends.iter().enumerate() {
                    let Some(name) = backend.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    let kind = backend.get("kind").and_then(Value::as_str).unwrap_or("Service");
                    let ns = backend
                        .get("namespace")
                        .and_then(Value::as_str)
                        .unwrap_or(namespace);
                    Self::push_reference(
                        &mut edges,
                        event,
                        lookup,
                        ns,
                        kind,
                        name,
                        &format!("spec.rules[{i}].backendRefs[{j}]"),
                    )
                    .await?;
                }
            }
        }

        Ok(edges)
    }
}
