//! A dynamic representation of observed Kubernetes objects.
//!
//! The watcher hands Spectre arbitrary cluster objects whose kinds are not
//! known at compile time. [`RawObject`] keeps the metadata the pipeline needs
//! as typed fields and flattens everything else into a [`serde_json::Value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::{GroupVersion, ResourceIdentity};

/// Owner reference as it appears in object metadata
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// apiVersion of the owner
    pub api_version: String,
    /// Kind of the owner
    pub kind: String,
    /// Name of the owner
    pub name: String,
    /// Uid of the owner
    pub uid: String,
    /// Whether the owner is the managing controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

/// The subset of object metadata Spectre reads
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name
    #[serde(default)]
    pub name: String,
    /// Namespace, absent for cluster-scoped objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Unique id assigned by the apiserver
    #[serde(default)]
    pub uid: String,
    /// Labels
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub labels: std::collections::BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: std::collections::BTreeMap<String, String>,
    /// Owner references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Creation timestamp (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    /// Deletion timestamp (RFC3339), set while the object terminates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
    /// Server-side-apply bookkeeping, pruned before events are stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_fields: Option<Value>,
}

/// A dynamic representation of an observed cluster object
///
/// This will work with any non-list type object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawObject {
    /// apiVersion of the object
    #[serde(default)]
    pub api_version: String,
    /// Kind of the object
    #[serde(default)]
    pub kind: String,
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// All other keys
    #[serde(flatten)]
    pub data: Value,
}

impl RawObject {
    /// Create a RawObject with minimal identity fields set
    #[must_use]
    pub fn new(api_version: &str, kind: &str, name: &str, uid: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            metadata: ObjectMeta {
                name: name.to_string(),
                uid: uid.to_string(),
                ..Default::default()
            },
            data: Value::Null,
        }
    }

    /// Attach dynamic data outside `metadata`
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Attach a namespace
    #[must_use]
    pub fn within(mut self, ns: &str) -> Self {
        self.metadata.namespace = Some(ns.into());
        self
    }

    /// Derive the resource identity of this object
    ///
    /// For objects of kind `Event`, `involved_object_uid` is populated from
    /// the nested `involvedObject.uid` field.
    #[must_use]
    pub fn identity(&self) -> ResourceIdentity {
        let gv = self
            .api_version
            .parse::<GroupVersion>()
            .unwrap_or_else(|_| GroupVersion::gv("", &self.api_version));
        let involved_object_uid = if self.kind == "Event" {
            self.path(&["involvedObject", "uid"])
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            None
        };
        ResourceIdentity {
            uid: self.metadata.uid.clone(),
            group: gv.group,
            version: gv.version,
            kind: self.kind.clone(),
            namespace: self.metadata.namespace.clone().unwrap_or_default(),
            name: self.metadata.name.clone(),
            involved_object_uid,
        }
    }

    /// Look up a nested value under the non-metadata payload
    #[must_use]
    pub fn path(&self, segments: &[&str]) -> Option<&Value> {
        let mut cur = &self.data;
        for seg in segments {
            cur = cur.get(seg)?;
        }
        Some(cur)
    }

    /// A label value, if present
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// An annotation value, if present
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Whether the object carries a deletion timestamp
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
