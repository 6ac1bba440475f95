//! Identity of the Kubernetes resource an event was observed on.
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to parse group version: {0}")]
/// Failed to parse group version
pub struct ParseGroupVersionError(pub String);

/// Group and version halves of an `apiVersion` string
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
}

impl GroupVersion {
    /// Construct from explicit group and version
    pub fn gv(group_: &str, version_: &str) -> Self {
        let group = group_.to_string();
        let version = version_.to_string();
        Self { group, version }
    }

    /// Generate the apiVersion string used in a kind's yaml
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl FromStr for GroupVersion {
    type Err = ParseGroupVersionError;

    fn from_str(gv: &str) -> Result<Self, Self::Err> {
        let gvsplit = gv.splitn(2, '/').collect::<Vec<_>>();
        let (group, version) = match *gvsplit.as_slice() {
            [g, v] => (g.to_string(), v.to_string()), // standard case
            [v] => ("".to_string(), v.to_string()),   // core v1 case
            _ => return Err(ParseGroupVersionError(gv.into())),
        };
        Ok(Self { group, version })
    }
}

/// Stable identity of one observed resource
///
/// `(group, version, kind, namespace, name)` is stable for the lifetime of a
/// `uid`; a re-created resource arrives with a fresh `uid` and is a distinct
/// identity. `namespace` is empty for cluster-scoped resources.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    /// Globally unique id assigned by the apiserver
    pub uid: String,
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Kind
    pub kind: String,
    /// Namespace, empty for cluster-scoped resources
    #[serde(default)]
    pub namespace: String,
    /// Object name
    pub name: String,
    /// For `Event` objects, the uid of the object the event refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub involved_object_uid: Option<String>,
}

impl ResourceIdentity {
    /// Generate the apiVersion string used in a kind's yaml
    #[must_use]
    pub fn api_version(&self) -> String {
        GroupVersion::gv(&self.group, &self.version).api_version()
    }

    /// Whether this identity lives outside any namespace
    #[must_use]
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}/{}", self.kind, self.version, self.group, self.name)?;
        if !self.namespace.is_empty() {
            write!(f, ".{}", self.namespace)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_version_parsing_handles_core_group() {
        let gv = GroupVersion::from_str("v1").unwrap();
        assert_eq!(gv.group, "");
        assert_eq!(gv.version, "v1");
        assert_eq!(gv.api_version(), "v1");

        let gv = GroupVersion::from_str("helm.toolkit.fluxcd.io/v2").unwrap();
        assert_eq!(gv.group, "helm.toolkit.fluxcd.io");
        assert_eq!(gv.api_version(), "helm.toolkit.fluxcd.io/v2");
    }

    #[test]
    fn display_follows_expected_format() {
        let id = ResourceIdentity {
            uid: "u1".into(),
            group: "apps".into(),
            version: "v1".into(),
            kind: "Deployment".into(),
            namespace: "prod".into(),
            name: "api".into(),
            involved_object_uid: None,
        };
        assert_eq!(format!("{id}"), "Deployment.v1.apps/api.prod");
        let node = ResourceIdentity {
            uid: "u2".into(),
            group: "".into(),
            version: "v1".into(),
            kind: "Node".into(),
            namespace: "".into(),
            name: "n1".into(),
            involved_object_uid: None,
        };
        assert_eq!(format!("{node}"), "Node.v1./n1");
        assert!(node.is_cluster_scoped());
    }
}
