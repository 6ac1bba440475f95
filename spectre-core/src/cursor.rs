//! Opaque pagination cursors for resource-major result ordering.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A resume point in the `(kind, namespace, name)` resource ordering
///
/// Cursors are handed to clients as opaque base64 strings; a page resumes at
/// the first resource strictly after the encoded triple.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Kind of the last returned resource
    pub kind: String,
    /// Namespace of the last returned resource
    pub namespace: String,
    /// Name of the last returned resource
    pub name: String,
}

impl Cursor {
    /// Construct from the last resource of a page
    #[must_use]
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Encode as an opaque token
    #[must_use]
    pub fn encode(&self) -> String {
        // serializing a struct of strings cannot fail
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(self).unwrap_or_default())
    }

    /// Decode a client-supplied token
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| Error::Validation(format!("invalid cursor: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Validation(format!("invalid cursor: {e}")))
    }
}
