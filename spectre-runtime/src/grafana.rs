//! Contracts towards the dashboard / alerting provider.
//!
//! The HTTP clients themselves are out of scope; syncers consume these
//! traits and the serde shapes below, which mirror the Grafana response
//! envelopes. Tests implement them in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spectre_core::Result;

/// Summary row from the dashboard listing endpoint
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// Stable dashboard uid
    pub uid: String,
    /// Display title
    pub title: String,
    /// Version counter, bumped on every save
    pub version: i64,
    /// Tags, used for hierarchy classification
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Full dashboard payload
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardDetail {
    /// Stable dashboard uid
    pub uid: String,
    /// Display title
    pub title: String,
    /// Version counter
    pub version: i64,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Panels with their data queries
    #[serde(default)]
    pub panels: Vec<Panel>,
}

/// One dashboard panel
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    /// Panel id within the dashboard
    pub id: i64,
    /// Panel title
    #[serde(default)]
    pub title: String,
    /// Data queries (`targets` in the dashboard JSON)
    #[serde(default)]
    pub targets: Vec<PanelTarget>,
}

/// One data query of a panel
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanelTarget {
    /// The PromQL expression
    #[serde(default)]
    pub expr: String,
    /// Query ref id (`A`, `B`, …)
    #[serde(default)]
    pub ref_id: String,
}

/// One alert rule from the provisioning endpoint
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    /// Stable rule uid
    pub uid: String,
    /// Rule title
    pub title: String,
    /// Last-updated marker, ISO-8601
    pub updated: String,
    /// The PromQL condition
    #[serde(default)]
    pub expr: String,
    /// Rule labels
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

/// Coarse alert state
///
/// Grafana reports `NoData` for rules whose query returned nothing; that is
/// normalised to `Normal` here, at the envelope boundary (a Grafana-specific
/// convention, not a universal one).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertStateKind {
    /// The rule condition is not met
    #[serde(alias = "NoData", alias = "normal", alias = "inactive")]
    Normal,
    /// The condition is met but the `for` duration has not elapsed
    #[serde(alias = "pending")]
    Pending,
    /// The alert is firing
    #[serde(alias = "firing", alias = "alerting", alias = "Alerting")]
    Firing,
}

impl AlertStateKind {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStateKind::Normal => "Normal",
            AlertStateKind::Pending => "Pending",
            AlertStateKind::Firing => "Firing",
        }
    }

    /// Parse a stored wire name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Normal" => Some(AlertStateKind::Normal),
            "Pending" => Some(AlertStateKind::Pending),
            "Firing" => Some(AlertStateKind::Firing),
            _ => None,
        }
    }
}

/// One alert instance state from the rules endpoint
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertInstance {
    /// Uid of the rule this instance belongs to
    pub rule_uid: String,
    /// Rule title
    #[serde(default)]
    pub title: String,
    /// Current state
    pub state: AlertStateKind,
    /// Instance labels (one rule can have many label combinations)
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
    /// Extra fields from the envelope, kept opaque
    #[serde(flatten)]
    pub extra: std::collections::BTreeMap<String, Value>,
}

/// Listing and fetching dashboards
#[async_trait]
pub trait DashboardSource: Send + Sync {
    /// List all dashboards with their version counters
    async fn list_dashboards(&self) -> Result<Vec<DashboardSummary>>;

    /// Fetch the full dashboard JSON
    async fn get_dashboard(&self, uid: &str) -> Result<DashboardDetail>;
}

/// Listing alert rules and sampling alert states
#[async_trait]
pub trait AlertSource: Send + Sync {
    /// List all alert rules
    async fn list_rules(&self) -> Result<Vec<AlertRule>>;

    /// Current states from the Prometheus-compatible rules endpoint
    async fn current_states(&self) -> Result<Vec<AlertInstance>>;
}
