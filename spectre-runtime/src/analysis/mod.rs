//! Behavioural baselines and alert analysis.

mod baseline;
pub use baseline::{compute_baseline, Baseline, BaselineConfig, DayType};

mod cache;
pub use cache::AnalysisCache;

mod categorize;
pub use categorize::{categorize, Categorisation, Onset, Pattern};

mod score;
pub use score::{deviation, flappiness, FlappinessConfig};

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spectre_core::{Result, Timestamp};
use spectre_graph::{EdgeQuery, EdgeType, GraphClient, NodeKind, NodeRef};
use tracing::debug;

use crate::grafana::AlertStateKind;

/// One observed state change
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateSample {
    /// State entered
    pub state: AlertStateKind,
    /// When it was entered
    pub at: Timestamp,
}

/// Read an alert's unexpired transition history, oldest first
pub async fn transition_history<C: GraphClient>(
    graph: &C,
    alert_uid: &str,
    now: Timestamp,
) -> Result<Vec<StateSample>> {
    let edges = graph
        .edges(EdgeQuery {
            edge_type: Some(EdgeType::StateTransition),
            from: Some(NodeRef::new(NodeKind::Alert, alert_uid)),
            unexpired_at: Some(now),
            ..Default::default()
        })
        .await?;
    let mut samples: Vec<StateSample> = edges
        .iter()
        .filter_map(|edge| {
            let state = edge
                .properties
                .get("toState")
                .and_then(Value::as_str)
                .and_then(AlertStateKind::parse)?;
            let at = edge
                .properties
                .get("timestamp")
                .and_then(Value::as_i64)
                .map(Timestamp::from_nanos)?;
            Some(StateSample { state, at })
        })
        .collect();
    samples.sort_by_key(|s| s.at);
    Ok(samples)
}

/// Full analysis of one alert
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertAnalysis {
    /// The behavioural baseline for the current hour and day type
    pub baseline: Baseline,
    /// Deviation of the current firing share from the baseline
    pub deviation: f64,
    /// Flappiness score over the trailing six hours
    pub flappiness: f64,
    /// Onset and pattern labels
    pub categorisation: Categorisation,
    /// When the analysis was computed
    pub computed_at: Timestamp,
}

/// Analysis knobs
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Baseline window and minimum history
    pub baseline: BaselineConfig,
    /// Flappiness window and steepness
    pub flappiness: FlappinessConfig,
    /// Cached results stay valid this long (one sampling interval)
    pub cache_ttl: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            baseline: BaselineConfig::default(),
            flappiness: FlappinessConfig::default(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Computes and caches per-alert analyses
pub struct AnalysisService<C> {
    graph: Arc<C>,
    config: AnalysisConfig,
    cache: AnalysisCache<AlertAnalysis>,
}

impl<C: GraphClient> AnalysisService<C> {
    /// Service reading transition history through the given client
    #[must_use]
    pub fn new(graph: Arc<C>, config: AnalysisConfig) -> Self {
        let cache = AnalysisCache::new(config.cache_ttl);
        Self {
            graph,
            config,
            cache,
        }
    }

    /// Analyse one alert, reusing a cached result within one sampling
    /// interval (the cached `computed_at` satisfies the request)
    pub async fn analyze(&self, alert_uid: &str, now: Timestamp) -> Result<AlertAnalysis> {
        if let Some(cached) = self.cache.get(alert_uid, now) {
            debug!(alert = alert_uid, "analysis served from cache");
            return Ok(cached);
        }
        let samples = transition_history(self.graph.as_ref(), alert_uid, now).await?;
        let baseline = compute_baseline(&samples, now, &self.config.baseline)?;
        let flappiness = flappiness(&samples, now, &self.config.flappiness);
        let current_firing = score::firing_share(
            &samples,
            now - Duration::from_secs(3600),
            now,
        );
        let deviation = deviation(current_firing, &baseline);
        let categorisation = categorize(&samples, flappiness, now, &self.config.flappiness);
        let analysis = AlertAnalysis {
            baseline,
            deviation,
            flappiness,
            categorisation,
            computed_at: now,
        };
        self.cache.put(alert_uid, analysis.clone(), now);
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectre_core::Error;
    use spectre_graph::{EdgeType, GraphEdge, GraphUpdate, MemoryGraph, NodeKind, NodeRef};

    const HOUR: i64 = 3600;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(1_700_000_000 + secs)
    }

    async fn graph_with_transitions(
        transitions: &[(AlertStateKind, i64)],
    ) -> Arc<MemoryGraph> {
        let graph = Arc::new(MemoryGraph::new());
        let alert = NodeRef::new(NodeKind::Alert, "a-1");
        let mut update = GraphUpdate::new();
        for (state, secs) in transitions {
            let at = ts(*secs);
            update = update.edge(
                GraphEdge::new(EdgeType::StateTransition, alert.clone(), alert.clone(), at)
                    .discriminated(&at.as_nanos().to_string())
                    .prop("toState", state.as_str())
                    .prop("timestamp", at.as_nanos())
                    .expires(at + Duration::from_secs(7 * 24 * 3600)),
            );
        }
        graph.apply(update).await.unwrap();
        graph
    }

    #[tokio::test]
    async fn short_histories_surface_insufficient_data() {
        let graph = graph_with_transitions(&[(AlertStateKind::Firing, 0)]).await;
        let service = AnalysisService::new(graph, AnalysisConfig::default());
        let err = service.analyze("a-1", ts(12 * HOUR)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientData {
                available_hours: 12,
                required_hours: 24
            }
        ));
    }

    #[tokio::test]
    async fn analyses_are_cached_for_one_interval() {
        let graph = graph_with_transitions(&[
            (AlertStateKind::Firing, 0),
            (AlertStateKind::Normal, 2 * HOUR),
        ])
        .await;
        let service = AnalysisService::new(graph, AnalysisConfig::default());
        let now = ts(48 * HOUR);
        let first = service.analyze("a-1", now).await.unwrap();
        let again = service
            .analyze("a-1", now + Duration::from_secs(60))
            .await
            .unwrap();
        // the cached result keeps its original computedAt
        assert_eq!(again.computed_at, first.computed_at);

        let later = service
            .analyze("a-1", now + Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(later.computed_at, now + Duration::from_secs(600));
    }

    #[tokio::test]
    async fn full_analysis_carries_every_dimension() {
        let graph = graph_with_transitions(&[
            (AlertStateKind::Firing, 0),
            (AlertStateKind::Normal, 30 * HOUR),
        ])
        .await;
        let service = AnalysisService::new(graph, AnalysisConfig::default());
        let analysis = service.analyze("a-1", ts(40 * HOUR)).await.unwrap();
        assert!(analysis.baseline.sample_days > 0);
        assert!((0.0..=1.0).contains(&analysis.flappiness));
        assert_eq!(analysis.categorisation.patterns.len(), 1);
        assert!(analysis.deviation >= 0.0);
    }
}
