//! Background revalidation of inferred edges.

use std::{sync::Arc, time::Duration};

use spectre_core::{Result, Timestamp};
use spectre_graph::{EdgeQuery, EdgeType, GraphClient, GraphUpdate, NodeKind, ValidationState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extract::{decayed_confidence, ScoringConfig};

/// Timing knobs for the revalidation worker
#[derive(Debug, Clone)]
pub struct RevalidationConfig {
    /// How often the worker wakes up
    pub interval: Duration,
    /// Edges validated longer ago than this are revisited
    pub decay_horizon: Duration,
    /// Scoring thresholds and the decay half-life
    pub scoring: ScoringConfig,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            decay_horizon: Duration::from_secs(24 * 3600),
            scoring: ScoringConfig::default(),
        }
    }
}

/// Outcome of one revalidation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationReport {
    /// Edges whose decayed confidence was re-recorded as valid
    pub revalidated: usize,
    /// Edges removed (stale, or decayed below the drop threshold)
    pub deleted: usize,
    /// Edges kept but marked invalid because their referent is gone
    pub invalidated: usize,
}

/// Periodically decays, downgrades or removes inferred edges
pub struct Revalidator<C> {
    graph: Arc<C>,
    config: RevalidationConfig,
}

impl<C: GraphClient + 'static> Revalidator<C> {
    /// Worker over the given client
    #[must_use]
    pub fn new(graph: Arc<C>, config: RevalidationConfig) -> Self {
        Self { graph, config }
    }

    /// One pass: remove stale edges, then revisit aged ones
    pub async fn run_once(&self, now: Timestamp) -> Result<RevalidationReport> {
        let mut report = RevalidationReport::default();

        // stale edges were flagged by deletes; remove them outright
        let stale = self
            .graph
            .edges(EdgeQuery {
                validation_states: vec![ValidationState::Stale],
                ..Default::default()
            })
            .await?;
        if !stale.is_empty() {
            let keys: Vec<_> = stale.into_iter().map(|e| e.key).collect();
            report.deleted += self.graph.delete_edges(&keys).await?;
        }

        for edge_type in [EdgeType::Manages, EdgeType::CreatesObserved] {
            let aged = self
                .graph
                .edges(EdgeQuery {
                    edge_type: Some(edge_type),
                    last_validated_before: Some(now - self.config.decay_horizon),
                    ..Default::default()
                })
                .await?;
            for edge in aged {
                let referent = self
                    .graph
                    .get_node(NodeKind::ResourceIdentity, &edge.key.to.key)
                    .await?;
                let referent_gone = referent.map_or(true, |n| n.deleted);
                if referent_gone {
                    let mut invalid = edge;
                    invalid.validation_state = Some(ValidationState::Invalid);
                    invalid.last_validated = Some(now);
                    self.graph
                        .apply(GraphUpdate::new().edge(invalid))
                        .await?;
                    report.invalidated += 1;
                    continue;
                }

                let validated = edge.last_validated.unwrap_or(edge.first_observed);
                let age = Duration::from_nanos(
                    now.as_nanos().saturating_sub(validated.as_nanos()).max(0) as u64,
                );
                let confidence = decayed_confidence(
                    edge.confidence.unwrap_or(0.0),
                    age,
                    self.config.scoring.decay_half_life,
                );
                if confidence < self.config.scoring.drop_confidence {
                    debug!(edge = ?edge.key, confidence, "dropping decayed edge");
                    report.deleted += self.graph.delete_edges(&[edge.key]).await?;
                } else {
                    let mut refreshed = edge;
                    refreshed.confidence = Some(confidence);
                    refreshed.last_validated = Some(now);
                    refreshed.validation_state = Some(ValidationState::Valid);
                    self.graph
                        .apply(GraphUpdate::new().edge(refreshed))
                        .await?;
                    report.revalidated += 1;
                }
            }
        }
        info!(?report, "revalidation pass complete");
        Ok(report)
    }

    /// Run on a ticker until cancelled
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.run_once(Timestamp::now()).await {
                            warn!(error = %err, "revalidation pass failed");
                        }
                    }
                }
            }
        })
    }
}
