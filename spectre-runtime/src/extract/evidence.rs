//! Evidence-weighted confidence scoring for inferred edges.

use std::time::Duration;

use spectre_core::Timestamp;
use spectre_graph::{Evidence, EvidenceKind};

/// Weights and windows for inference scoring
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Weight of a controller-identifying label match
    pub label_weight: f64,
    /// Weight of a shared namespace
    pub namespace_weight: f64,
    /// Weight of temporal proximity
    pub proximity_weight: f64,
    /// Weight of an observed reconcile event
    pub reconcile_weight: f64,
    /// Window within which proximity earns anything
    pub proximity_window: Duration,
    /// Half-life of the proximity factor inside the window
    pub proximity_half_life: Duration,
    /// Minimum confidence for an edge to be written
    pub min_confidence: f64,
    /// Confidence below which revalidation deletes the edge
    pub drop_confidence: f64,
    /// Clock-skew tolerance for the temporal-ordering guard
    pub clock_skew: Duration,
    /// Half-life of confidence decay between validations
    pub decay_half_life: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            label_weight: 0.4,
            namespace_weight: 0.1,
            proximity_weight: 0.3,
            reconcile_weight: 0.2,
            proximity_window: Duration::from_secs(30),
            proximity_half_life: Duration::from_secs(24),
            min_confidence: 0.5,
            drop_confidence: 0.3,
            clock_skew: Duration::from_secs(5),
            decay_half_life: Duration::from_secs(24 * 3600),
        }
    }
}

impl ScoringConfig {
    /// The temporal-ordering guard
    ///
    /// A manager first seen more than the skew tolerance after the resource
    /// it supposedly manages cannot be its manager.
    #[must_use]
    pub fn temporal_order_ok(&self, manager_first_seen: Timestamp, managed_first_seen: Timestamp) -> bool {
        manager_first_seen <= managed_first_seen + self.clock_skew
    }
}

/// Accumulates evidence into a confidence score
///
/// Every considered evidence type contributes its full weight to the
/// denominator; earned weight accrues only on a match. The result is
/// `Σ earned / Σ total`, clamped to `[0, 1]`.
pub struct EvidenceBuilder {
    config: ScoringConfig,
    items: Vec<Evidence>,
    earned: f64,
    total: f64,
}

impl EvidenceBuilder {
    /// Start scoring under the given config
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
            earned: 0.0,
            total: 0.0,
        }
    }

    /// Consider a label match
    #[must_use]
    pub fn label_match(mut self, matched: Option<&str>, at: Timestamp) -> Self {
        self.total += self.config.label_weight;
        if let Some(value) = matched {
            self.earned += self.config.label_weight;
            self.items.push(Evidence {
                kind: EvidenceKind::LabelMatch,
                value: value.to_string(),
                weight: self.config.label_weight,
                timestamp: at,
            });
        }
        self
    }

    /// Consider a shared namespace
    #[must_use]
    pub fn namespace_match(mut self, matched: bool, namespace: &str, at: Timestamp) -> Self {
        self.total += self.config.namespace_weight;
        if matched {
            self.earned += self.config.namespace_weight;
            self.items.push(Evidence {
                kind: EvidenceKind::NamespaceMatch,
                value: namespace.to_string(),
                weight: self.config.namespace_weight,
                timestamp: at,
            });
        }
        self
    }

    /// Consider temporal proximity between a cause and an effect
    ///
    /// The earned weight decreases monotonically with the gap: an exponential
    /// half-life inside the proximity window, zero outside it.
    #[must_use]
    pub fn temporal_proximity(mut self, gap: Duration, at: Timestamp) -> Self {
        self.total += self.config.proximity_weight;
        if gap <= self.config.proximity_window {
            let half_life = self.config.proximity_half_life.as_secs_f64().max(f64::EPSILON);
            let factor = 0.5_f64.powf(gap.as_secs_f64() / half_life);
            let weight = self.config.proximity_weight * factor;
            self.earned += weight;
            self.items.push(Evidence {
                kind: EvidenceKind::TemporalProximity,
                value: format!("{}s gap", gap.as_secs_f64()),
                weight,
                timestamp: at,
            });
        }
        self
    }

    /// Consider the presence of a reconcile event
    #[must_use]
    pub fn reconcile_event(mut self, observed: Option<&str>, at: Timestamp) -> Self {
        self.total += self.config.reconcile_weight;
        if let Some(value) = observed {
            self.earned += self.config.reconcile_weight;
            self.items.push(Evidence {
                kind: EvidenceKind::ReconcileEvent,
                value: value.to_string(),
                weight: self.config.reconcile_weight,
                timestamp: at,
            });
        }
        self
    }

    /// The clamped confidence score
    #[must_use]
    pub fn confidence(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        (self.earned / self.total).clamp(0.0, 1.0)
    }

    /// Whether the score clears the write threshold
    #[must_use]
    pub fn sufficient(&self) -> bool {
        self.confidence() >= self.config.min_confidence
    }

    /// The collected evidence items
    #[must_use]
    pub fn into_evidence(self) -> Vec<Evidence> {
        self.items
    }
}

/// Confidence decay between validations
///
/// `confidence_t = confidence_0 · 0.5^(Δ / half_life)`
#[must_use]
pub fn decayed_confidence(confidence: f64, since_validated: Duration, half_life: Duration) -> f64 {
    let half_life = half_life.as_secs_f64().max(f64::EPSILON);
    (confidence * 0.5_f64.powf(since_validated.as_secs_f64() / half_life)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> Timestamp {
        Timestamp::from_secs(1_700_000_000)
    }

    #[test]
    fn full_evidence_approaches_one() {
        let builder = EvidenceBuilder::new(ScoringConfig::default())
            .label_match(Some("helm.toolkit.fluxcd.io/name=hr-1"), at())
            .namespace_match(true, "prod", at())
            .temporal_proximity(Duration::ZERO, at())
            .reconcile_event(Some("create"), at());
        assert!((builder.confidence() - 1.0).abs() < 1e-9);
        assert!(builder.sufficient());
        assert_eq!(builder.into_evidence().len(), 4);
    }

    #[test]
    fn missing_evidence_lowers_the_denominator_share() {
        let builder = EvidenceBuilder::new(ScoringConfig::default())
            .label_match(None, at())
            .namespace_match(true, "prod", at())
            .temporal_proximity(Duration::ZERO, at())
            .reconcile_event(None, at());
        // 0.1 + 0.3 out of 1.0
        assert!((builder.confidence() - 0.4).abs() < 1e-9);
        assert!(!builder.sufficient());
    }

    #[test]
    fn proximity_decays_inside_the_window_and_dies_outside() {
        let config = ScoringConfig::default();
        let close = EvidenceBuilder::new(config.clone()).temporal_proximity(Duration::from_secs(8), at());
        let expected = 0.3 * 0.5_f64.powf(8.0 / 24.0);
        assert!((close.earned - expected).abs() < 1e-9);

        let outside =
            EvidenceBuilder::new(config).temporal_proximity(Duration::from_secs(31), at());
        assert_eq!(outside.earned, 0.0);
        assert_eq!(outside.into_evidence().len(), 0);
    }

    #[test]
    fn temporal_guard_tolerates_bounded_skew() {
        let config = ScoringConfig::default();
        let base = Timestamp::from_secs(1_700_000_000);
        assert!(config.temporal_order_ok(base, base + Duration::from_secs(100)));
        assert!(config.temporal_order_ok(base + Duration::from_secs(5), base));
        assert!(!config.temporal_order_ok(base + Duration::from_secs(6), base));
    }

    #[test]
    fn decay_halves_per_half_life() {
        let half = Duration::from_secs(24 * 3600);
        let decayed = decayed_confidence(0.8, half, half);
        assert!((decayed - 0.4).abs() < 1e-9);
        let fresh = decayed_confidence(0.8, Duration::ZERO, half);
        assert!((fresh - 0.8).abs() < 1e-9);
    }
}
