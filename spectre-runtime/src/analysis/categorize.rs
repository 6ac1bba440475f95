//! Multi-label categorisation of alert behaviour.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spectre_core::Timestamp;

use super::{score, FlappinessConfig, StateSample};
use crate::grafana::AlertStateKind;

/// How long the alert has been in trouble (mutually exclusive)
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Onset {
    /// First observed under an hour ago
    New,
    /// Under a day
    Recent,
    /// Under a week
    Persistent,
    /// A week or more, firing at least 80% of the time
    Chronic,
}

/// Behavioural pattern labels
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    /// Flappiness score at or above 0.7
    Flapping,
    /// The last hour fires noticeably more than the prior six
    TrendingWorse,
    /// The last hour fires noticeably less than the prior six
    TrendingBetter,
    /// Currently firing, steadily
    StableFiring,
    /// Currently normal, steadily
    StableNormal,
}

/// Combined labels for one alert
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Categorisation {
    /// Mutually exclusive onset label
    pub onset: Onset,
    /// Pattern labels (currently a single dominant pattern)
    pub patterns: Vec<Pattern>,
}

const TREND_EPSILON: f64 = 5.0; // percentage points

/// Categorise an alert from its transition history
#[must_use]
pub fn categorize(
    samples: &[StateSample],
    flappiness: f64,
    now: Timestamp,
    config: &FlappinessConfig,
) -> Categorisation {
    let onset_anchor = samples
        .iter()
        .find(|s| s.state == AlertStateKind::Firing)
        .or_else(|| samples.first())
        .map(|s| s.at)
        .unwrap_or(now);
    let age = Duration::from_nanos(now.as_nanos().saturating_sub(onset_anchor.as_nanos()).max(0) as u64);
    let overall_firing = score::firing_share(samples, onset_anchor, now);
    let onset = if age < Duration::from_secs(3600) {
        Onset::New
    } else if age < Duration::from_secs(24 * 3600) {
        Onset::Recent
    } else if age < Duration::from_secs(7 * 24 * 3600) || overall_firing < 80.0 {
        Onset::Persistent
    } else {
        Onset::Chronic
    };

    let pattern = if flappiness >= 0.7 {
        Pattern::Flapping
    } else {
        let last_hour = score::firing_share(samples, now - Duration::from_secs(3600), now);
        let prior = score::firing_share(samples, now - config.window, now - Duration::from_secs(3600));
        if last_hour > prior + TREND_EPSILON {
            Pattern::TrendingWorse
        } else if last_hour + TREND_EPSILON < prior {
            Pattern::TrendingBetter
        } else {
            let current = samples.last().map(|s| s.state);
            if current == Some(AlertStateKind::Firing) {
                Pattern::StableFiring
            } else {
                Pattern::StableNormal
            }
        }
    };

    Categorisation {
        onset,
        patterns: vec![pattern],
    }
}
