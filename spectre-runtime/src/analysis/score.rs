//! Flappiness, deviation, and state-share accounting.

use std::time::Duration;

use spectre_core::Timestamp;

use super::{Baseline, StateSample};
use crate::grafana::AlertStateKind;

/// Flappiness scoring knobs
#[derive(Debug, Clone)]
pub struct FlappinessConfig {
    /// Trailing window transitions are counted over
    pub window: Duration,
    /// Steepness of the transition-count curve
    pub k: f64,
}

impl Default for FlappinessConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(6 * 3600),
            k: 0.15,
        }
    }
}

/// Per-state time shares (0–100) within `[start, end]`, LOCF across gaps
///
/// Only time actually covered by observations counts: the stretch before the
/// first sample is excluded from the denominator. `None` when nothing covers
/// the interval.
pub(crate) fn state_shares(
    samples: &[StateSample],
    start: Timestamp,
    end: Timestamp,
) -> Option<[f64; 3]> {
    if start >= end {
        return None;
    }
    let mut current = samples
        .iter()
        .rev()
        .find(|s| s.at <= start)
        .map(|s| s.state);
    let mut t = start;
    if current.is_none() {
        let first_inside = samples.iter().find(|s| s.at > start && s.at < end)?;
        t = first_inside.at;
        current = Some(first_inside.state);
    }
    let mut durations = [0.0f64; 3];
    for sample in samples.iter() {
        if sample.at > t && sample.at < end {
            durations[current.unwrap_or(AlertStateKind::Normal) as usize] +=
                (sample.at.as_nanos() - t.as_nanos()) as f64;
            t = sample.at;
            current = Some(sample.state);
        }
    }
    durations[current? as usize] += (end.as_nanos() - t.as_nanos()) as f64;
    let covered: f64 = durations.iter().sum();
    if covered <= 0.0 {
        return None;
    }
    Some(durations.map(|d| d / covered * 100.0))
}

/// Share of time spent firing within `[start, end]`, 0–100
#[must_use]
pub(crate) fn firing_share(samples: &[StateSample], start: Timestamp, end: Timestamp) -> f64 {
    state_shares(samples, start, end)
        .map(|shares| shares[AlertStateKind::Firing as usize])
        .unwrap_or(0.0)
}

/// Flappiness over the trailing window, clamped to `[0, 1]`
///
/// `1 − exp(−k·transitions)`, multiplied by a duration factor that penalises
/// short-lived states: the average state duration relative to the window
/// maps onto a multiplier in `[0.8, 1.3]` (short states → 1.3).
#[must_use]
pub fn flappiness(samples: &[StateSample], now: Timestamp, config: &FlappinessConfig) -> f64 {
    let start = now - config.window;
    let transitions = samples
        .iter()
        .filter(|s| s.at > start && s.at <= now)
        .count();
    if transitions == 0 {
        return 0.0;
    }
    let base = 1.0 - (-config.k * transitions as f64).exp();
    let average_duration = config.window.as_secs_f64() / (transitions as f64 + 1.0);
    let ratio = (average_duration / config.window.as_secs_f64()).clamp(0.0, 1.0);
    let multiplier = (1.3 - 0.5 * ratio).clamp(0.8, 1.3);
    (base * multiplier).clamp(0.0, 1.0)
}

/// Deviation of the current firing share from the baseline
///
/// `|current − baseline| / stdDev` on the firing dimension, `0` when the
/// baseline never varied.
#[must_use]
pub fn deviation(current_percent_firing: f64, baseline: &Baseline) -> f64 {
    if baseline.std_dev == 0.0 {
        return 0.0;
    }
    (current_percent_firing - baseline.percent_firing).abs() / baseline.std_dev
}
