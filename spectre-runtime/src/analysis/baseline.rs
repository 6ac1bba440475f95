//! Rolling behavioural baselines of alert state.

use std::time::Duration;

use chrono::{Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use spectre_core::{Error, Result, Timestamp};

use super::{score, StateSample};
use crate::grafana::AlertStateKind;

/// Baseline window and history requirements
#[derive(Debug, Clone)]
pub struct BaselineConfig {
    /// Rolling window the baseline is computed over
    pub window: Duration,
    /// Minimum history before a baseline is meaningful
    pub min_history: Duration,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(7 * 24 * 3600),
            min_history: Duration::from_secs(24 * 3600),
        }
    }
}

/// Weekday/weekend split of baseline keys
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    /// Monday through Friday
    Weekday,
    /// Saturday and Sunday
    Weekend,
}

impl DayType {
    /// The day type of an instant (UTC)
    #[must_use]
    pub fn of(ts: Timestamp) -> Self {
        let dt = Utc
            .timestamp_opt(ts.as_secs(), 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        match dt.weekday() {
            chrono::Weekday::Sat | chrono::Weekday::Sun => DayType::Weekend,
            _ => DayType::Weekday,
        }
    }
}

/// Distribution of alert state for one `(hour, dayType)` slot
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    /// Hour of day (UTC) the baseline describes
    pub window_hour: u32,
    /// Weekday or weekend
    pub day_type: DayType,
    /// Share of time in Normal, 0–100
    pub percent_normal: f64,
    /// Share of time in Pending, 0–100
    pub percent_pending: f64,
    /// Share of time in Firing, 0–100
    pub percent_firing: f64,
    /// Standard deviation of the firing share over daily samples
    pub std_dev: f64,
    /// Daily samples that contributed
    pub sample_days: usize,
}

/// Compute the baseline for the hour-of-day and day type of `now`
///
/// State is carried forward across gaps (LOCF). Each matching day in the
/// window contributes one sample: the state distribution during that day's
/// target hour. Less than `min_history` of observed history is an
/// [`Error::InsufficientData`] carrying both horizons.
pub fn compute_baseline(
    samples: &[StateSample],
    now: Timestamp,
    config: &BaselineConfig,
) -> Result<Baseline> {
    let required_hours = config.min_history.as_secs() / 3600;
    let Some(first) = samples.first() else {
        return Err(Error::InsufficientData {
            available_hours: 0,
            required_hours,
        });
    };
    let available = now.as_nanos().saturating_sub(first.at.as_nanos()).max(0) as u64;
    let available_hours = available / (3600 * 1_000_000_000);
    if Duration::from_nanos(available) < config.min_history {
        return Err(Error::InsufficientData {
            available_hours,
            required_hours,
        });
    }

    let hour_of_day = Utc
        .timestamp_opt(now.as_secs(), 0)
        .single()
        .map(|dt| dt.hour())
        .unwrap_or(0);
    let day_type = DayType::of(now);

    let window_days = (config.window.as_secs() / (24 * 3600)).max(1);
    let mut daily_firing = Vec::new();
    let mut sums = (0.0f64, 0.0f64, 0.0f64);
    for day in 0..window_days {
        let slot_start = now.hour_start() - Duration::from_secs(day * 24 * 3600);
        if DayType::of(slot_start) != day_type {
            continue;
        }
        let slot_end = (slot_start + Duration::from_secs(3600)).min(now);
        let Some(shares) = score::state_shares(samples, slot_start, slot_end) else {
            continue;
        };
        sums.0 += shares[AlertStateKind::Normal as usize];
        sums.1 += shares[AlertStateKind::Pending as usize];
        sums.2 += shares[AlertStateKind::Firing as usize];
        daily_firing.push(shares[AlertStateKind::Firing as usize]);
    }

    let sample_days = daily_firing.len();
    let (percent_normal, percent_pending, percent_firing) = if sample_days == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let n = sample_days as f64;
        (sums.0 / n, sums.1 / n, sums.2 / n)
    };
    let std_dev = if sample_days == 0 {
        0.0
    } else {
        let mean = percent_firing;
        let variance = daily_firing
            .iter()
            .map(|f| (f - mean).powi(2))
            .sum::<f64>()
            / sample_days as f64;
        variance.sqrt()
    };

    Ok(Baseline {
        window_hour: hour_of_day,
        day_type,
        percent_normal,
        percent_pending,
        percent_firing,
        std_dev,
        sample_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-13 is a Monday
    const MONDAY_MIDNIGHT: i64 = 1_699_833_600;

    fn ts(hours: f64) -> Timestamp {
        Timestamp::from_nanos(
            MONDAY_MIDNIGHT * 1_000_000_000 + (hours * 3600.0 * 1e9) as i64,
        )
    }

    fn sample(state: AlertStateKind, hours: f64) -> StateSample {
        StateSample {
            state,
            at: ts(hours),
        }
    }

    #[test]
    fn twelve_hours_of_history_is_insufficient() {
        // S6: 12h of history against a 24h requirement
        let samples = vec![sample(AlertStateKind::Firing, 0.0)];
        let err = compute_baseline(&samples, ts(12.0), &BaselineConfig::default()).unwrap_err();
        match err {
            Error::InsufficientData {
                available_hours,
                required_hours,
            } => {
                assert_eq!(available_hours, 12);
                assert_eq!(required_hours, 24);
            }
            other => panic!("expected InsufficientData, got {other}"),
        }
    }

    #[test]
    fn locf_carries_state_across_gaps() {
        // firing from hour 0, normal from hour 30, then silence
        let samples = vec![
            sample(AlertStateKind::Firing, 0.0),
            sample(AlertStateKind::Normal, 30.0),
        ];
        // Thursday 00:30: the midnight slots of Mon and Tue saw firing, the
        // Wed and (partial) Thu slots saw the carried-forward normal
        let baseline = compute_baseline(&samples, ts(72.5), &BaselineConfig::default()).unwrap();
        assert_eq!(baseline.sample_days, 4);
        assert!((baseline.percent_normal - 50.0).abs() < 1e-6);
        assert!((baseline.percent_firing - 50.0).abs() < 1e-6);
        assert!((baseline.std_dev - 50.0).abs() < 1e-6);
        assert_eq!(baseline.day_type, DayType::Weekday);
    }

    #[test]
    fn always_firing_means_full_firing_share_and_zero_spread() {
        let samples = vec![sample(AlertStateKind::Firing, 0.0)];
        let baseline = compute_baseline(&samples, ts(96.0), &BaselineConfig::default()).unwrap();
        assert!((baseline.percent_firing - 100.0).abs() < 1e-6);
        assert!(baseline.std_dev.abs() < 1e-6);
    }
}
