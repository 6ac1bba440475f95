//! Derivation of status segments from one resource's in-window events.

use spectre_core::{status, Event, EventType, ResourceStatus, StatusSegment, Timestamp};

/// Walk one resource's events and derive its status segments
///
/// `events` must be the resource's own change events, ordered by
/// `(timestamp, id)`, and already restricted to `[window_start, window_end]`
/// — state that leaked from before the window must not be passed in here.
///
/// A new segment begins when the classified status differs from the previous
/// segment's status; the previous segment then ends exactly where the new
/// one begins (half-open intervals, so segments never overlap). The terminal
/// segment ends at the window end or the delete timestamp, whichever is
/// smaller, clamped so `start_time < end_time` always holds.
pub fn derive_segments(
    events: &[Event],
    window_start: Timestamp,
    window_end: Timestamp,
) -> Vec<StatusSegment> {
    let mut segments: Vec<StatusSegment> = Vec::new();
    let mut deleted_at: Option<Timestamp> = None;
    for event in events {
        debug_assert!(event.timestamp >= window_start && event.timestamp <= window_end);
        let (derived, message) = status::classify(event.event_type, &event.data);
        if event.event_type == EventType::Delete {
            deleted_at = Some(event.timestamp);
        }
        match segments.last_mut() {
            Some(prev) if prev.status == derived => {
                // same status, the segment simply continues
            }
            prev => {
                let start_time = event.timestamp;
                if let Some(prev) = prev {
                    prev.end_time = start_time;
                }
                segments.push(StatusSegment {
                    start_time,
                    end_time: start_time, // fixed up below or by the next segment
                    status: derived,
                    message,
                    resource_data: Some(event.data.clone()),
                });
            }
        }
    }
    if let Some(last) = segments.last_mut() {
        let mut end = window_end;
        if let Some(deleted) = deleted_at {
            end = end.min(deleted);
        }
        last.end_time = end.max(Timestamp::from_nanos(last.start_time.as_nanos() + 1));
    }
    // a degenerate middle segment can only come from equal-timestamp events;
    // drop anything that still fails the strict ordering invariant
    segments.retain(|s| s.start_time < s.end_time);
    segments
}

/// The worst status across a set of segments, used for summaries
#[must_use]
pub fn worst_status(segments: &[StatusSegment]) -> ResourceStatus {
    let mut worst = ResourceStatus::Unknown;
    for segment in segments {
        worst = match (worst, segment.status) {
            (_, ResourceStatus::Error) | (ResourceStatus::Error, _) => ResourceStatus::Error,
            (_, ResourceStatus::Terminating) | (ResourceStatus::Terminating, _) => {
                ResourceStatus::Terminating
            }
            (_, ResourceStatus::Warning) | (ResourceStatus::Warning, _) => ResourceStatus::Warning,
            (_, ResourceStatus::Ready) | (ResourceStatus::Ready, _) => ResourceStatus::Ready,
            _ => ResourceStatus::Unknown,
        };
    }
    worst
}
