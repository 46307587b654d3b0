//! Counters for pipeline activity.
//!
//! Counters are updated with relaxed atomics from whichever task owns the
//! corresponding pipeline stage and read as a consistent-enough snapshot for
//! logging at shutdown or from tests.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters, one instance per pipeline run.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    frames_received: AtomicU64,
    observations_decoded: AtomicU64,
    decode_mismatches: AtomicU64,
    truncated_frames: AtomicU64,
    unresolved_sensors: AtomicU64,
    batches_sent: AtomicU64,
    entries_delivered: AtomicU64,
    entries_discarded: AtomicU64,
}

impl PipelineMetrics {
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decoded(&self) {
        self.observations_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_mismatch(&self) {
        self.decode_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_truncated_frame(&self) {
        self.truncated_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unresolved_sensor(&self) {
        self.unresolved_sensors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_sent(&self, entries: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.entries_delivered
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn record_entries_discarded(&self, entries: usize) {
        self.entries_discarded
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            observations_decoded: self.observations_decoded.load(Ordering::Relaxed),
            decode_mismatches: self.decode_mismatches.load(Ordering::Relaxed),
            truncated_frames: self.truncated_frames.load(Ordering::Relaxed),
            unresolved_sensors: self.unresolved_sensors.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            entries_delivered: self.entries_delivered.load(Ordering::Relaxed),
            entries_discarded: self.entries_discarded.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub observations_decoded: u64,
    pub decode_mismatches: u64,
    pub truncated_frames: u64,
    pub unresolved_sensors: u64,
    pub batches_sent: u64,
    pub entries_delivered: u64,
    pub entries_discarded: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames={} decoded={} mismatches={} truncated={} unresolved={} batches={} delivered={} discarded={}",
            self.frames_received,
            self.observations_decoded,
            self.decode_mismatches,
            self.truncated_frames,
            self.unresolved_sensors,
            self.batches_sent,
            self.entries_delivered,
            self.entries_discarded,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_recorded_counts() {
        let metrics = PipelineMetrics::default();
        metrics.record_frame();
        metrics.record_frame();
        metrics.record_decoded();
        metrics.record_decode_mismatch();
        metrics.record_unresolved_sensor();
        metrics.record_batch_sent(10);
        metrics.record_batch_sent(3);
        metrics.record_entries_discarded(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.observations_decoded, 1);
        assert_eq!(snapshot.decode_mismatches, 1);
        assert_eq!(snapshot.truncated_frames, 0);
        assert_eq!(snapshot.unresolved_sensors, 1);
        assert_eq!(snapshot.batches_sent, 2);
        assert_eq!(snapshot.entries_delivered, 13);
        assert_eq!(snapshot.entries_discarded, 2);
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = PipelineMetrics::default();
        metrics.record_frame();
        let line = metrics.snapshot().to_string();
        assert!(line.starts_with("frames=1 decoded=0"));
        assert!(line.ends_with("discarded=0"));
    }
}
