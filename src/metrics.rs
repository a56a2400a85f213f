//! Sync counters in Prometheus text format
//!
//! Counters are plain atomics so the reader task and the frame loop can bump
//! them without coordination. The rendered text is logged periodically; there
//! is no HTTP endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::world::constants::frame::TIMING_SAMPLES;
use crate::world::registry::ReconcileStats;

/// Counters for one client session
#[derive(Debug)]
pub struct SyncMetrics {
    // Inbound traffic
    pub inbound_messages: AtomicU64,
    pub inbound_dropped: AtomicU64,
    pub undecodable_messages: AtomicU64,
    pub full_syncs: AtomicU64,
    pub deltas: AtomicU64,
    pub presence_updates: AtomicU64,
    pub self_echoes_dropped: AtomicU64,

    // Entity churn
    pub entities_created: AtomicU64,
    pub entities_updated: AtomicU64,
    pub entities_removed: AtomicU64,
    pub unknown_removals: AtomicU64,
    pub rejected_records: AtomicU64,

    // Outbound traffic
    pub outbound_messages: AtomicU64,
    pub outbound_failures: AtomicU64,

    // Frame timing (microseconds)
    pub frames: AtomicU64,
    pub frame_time_us: AtomicU64,
    pub frame_time_p95_us: AtomicU64,
    pub frame_time_max_us: AtomicU64,

    start_time: Instant,
    frame_history: RwLock<VecDeque<u64>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            inbound_messages: AtomicU64::new(0),
            inbound_dropped: AtomicU64::new(0),
            undecodable_messages: AtomicU64::new(0),
            full_syncs: AtomicU64::new(0),
            deltas: AtomicU64::new(0),
            presence_updates: AtomicU64::new(0),
            self_echoes_dropped: AtomicU64::new(0),
            entities_created: AtomicU64::new(0),
            entities_updated: AtomicU64::new(0),
            entities_removed: AtomicU64::new(0),
            unknown_removals: AtomicU64::new(0),
            rejected_records: AtomicU64::new(0),
            outbound_messages: AtomicU64::new(0),
            outbound_failures: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            frame_time_us: AtomicU64::new(0),
            frame_time_p95_us: AtomicU64::new(0),
            frame_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            frame_history: RwLock::new(VecDeque::with_capacity(TIMING_SAMPLES)),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_reconcile(&self, stats: ReconcileStats) {
        Self::add(&self.entities_created, stats.created);
        Self::add(&self.entities_updated, stats.updated);
        Self::add(&self.entities_removed, stats.removed);
    }

    /// Record a frame build time and refresh p95/max
    pub fn record_frame_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.frame_time_us.store(us, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);

        let mut history = self.frame_history.write();
        history.push_back(us);
        while history.len() > TIMING_SAMPLES {
            history.pop_front();
        }

        let mut sorted: Vec<u64> = history.iter().copied().collect();
        sorted.sort_unstable();
        let p95_idx = (sorted.len() as f32 * 0.95) as usize;
        self.frame_time_p95_us
            .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
        self.frame_time_max_us
            .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
    }

    /// Mean frame build time over the recent window
    pub fn average_frame_time(&self) -> Duration {
        let history = self.frame_history.read();
        if history.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_micros(history.iter().sum::<u64>() / history.len() as u64)
    }

    /// Share of the frame budget used on average (1.0 = fully used)
    pub fn budget_ratio(&self, frame_interval: Duration) -> f32 {
        if frame_interval.is_zero() {
            return 0.0;
        }
        self.average_frame_time().as_secs_f32() / frame_interval.as_secs_f32()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Prometheus text exposition
    pub fn render(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        metric!("aquarium_inbound_messages_total", "Envelopes received", "counter", load(&self.inbound_messages));
        metric!("aquarium_inbound_dropped_total", "Envelopes dropped on a full queue", "counter", load(&self.inbound_dropped));
        metric!("aquarium_undecodable_messages_total", "Envelopes that did not decode", "counter", load(&self.undecodable_messages));
        metric!("aquarium_full_syncs_total", "Full snapshots applied", "counter", load(&self.full_syncs));
        metric!("aquarium_deltas_total", "Entity deltas applied", "counter", load(&self.deltas));
        metric!("aquarium_presence_updates_total", "Cursor presence updates", "counter", load(&self.presence_updates));
        metric!("aquarium_self_echoes_dropped_total", "Own presence echoes dropped", "counter", load(&self.self_echoes_dropped));

        metric!("aquarium_entities_created_total", "Entities created", "counter", load(&self.entities_created));
        metric!("aquarium_entities_updated_total", "Entity updates merged", "counter", load(&self.entities_updated));
        metric!("aquarium_entities_removed_total", "Entities removed", "counter", load(&self.entities_removed));
        metric!("aquarium_unknown_removals_total", "Removals of ids not held", "counter", load(&self.unknown_removals));
        metric!("aquarium_rejected_records_total", "Entity records that could not be read", "counter", load(&self.rejected_records));

        metric!("aquarium_outbound_messages_total", "Intents sent", "counter", load(&self.outbound_messages));
        metric!("aquarium_outbound_failures_total", "Intents that could not be sent", "counter", load(&self.outbound_failures));

        metric!("aquarium_frames_total", "Frames rendered", "counter", load(&self.frames));
        metric!("aquarium_frame_time_microseconds", "Last frame build time", "gauge", load(&self.frame_time_us));
        metric!("aquarium_frame_time_p95_microseconds", "95th percentile frame build time", "gauge", load(&self.frame_time_p95_us));
        metric!("aquarium_frame_time_max_microseconds", "Slowest recent frame build time", "gauge", load(&self.frame_time_max_us));
        metric!("aquarium_uptime_seconds", "Client uptime in seconds", "counter", self.uptime_seconds());

        output
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = SyncMetrics::new();
        SyncMetrics::incr(&metrics.full_syncs);
        metrics.record_reconcile(ReconcileStats { created: 3, updated: 1, removed: 2 });

        let text = metrics.render();
        assert!(text.contains("aquarium_full_syncs_total 1\n"));
        assert!(text.contains("aquarium_entities_created_total 3\n"));
        assert!(text.contains("aquarium_entities_removed_total 2\n"));
        assert!(text.contains("# TYPE aquarium_deltas_total counter\n"));
    }

    #[test]
    fn test_frame_time_percentiles() {
        let metrics = SyncMetrics::new();
        for us in 1..=100u64 {
            metrics.record_frame_time(Duration::from_micros(us));
        }
        assert_eq!(metrics.frames.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.frame_time_us.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.frame_time_p95_us.load(Ordering::Relaxed), 96);
        assert_eq!(metrics.frame_time_max_us.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_frame_history_is_bounded() {
        let metrics = SyncMetrics::new();
        for _ in 0..(TIMING_SAMPLES + 50) {
            metrics.record_frame_time(Duration::from_micros(5));
        }
        assert_eq!(metrics.frame_history.read().len(), TIMING_SAMPLES);
    }

    #[test]
    fn test_budget_ratio_from_frame_window() {
        let metrics = SyncMetrics::new();
        let budget = Duration::from_millis(10);
        assert_eq!(metrics.budget_ratio(budget), 0.0);

        metrics.record_frame_time(Duration::from_millis(2));
        metrics.record_frame_time(Duration::from_millis(4));
        assert_eq!(metrics.average_frame_time(), Duration::from_millis(3));
        assert!((metrics.budget_ratio(budget) - 0.3).abs() < 1e-6);
        assert_eq!(metrics.budget_ratio(Duration::ZERO), 0.0);
    }
}
