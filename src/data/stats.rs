//! Acquisition counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of acquisition diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorStats {
    /// Gateway sessions spawned.
    pub connect_attempts: u64,
    /// Sessions that completed the connect exchange.
    pub connections: u64,
    /// Streaming waits that timed out or lost the gateway.
    pub link_losses: u64,
    /// Heart rate values published.
    pub published: u64,
    /// Notifications dropped because they failed to decode.
    pub dropped: u64,
    /// Smoothed time between notifications, once streaming.
    pub period: Option<Duration>,
}

/// Shared counters updated by the worker.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    link_losses: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    /// Period estimate in microseconds; zero until the first notification.
    period_micros: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_link_loss(&self) {
        self.link_losses.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_period(&self, period: Duration) {
        let micros = u64::try_from(period.as_micros()).unwrap_or(u64::MAX).max(1);
        self.period_micros.store(micros, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> MonitorStats {
        let period_micros = self.period_micros.load(Ordering::SeqCst);
        MonitorStats {
            connect_attempts: self.connect_attempts.load(Ordering::SeqCst),
            connections: self.connections.load(Ordering::SeqCst),
            link_losses: self.link_losses.load(Ordering::SeqCst),
            published: self.published.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            period: (period_micros > 0).then(|| Duration::from_micros(period_micros)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot(), MonitorStats::default());

        counters.record_connect_attempt();
        counters.record_connect_attempt();
        counters.record_connection();
        counters.record_published();
        counters.record_dropped();
        counters.record_link_loss();
        counters.record_period(Duration::from_millis(980));

        let stats = counters.snapshot();
        assert_eq!(stats.connect_attempts, 2);
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.published, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.link_losses, 1);
        assert_eq!(stats.period, Some(Duration::from_millis(980)));
    }
}
