//! Heart rate delivery to consumers.
//!
//! The worker is the single producer. The latest heart rate lives in a
//! `watch` cell so consumers can poll it without blocking (an overlay
//! typically polls once per rendered frame). Full readings are broadcast
//! for consumers that want every decoded notification.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::data::HeartRateReading;

/// Capacity of the readings broadcast channel.
const READINGS_CAPACITY: usize = 64;

/// Producer side of the heart rate channel.
#[derive(Debug, Clone)]
pub struct HeartRatePublisher {
    latest_tx: Arc<watch::Sender<Option<u16>>>,
    readings_tx: broadcast::Sender<HeartRateReading>,
}

impl HeartRatePublisher {
    /// Create a publisher with nothing published yet.
    pub fn new() -> Self {
        let (latest_tx, _) = watch::channel(None);
        let (readings_tx, _) = broadcast::channel(READINGS_CAPACITY);
        Self {
            latest_tx: Arc::new(latest_tx),
            readings_tx,
        }
    }

    /// Publish a decoded reading, replacing the latest value.
    ///
    /// Never blocks and never fails; slow or absent consumers only miss
    /// values.
    pub fn publish(&self, reading: HeartRateReading) {
        self.latest_tx.send_replace(Some(reading.heart_rate));
        let _ = self.readings_tx.send(reading);
    }

    /// Create a non-blocking receiver for the latest heart rate.
    pub fn receiver(&self) -> HeartRateReceiver {
        HeartRateReceiver::new(self.latest_tx.subscribe())
    }

    /// Subscribe to every published reading.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<HeartRateReading> {
        self.readings_tx.subscribe()
    }

    /// The most recently published heart rate.
    pub fn latest(&self) -> Option<u16> {
        *self.latest_tx.borrow()
    }
}

impl Default for HeartRatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the latest-value cell.
///
/// Each receiver tracks what it has already seen, so several consumers can
/// poll independently.
#[derive(Debug, Clone)]
pub struct HeartRateReceiver {
    rx: watch::Receiver<Option<u16>>,
    /// Last value this receiver returned.
    last: Option<u16>,
}

impl HeartRateReceiver {
    fn new(rx: watch::Receiver<Option<u16>>) -> Self {
        let last = *rx.borrow();
        Self { rx, last }
    }

    /// Take the newest value if one was published since the last pull.
    ///
    /// Returns `None` without blocking when nothing new is available.
    pub fn try_recv(&mut self) -> Option<u16> {
        let value = {
            let latest = self.rx.borrow_and_update();
            if !latest.has_changed() {
                return None;
            }
            *latest
        };

        if value.is_some() {
            self.last = value;
        }
        value
    }

    /// The newest value if there is one, else the last value seen.
    ///
    /// This is the "keep showing the previous value" convention of a
    /// per-frame display.
    pub fn current(&mut self) -> Option<u16> {
        self.try_recv().or(self.last)
    }

    /// The last value returned by this receiver, without polling.
    pub fn last_seen(&self) -> Option<u16> {
        self.last
    }

    /// Wait for the next published value.
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<u16> {
        loop {
            self.rx.changed().await.ok()?;
            let value = *self.rx.borrow_and_update();
            if let Some(value) = value {
                self.last = Some(value);
                return Some(value);
            }
        }
    }
}

/// Turn a readings subscription into a stream.
///
/// Readings missed because the consumer lagged behind are skipped.
pub fn readings_stream(
    rx: broadcast::Receiver<HeartRateReading>,
) -> BoxStream<'static, HeartRateReading> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(reading) => return Some((reading, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Readings consumer lagged, skipped {} readings", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HeartRateMeasurement;

    fn reading(heart_rate: u8) -> HeartRateReading {
        HeartRateReading::new(HeartRateMeasurement::parse(&[0x00, heart_rate]).unwrap())
    }

    #[test]
    fn test_try_recv_returns_each_value_once() {
        let publisher = HeartRatePublisher::new();
        let mut receiver = publisher.receiver();

        assert_eq!(receiver.try_recv(), None);

        publisher.publish(reading(70));
        assert_eq!(receiver.try_recv(), Some(70));
        assert_eq!(receiver.try_recv(), None);
        assert_eq!(receiver.last_seen(), Some(70));
    }

    #[test]
    fn test_try_recv_skips_to_newest() {
        let publisher = HeartRatePublisher::new();
        let mut receiver = publisher.receiver();

        publisher.publish(reading(70));
        publisher.publish(reading(71));
        publisher.publish(reading(72));

        assert_eq!(receiver.try_recv(), Some(72));
        assert_eq!(publisher.latest(), Some(72));
    }

    #[test]
    fn test_current_is_sticky() {
        let publisher = HeartRatePublisher::new();
        let mut receiver = publisher.receiver();
        assert_eq!(receiver.current(), None);

        publisher.publish(reading(64));
        assert_eq!(receiver.current(), Some(64));
        assert_eq!(receiver.current(), Some(64));
    }

    #[test]
    fn test_receivers_are_independent() {
        let publisher = HeartRatePublisher::new();
        let mut first = publisher.receiver();
        let mut second = publisher.receiver();

        publisher.publish(reading(80));
        assert_eq!(first.try_recv(), Some(80));
        assert_eq!(second.try_recv(), Some(80));
    }

    #[test]
    fn test_late_receiver_starts_from_latest() {
        let publisher = HeartRatePublisher::new();
        publisher.publish(reading(90));

        let mut receiver = publisher.receiver();
        assert_eq!(receiver.last_seen(), Some(90));
        assert_eq!(receiver.try_recv(), None);
        assert_eq!(receiver.current(), Some(90));
    }

    #[test]
    fn test_try_recv_after_publisher_dropped() {
        let publisher = HeartRatePublisher::new();
        let mut receiver = publisher.receiver();
        publisher.publish(reading(75));
        drop(publisher);

        assert_eq!(receiver.try_recv(), Some(75));
        assert_eq!(receiver.try_recv(), None);
        assert_eq!(receiver.current(), Some(75));
    }

    #[tokio::test]
    async fn test_changed_waits_for_value() {
        let publisher = HeartRatePublisher::new();
        let mut receiver = publisher.receiver();

        let producer = publisher.clone();
        tokio::spawn(async move {
            producer.publish(reading(66));
        });

        assert_eq!(receiver.changed().await, Some(66));
    }

    #[test]
    fn test_changed_is_pending_until_publish() {
        let publisher = HeartRatePublisher::new();
        let mut receiver = publisher.receiver();

        let mut changed = tokio_test::task::spawn(receiver.changed());
        tokio_test::assert_pending!(changed.poll());

        publisher.publish(reading(68));
        assert!(changed.is_woken());
        assert_eq!(tokio_test::assert_ready!(changed.poll()), Some(68));
    }

    #[tokio::test]
    async fn test_changed_ends_with_publisher() {
        let publisher = HeartRatePublisher::new();
        let mut receiver = publisher.receiver();
        drop(publisher);
        assert_eq!(receiver.changed().await, None);
    }

    #[tokio::test]
    async fn test_readings_stream_in_order() {
        let publisher = HeartRatePublisher::new();
        let readings = readings_stream(publisher.subscribe_readings());

        publisher.publish(reading(60));
        publisher.publish(reading(61));
        drop(publisher);

        let collected: Vec<u16> = readings.map(|r| r.heart_rate).collect().await;
        assert_eq!(collected, vec![60, 61]);
    }

    #[tokio::test]
    async fn test_readings_stream_skips_lagged() {
        let publisher = HeartRatePublisher::new();
        let readings = readings_stream(publisher.subscribe_readings());

        for value in 0..(READINGS_CAPACITY as u8 + 10) {
            publisher.publish(reading(value));
        }
        drop(publisher);

        let collected: Vec<u16> = readings.map(|r| r.heart_rate).collect().await;
        assert_eq!(collected.len(), READINGS_CAPACITY);
        assert_eq!(collected.last().copied(), Some(READINGS_CAPACITY as u16 + 9));
    }
}
