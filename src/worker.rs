//! Acquisition worker.
//!
//! Runs the connect / resolve / subscribe / stream cycle against one
//! monitor until cancelled, reconnecting whenever the link is lost.
//! Cancellation is cooperative. It is observed before each new session,
//! during the connect exchange, after each notification wait and during
//! the settle pause between attempts.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::channel::HeartRatePublisher;
use crate::config::MonitorConfig;
use crate::connection::{ConnectionState, ConnectionTracker};
use crate::data::{HeartRateReading, PeriodEstimate, StatsCounters};
use crate::error::{Error, Result};
use crate::gateway::{
    enable_notifications, GatewayConnector, GatewaySession, HandleResolver, ResolvedHandles,
};
use crate::protocol::{HeartRateMeasurement, Notification, Pattern, Response};

/// State shared between the worker task and its monitor.
#[derive(Clone)]
pub(crate) struct WorkerShared {
    pub(crate) tracker: ConnectionTracker,
    pub(crate) publisher: HeartRatePublisher,
    pub(crate) stats: Arc<StatsCounters>,
    pub(crate) handles: Arc<RwLock<ResolvedHandles>>,
}

/// The reconnection state machine for one monitor.
pub(crate) struct Worker {
    address: String,
    config: MonitorConfig,
    connector: Arc<dyn GatewayConnector>,
    shared: WorkerShared,
    cancel: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        address: String,
        config: MonitorConfig,
        connector: Arc<dyn GatewayConnector>,
        shared: WorkerShared,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            address,
            config,
            connector,
            shared,
            cancel,
        }
    }

    /// Run until cancelled or a fatal error occurs.
    pub(crate) async fn run(self) -> Result<()> {
        info!("Acquisition worker started");

        let result = self.run_cycles().await;
        self.shared.tracker.set_state(ConnectionState::Disconnected);

        match &result {
            Ok(()) => info!("Acquisition worker stopped"),
            Err(e) => error!("Acquisition worker terminated: {}", e),
        }
        result
    }

    async fn run_cycles(&self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                debug!("Shutdown requested before connecting");
                return Ok(());
            }

            self.shared.tracker.set_state(ConnectionState::Connecting);
            self.shared.stats.record_connect_attempt();
            info!("Connecting to {}", self.address);

            let mut session = match self.connect().await {
                Ok(Some(session)) => session,
                Ok(None) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    warn!("Connection attempt failed: {}", e);
                    self.shared.tracker.set_state(ConnectionState::Disconnected);
                    if self.settle().await {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.shared.stats.record_connection();
            info!("Connected to {}", self.address);

            if self.cancel.is_cancelled() {
                debug!("Shutdown requested while connecting");
                session.close().await;
                return Ok(());
            }

            let outcome = self.stream(&mut session).await;
            session.close().await;

            match outcome {
                Ok(()) => return Ok(()),
                Err(Error::LinkLost) => {
                    info!("Link to {} lost, reconnecting", self.address);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Session failed: {}, reconnecting", e);
                }
                Err(e) => return Err(e),
            }

            self.shared.stats.record_link_loss();
            self.shared.tracker.set_state(ConnectionState::Disconnected);
            if self.settle().await {
                return Ok(());
            }
        }
    }

    /// Spawn a session and bring the link up.
    ///
    /// The connect exchange is raced against shutdown, so a slow gateway
    /// cannot hold a shutdown request past the current wait. Returns `None`
    /// if shutdown was requested; the session is closed in that case.
    async fn connect(&self) -> Result<Option<GatewaySession>> {
        let mut session = GatewaySession::spawn(self.connector.as_ref(), &self.address).await?;

        let handshake = tokio::select! {
            result = session.handshake(&self.config.timeouts) => Some(result),
            _ = self.cancel.cancelled() => None,
        };

        match handshake {
            Some(Ok(())) => Ok(Some(session)),
            Some(Err(e)) => {
                session.close().await;
                Err(e)
            }
            None => {
                debug!("Shutdown requested during the connect exchange");
                session.close().await;
                Ok(None)
            }
        }
    }

    /// Pause before the next attempt. Returns `true` if shutdown was requested.
    async fn settle(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(self.config.reconnect_delay) => false,
        }
    }

    /// Return the cached handles, resolving them on the first connection.
    async fn ensure_handles(&self, session: &mut GatewaySession) -> Result<ResolvedHandles> {
        let cached = *self.shared.handles.read();
        if cached.is_resolved() {
            trace!("Reusing measurement handle {:?}", cached.measurement);
            return Ok(cached);
        }

        self.shared.tracker.set_state(ConnectionState::Resolving);
        let resolver = HandleResolver::new(self.config.timeouts.descriptor);
        let resolved = resolver.resolve(session).await?;

        let handles = ResolvedHandles {
            measurement: resolved.measurement,
            control: resolved.control.or(self.config.control_handle),
        };
        *self.shared.handles.write() = handles;

        info!(
            "Resolved measurement handle {:?}, control handle {:?}",
            handles.measurement, handles.control
        );
        Ok(handles)
    }

    /// Resolve, subscribe and stream notifications.
    ///
    /// Returns `Ok(())` once shutdown is requested. A link that stays quiet
    /// for the notification timeout ends with [`Error::LinkLost`].
    async fn stream(&self, session: &mut GatewaySession) -> Result<()> {
        let handles = self.ensure_handles(session).await?;
        let measurement = handles.measurement.ok_or(Error::ResolutionFailure)?;

        enable_notifications(session, handles.control).await?;
        self.shared.tracker.set_state(ConnectionState::Subscribed);
        self.shared.tracker.set_state(ConnectionState::Streaming);

        let timeout = self.config.timeouts.notification;
        let patterns = [Pattern::Notification(measurement)];
        let mut period = PeriodEstimate::new(Instant::now().into_std());

        loop {
            match session.expect(&patterns, timeout).await {
                Ok(Response::Notification(notification)) => {
                    if self.cancel.is_cancelled() {
                        debug!("Shutdown requested while streaming");
                        return Ok(());
                    }

                    let estimate = period.update(Instant::now().into_std());
                    self.shared.stats.record_period(estimate);
                    self.handle_notification(&notification, estimate);
                }
                Ok(other) => trace!("Ignoring {:?} while streaming", other),
                Err(Error::Timeout) | Err(Error::SessionClosed) => {
                    warn!("No notification within {:?}", timeout);
                    if self.cancel.is_cancelled() {
                        return Ok(());
                    }
                    return Err(Error::LinkLost);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_notification(&self, notification: &Notification, period: Duration) {
        let decoded = notification
            .payload()
            .and_then(|bytes| HeartRateMeasurement::parse(&bytes));

        match decoded {
            Ok(measurement) => {
                debug!(
                    heart_rate = measurement.heart_rate,
                    period_ms = period.as_millis() as u64,
                    "Heart rate {} bpm",
                    measurement.heart_rate
                );
                self.shared.publisher.publish(HeartRateReading::new(measurement));
                self.shared.stats.record_published();
            }
            Err(e) => {
                warn!("Dropping notification '{}': {}", notification.value, e);
                self.shared.stats.record_dropped();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::gateway::mock::{MockGateway, SessionScript, MOCK_PROMPT};
    use crate::protocol::AttributeHandle;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn worker(
        gateway: &MockGateway,
        config: MonitorConfig,
    ) -> (Worker, WorkerShared, CancellationToken) {
        let shared = WorkerShared {
            tracker: ConnectionTracker::new(ADDRESS),
            publisher: HeartRatePublisher::new(),
            stats: Arc::new(StatsCounters::default()),
            handles: Arc::new(RwLock::new(ResolvedHandles {
                measurement: config.measurement_handle,
                control: config.control_handle,
            })),
        };
        let cancel = CancellationToken::new();
        let worker = Worker::new(
            ADDRESS.to_string(),
            config,
            Arc::new(gateway.clone()),
            shared.clone(),
            cancel.clone(),
        );
        (worker, shared, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_never_connects() {
        let gateway = MockGateway::new();
        let (worker, shared, cancel) = worker(&gateway, MonitorConfig::new(ADDRESS));
        cancel.cancel();

        worker.run().await.unwrap();
        assert_eq!(gateway.spawn_count(), 0);
        assert_eq!(shared.tracker.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_failure_is_fatal() {
        let gateway = MockGateway::new();
        gateway.push_session(
            SessionScript::connected().descriptors(&[(0x0001, 0x2800), (0x0003, 0x2a00)]),
        );
        let (worker, shared, _cancel) = worker(&gateway, MonitorConfig::new(ADDRESS));

        let result = worker.run().await;
        assert!(matches!(result, Err(Error::ResolutionFailure)));
        assert_eq!(gateway.spawn_count(), 1);
        assert_eq!(gateway.live_sessions(), 0);
        assert_eq!(shared.tracker.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_and_drops_bad_frames() {
        let gateway = MockGateway::new();
        gateway.push_session(
            SessionScript::connected()
                .heart_rate_descriptors()
                .notification(0x000e, &[0x00, 70])
                .wait(Duration::from_secs(2))
                .notification(0x000e, &[0x01, 0x48])
                .wait(Duration::from_secs(2))
                .notification(0x000e, &[0x10, 71, 0x00, 0x04]),
        );
        let (worker, shared, cancel) = worker(&gateway, MonitorConfig::new(ADDRESS));
        let mut readings = shared.publisher.subscribe_readings();

        let task = tokio::spawn(worker.run());

        assert_eq!(readings.recv().await.unwrap().heart_rate, 70);
        let before = shared.stats.snapshot().period.unwrap();
        assert!((before.as_secs_f64() - 1.0).abs() < 1e-3);

        // The undecodable frame still counts as a sample for the period estimate.
        while shared.stats.snapshot().dropped == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let stats = shared.stats.snapshot();
        assert_eq!(stats.published, 1);
        let after = stats.period.unwrap();
        assert!(after > before);
        assert!((after.as_secs_f64() - 1.0625).abs() < 1e-3);

        assert_eq!(readings.recv().await.unwrap().heart_rate, 71);

        cancel.cancel();
        task.await.unwrap().unwrap();

        let stats = shared.stats.snapshot();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(
            shared.handles.read().measurement,
            Some(AttributeHandle::new(0x000e))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_control_handle_fills_gap() {
        let gateway = MockGateway::new();
        gateway.push_session(
            SessionScript::connected()
                .descriptors(&[(0x000e, 0x2a37)])
                .notification(0x000e, &[0x00, 70]),
        );
        let config = MonitorConfig::new(ADDRESS).with_control_handle(AttributeHandle::new(0x0012));
        let (worker, shared, cancel) = worker(&gateway, config);
        let mut readings = shared.publisher.subscribe_readings();

        let task = tokio::spawn(worker.run());
        readings.recv().await.unwrap();
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(
            gateway.commands(0),
            vec!["connect", "char-desc", "char-write-req 0x0012 0100", "quit"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_link_ends_stream_with_link_lost() {
        let gateway = MockGateway::new();
        gateway.push_session(
            SessionScript::connected()
                .heart_rate_descriptors()
                .notification(0x000e, &[0x00, 70]),
        );
        let (worker, shared, _cancel) = worker(&gateway, MonitorConfig::new(ADDRESS));

        let mut session = GatewaySession::open(&gateway, ADDRESS, &Timeouts::default())
            .await
            .unwrap();
        let started = Instant::now();
        let result = worker.stream(&mut session).await;

        assert!(matches!(result, Err(Error::LinkLost)));
        assert!(started.elapsed() >= Timeouts::default().notification);
        assert_eq!(shared.stats.snapshot().published, 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_slow_connect_exchange() {
        let gateway = MockGateway::new();
        gateway.push_session(
            SessionScript::new()
                .wait(Duration::from_secs(29))
                .output(MOCK_PROMPT)
                .wait(Duration::from_secs(14))
                .output("Connection successful\n"),
        );
        let (worker, shared, cancel) = worker(&gateway, MonitorConfig::new(ADDRESS));

        let task = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let requested = Instant::now();
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert!(requested.elapsed() < Duration::from_secs(1));
        assert_eq!(gateway.commands(0), vec!["quit"]);
        assert_eq!(gateway.live_sessions(), 0);
        assert_eq!(shared.stats.snapshot().connections, 0);
        assert_eq!(shared.tracker.state(), ConnectionState::Disconnected);
    }
}
