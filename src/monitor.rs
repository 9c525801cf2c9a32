//! Heart rate monitor handle.
//!
//! [`HeartRateMonitor`] is the public entry point: it validates the
//! configuration, runs the acquisition worker as a background task and
//! exposes the latest heart rate, full readings, connection state and
//! diagnostics.

use futures::stream::BoxStream;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::channel::{readings_stream, HeartRatePublisher, HeartRateReceiver};
use crate::config::MonitorConfig;
use crate::connection::{ConnectionEvent, ConnectionState, ConnectionTracker};
use crate::data::{HeartRateReading, MonitorStats, StatsCounters};
use crate::error::{Error, Result};
use crate::gateway::{GatewayConnector, GatttoolConnector, ResolvedHandles};
use crate::worker::{Worker, WorkerShared};

/// Acquires heart rate data from one BLE heart rate monitor.
pub struct HeartRateMonitor {
    /// Construction-time configuration.
    config: MonitorConfig,
    /// Validated device address.
    address: String,
    /// Spawns gateway sessions.
    connector: Arc<dyn GatewayConnector>,
    /// State shared with the worker task.
    shared: WorkerShared,
    /// Cancellation for the current worker.
    cancel: Mutex<CancellationToken>,
    /// Background worker handle.
    worker_handle: RwLock<Option<JoinHandle<Result<()>>>>,
}

impl HeartRateMonitor {
    /// Create a monitor that talks to the `gatttool` gateway.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAddress`] if no device address is configured
    /// and [`Error::GatewayNotFound`] if the gateway executable cannot be
    /// located. Neither is retried.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let connector = GatttoolConnector::from_config(&config)?;
        Self::with_connector(config, Arc::new(connector))
    }

    /// Create a monitor with a custom gateway connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAddress`] if no device address is configured.
    pub fn with_connector(
        config: MonitorConfig,
        connector: Arc<dyn GatewayConnector>,
    ) -> Result<Self> {
        let address = config.validate()?.to_string();

        let shared = WorkerShared {
            tracker: ConnectionTracker::new(address.clone()),
            publisher: HeartRatePublisher::new(),
            stats: Arc::new(StatsCounters::default()),
            handles: Arc::new(RwLock::new(configured_handles(&config))),
        };

        Ok(Self {
            config,
            address,
            connector,
            shared,
            cancel: Mutex::new(CancellationToken::new()),
            worker_handle: RwLock::new(None),
        })
    }

    /// Start the acquisition worker.
    ///
    /// Must be called from within a tokio runtime. Starting a monitor that
    /// is already running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if there is no tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.is_running() {
            debug!("Monitor for {} already running", self.address);
            return Ok(());
        }

        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("No tokio runtime: {}", e)))?;

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        *self.shared.handles.write() = configured_handles(&self.config);

        let worker = Worker::new(
            self.address.clone(),
            self.config.clone(),
            self.connector.clone(),
            self.shared.clone(),
            cancel,
        );

        info!("Starting heart rate monitor for {}", self.address);
        let span = info_span!("hrm", address = %self.address);
        let handle = runtime.spawn(worker.run().instrument(span));
        *self.worker_handle.write() = Some(handle);

        Ok(())
    }

    /// Request shutdown and wait for the worker to stop.
    ///
    /// The worker notices the request at its next checkpoint, so this can
    /// take up to the longest gateway timeout in flight. The active gateway
    /// session is always torn down.
    ///
    /// # Errors
    ///
    /// Returns the error the worker terminated with, if it stopped on its
    /// own because of a fatal error.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down heart rate monitor for {}", self.address);
        self.cancel.lock().cancel();
        self.join().await
    }

    /// Wait for the worker to stop on its own.
    ///
    /// The worker only stops by itself on a fatal error, such as a failed
    /// handle resolution.
    pub async fn wait(&self) -> Result<()> {
        self.join().await
    }

    async fn join(&self) -> Result<()> {
        let handle = self.worker_handle.write().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Internal(format!("Worker task failed: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Check if the worker is running.
    pub fn is_running(&self) -> bool {
        self.worker_handle
            .read()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// The device address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The configuration the monitor was created with.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.tracker.state()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.tracker.subscribe()
    }

    /// Create a non-blocking receiver for the latest heart rate.
    pub fn receiver(&self) -> HeartRateReceiver {
        self.shared.publisher.receiver()
    }

    /// Subscribe to every decoded reading.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<HeartRateReading> {
        self.shared.publisher.subscribe_readings()
    }

    /// Every decoded reading, as a stream.
    pub fn readings(&self) -> BoxStream<'static, HeartRateReading> {
        readings_stream(self.subscribe_readings())
    }

    /// The most recently published heart rate.
    pub fn latest_heart_rate(&self) -> Option<u16> {
        self.shared.publisher.latest()
    }

    /// Snapshot of acquisition diagnostics.
    pub fn stats(&self) -> MonitorStats {
        self.shared.stats.snapshot()
    }

    /// Handles currently used for streaming.
    pub fn resolved_handles(&self) -> ResolvedHandles {
        *self.shared.handles.read()
    }
}

impl Drop for HeartRateMonitor {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
    }
}

fn configured_handles(config: &MonitorConfig) -> ResolvedHandles {
    ResolvedHandles {
        measurement: config.measurement_handle,
        control: config.control_handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;

    #[test]
    fn test_missing_address_is_rejected() {
        let result = HeartRateMonitor::with_connector(
            MonitorConfig::default(),
            Arc::new(MockGateway::new()),
        );
        assert!(matches!(result, Err(Error::MissingAddress)));
    }

    #[test]
    fn test_start_requires_runtime() {
        let monitor = HeartRateMonitor::with_connector(
            MonitorConfig::new("AA:BB:CC:DD:EE:FF"),
            Arc::new(MockGateway::new()),
        )
        .unwrap();

        assert!(matches!(monitor.start(), Err(Error::Internal(_))));
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_without_start() {
        let monitor = HeartRateMonitor::with_connector(
            MonitorConfig::new("AA:BB:CC:DD:EE:FF"),
            Arc::new(MockGateway::new()),
        )
        .unwrap();

        monitor.shutdown().await.unwrap();
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
        assert_eq!(monitor.latest_heart_rate(), None);
    }
}
