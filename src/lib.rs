// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # hrm-relay
//!
//! Live heart rate acquisition from Bluetooth Low Energy heart rate
//! monitors, relayed to any number of local consumers.
//!
//! The monitor is reached through an interactive `gatttool` session (the
//! BlueZ GATT client). A background worker connects, finds the Heart Rate
//! Measurement characteristic, enables notifications and decodes every
//! notification it receives. When the radio link drops, the worker tears
//! the session down and reconnects, reusing the handles it already found.
//!
//! ## Features
//!
//! - **Measurement decoding**: Full Heart Rate Measurement payload, including
//!   sensor contact, energy expended and RR intervals
//! - **Unattended reconnects**: Retries indefinitely after a lost link
//! - **Non-blocking delivery**: Poll the latest heart rate once per frame
//!   without ever waiting on the radio
//! - **Readings stream**: Every decoded notification with its timestamp
//! - **Diagnostics**: Connection state events, counters and a smoothed
//!   notification period
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hrm_relay::{HeartRateMonitor, MonitorConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let monitor = HeartRateMonitor::new(MonitorConfig::new("C8:2B:4F:11:22:33"))?;
//!     monitor.start()?;
//!
//!     let mut heart_rate = monitor.receiver();
//!     for _ in 0..60 {
//!         if let Some(bpm) = heart_rate.current() {
//!             println!("Heart rate: {} bpm", bpm);
//!         }
//!         tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     }
//!
//!     monitor.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! Requires BlueZ with the `gatttool` utility, either on `PATH` or given
//! with [`MonitorConfig::with_gateway_path`]. The user may need to be in the
//! `bluetooth` group.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data and configuration types

// Public modules
pub mod channel;
pub mod config;
pub mod connection;
pub mod data;
pub mod error;
pub mod gateway;
pub mod monitor;
pub mod protocol;
pub mod utils;

mod worker;

// Re-exports for convenience
pub use config::{AddressType, MonitorConfig, Timeouts, DEFAULT_GATEWAY_PROGRAM};
pub use error::{Error, Result};
pub use monitor::HeartRateMonitor;
pub use utils::{bpm_from_rr_interval, rr_interval_to_seconds};

// Re-export commonly used types from submodules
pub use channel::{HeartRatePublisher, HeartRateReceiver};
pub use connection::{ConnectionEvent, ConnectionState};
pub use data::{HeartRateReading, MonitorStats, PeriodEstimate};
pub use gateway::{GatewayConnector, MockGateway, ResolvedHandles, SessionScript, Transport};
pub use protocol::{AttributeHandle, HeartRateMeasurement, SensorContact};
