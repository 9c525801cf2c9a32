//! Monitor configuration.
//!
//! All options are fixed at construction time and handed to
//! [`HeartRateMonitor::new`](crate::HeartRateMonitor::new).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::AttributeHandle;

/// Default gateway program, looked up on `PATH`.
pub const DEFAULT_GATEWAY_PROGRAM: &str = "gatttool";

/// Bluetooth LE address type of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AddressType {
    /// Random (private or static) address. Most heart rate straps use this.
    #[default]
    Random,
    /// Public IEEE address.
    Public,
}

impl AddressType {
    /// The value passed to the gateway's `-t` option.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Public => "public",
        }
    }
}

impl FromStr for AddressType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "public" => Ok(Self::Public),
            _ => Err(Error::InvalidParameter {
                name: "address_type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Timeouts for every wait on the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timeouts {
    /// Wait for the first prompt after spawning the gateway.
    pub ready: Duration,
    /// Wait for the connect acknowledgment or link indicator.
    pub connect: Duration,
    /// Wait for the prompt to return after an explicit acknowledgment.
    pub prompt: Duration,
    /// Wait for each line of the descriptor listing.
    pub descriptor: Duration,
    /// Wait for each notification while streaming.
    pub notification: Duration,
    /// Wait for the gateway to exit after `quit`.
    pub quit: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ready: Duration::from_secs(30),
            connect: Duration::from_secs(15),
            prompt: Duration::from_secs(30),
            descriptor: Duration::from_secs(10),
            notification: Duration::from_secs(10),
            quit: Duration::from_secs(5),
        }
    }
}

impl Timeouts {
    /// The longest single wait, which bounds shutdown latency.
    pub fn longest(&self) -> Duration {
        [
            self.ready,
            self.connect,
            self.prompt,
            self.descriptor,
            self.notification,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

/// Construction-time configuration for a [`HeartRateMonitor`](crate::HeartRateMonitor).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MonitorConfig {
    /// Device address of the heart rate monitor. Required.
    pub address: Option<String>,

    /// Gateway executable. Defaults to `gatttool` found on `PATH`.
    pub gateway_path: Option<PathBuf>,

    /// Address type passed to the gateway.
    pub address_type: AddressType,

    /// Known measurement handle; skips handle resolution.
    pub measurement_handle: Option<AttributeHandle>,

    /// Known notification control (CCC descriptor) handle.
    pub control_handle: Option<AttributeHandle>,

    /// Mirror raw gateway I/O to the log.
    pub echo_gateway_io: bool,

    /// Gateway wait timeouts.
    pub timeouts: Timeouts,

    /// Fixed pause before reconnecting after a failed attempt or a lost link.
    pub reconnect_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            address: None,
            gateway_path: None,
            address_type: AddressType::default(),
            measurement_handle: None,
            control_handle: None,
            echo_gateway_io: false,
            timeouts: Timeouts::default(),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl MonitorConfig {
    /// Create a configuration for the given device address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    /// Use a specific gateway executable.
    pub fn with_gateway_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.gateway_path = Some(path.into());
        self
    }

    /// Set the device address type.
    pub fn with_address_type(mut self, address_type: AddressType) -> Self {
        self.address_type = address_type;
        self
    }

    /// Use a known measurement handle instead of resolving it.
    pub fn with_measurement_handle(mut self, handle: AttributeHandle) -> Self {
        self.measurement_handle = Some(handle);
        self
    }

    /// Use a known notification control handle.
    pub fn with_control_handle(mut self, handle: AttributeHandle) -> Self {
        self.control_handle = Some(handle);
        self
    }

    /// Mirror raw gateway I/O to the log.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_gateway_io = echo;
        self
    }

    /// Override the gateway timeouts.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the pause between reconnect attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Check the configuration and return the device address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAddress`] if no address is set.
    pub fn validate(&self) -> Result<&str> {
        match self.address.as_deref().map(str::trim) {
            Some(address) if !address.is_empty() => Ok(address),
            _ => Err(Error::MissingAddress),
        }
    }
}
