//! Gateway communication module.
//!
//! The platform BLE stack is reached through an interactive `gatttool`
//! session. This module provides the transport abstraction over that
//! session and the protocol steps built on it: connecting, resolving
//! characteristic handles and enabling notifications.

pub mod mock;
pub mod process;
pub mod resolver;
pub mod session;
pub mod subscriber;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::{Pattern, Response};

pub use mock::{MockGateway, ScriptStep, SessionScript};
pub use process::{GatttoolConnector, GatttoolTransport};
pub use resolver::{DescriptorScan, HandleResolver, ResolvedHandles, ScanStep};
pub use session::GatewaySession;
pub use subscriber::enable_notifications;

/// Log target for the diagnostic echo of raw gateway I/O.
pub const ECHO_TARGET: &str = "hrm_relay::gateway::echo";

/// One live command/response session with the gateway.
///
/// Implementations know nothing about the protocol: they write lines and
/// wait for patterns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Send one command line.
    async fn send_line(&mut self, line: &str) -> Result<()>;

    /// Wait for the earliest of `patterns` to appear in the output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`](crate::Error::Timeout) if nothing matches
    /// within `timeout`, or [`Error::SessionClosed`](crate::Error::SessionClosed)
    /// if the gateway output ends first.
    async fn expect(&mut self, patterns: &[Pattern], timeout: Duration) -> Result<Response>;

    /// Wait for the gateway to exit and release it.
    async fn close(&mut self) -> Result<()>;
}

/// Spawns gateway sessions bound to a device address.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Start a new session for `address`.
    async fn spawn(&self, address: &str) -> Result<Box<dyn Transport>>;
}
