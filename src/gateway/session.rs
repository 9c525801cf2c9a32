//! Gateway session lifecycle.
//!
//! Wraps one [`Transport`] and implements the connect exchange:
//!
//! 1. Wait for the ready prompt.
//! 2. Send `connect`.
//! 3. Wait for either `Connection successful` or the `[CON]` link
//!    indicator. Gateway versions report one or the other.
//! 4. After an explicit acknowledgment, wait for the prompt to return;
//!    link bring-up can lag the acknowledgment.

use std::time::Duration;
use tracing::{debug, trace};

use super::{GatewayConnector, Transport};
use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::protocol::{Command, Pattern, Response};

/// A connected gateway session.
///
/// At most one of these is alive per acquisition worker. It must be
/// closed with [`GatewaySession::close`] before a new one is opened.
pub struct GatewaySession {
    /// The underlying transport.
    transport: Box<dyn Transport>,
    /// Device address this session is bound to.
    address: String,
    /// Whether the session has been torn down.
    closed: bool,
}

impl GatewaySession {
    /// Wrap an already spawned transport.
    pub fn new(transport: Box<dyn Transport>, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            closed: false,
        }
    }

    /// Spawn a gateway for `address` and bring the link up.
    ///
    /// On failure the spawned gateway is torn down before returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectTimeout`] if any step of the exchange times
    /// out, or the underlying spawn/transport error.
    pub async fn open(
        connector: &dyn GatewayConnector,
        address: &str,
        timeouts: &Timeouts,
    ) -> Result<Self> {
        let mut session = Self::spawn(connector, address).await?;

        match session.handshake(timeouts).await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    /// Spawn a gateway for `address` without bringing the link up.
    pub async fn spawn(connector: &dyn GatewayConnector, address: &str) -> Result<Self> {
        let transport = connector.spawn(address).await?;
        Ok(Self::new(transport, address))
    }

    /// Run the connect exchange on a freshly spawned session.
    ///
    /// The future may be dropped between waits; the session must then be
    /// closed by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectTimeout`] naming the step that timed out.
    pub async fn handshake(&mut self, timeouts: &Timeouts) -> Result<()> {
        self.expect(&[Pattern::Prompt], timeouts.ready)
            .await
            .map_err(|e| connect_stage(e, "ready prompt"))?;

        self.send(&Command::Connect).await?;

        let ack = self
            .expect(
                &[Pattern::ConnectionSuccessful, Pattern::LinkConnected],
                timeouts.connect,
            )
            .await
            .map_err(|e| connect_stage(e, "connection acknowledgment"))?;

        if ack == Response::ConnectionSuccessful {
            debug!("Connection acknowledged, waiting for prompt");
            self.expect(&[Pattern::Prompt], timeouts.prompt)
                .await
                .map_err(|e| connect_stage(e, "session prompt"))?;
        } else {
            debug!("Link indicator seen");
        }

        Ok(())
    }

    /// Device address this session is bound to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check if the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send a command.
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        trace!("Sending '{}'", command);
        self.transport.send_line(&command.to_line()).await
    }

    /// Wait for the earliest of `patterns`.
    pub async fn expect(&mut self, patterns: &[Pattern], timeout: Duration) -> Result<Response> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        self.transport.expect(patterns, timeout).await
    }

    /// Tear the session down: send `quit` and wait for the gateway to exit.
    ///
    /// Errors are logged and ignored. Calling this more than once is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }

        if let Err(e) = self.send(&Command::Quit).await {
            debug!("Sending quit failed: {}", e);
        }
        if let Err(e) = self.transport.close().await {
            debug!("Closing gateway failed: {}", e);
        }

        self.closed = true;
        debug!("Gateway session for {} closed", self.address);
    }
}

fn connect_stage(error: Error, stage: &'static str) -> Error {
    match error {
        Error::Timeout => Error::ConnectTimeout { stage },
        other => other,
    }
}
