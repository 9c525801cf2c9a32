//! Scripted gateway for testing.
//!
//! [`MockGateway`] hands out in-memory sessions that replay a
//! [`SessionScript`]: chunks of gateway output, pauses and process exits.
//! Output is matched with the same [`OutputBuffer`] the real transport
//! uses, and every command line sent is recorded, which makes it possible
//! to drive the whole acquisition worker deterministically (ideally under a
//! paused tokio clock).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::{GatewayConnector, Transport};
use crate::error::{Error, Result};
use crate::protocol::{OutputBuffer, Pattern, Response};

/// Prompt printed by the scripted gateway.
pub const MOCK_PROMPT: &str = "[AA:BB:CC:DD:EE:FF][LE]> ";

/// One step of a scripted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// The gateway prints this text.
    Output(String),
    /// The gateway stays silent for this long.
    Wait(Duration),
    /// The gateway process exits.
    Exit,
}

/// The output one scripted session will produce.
///
/// Once the script is exhausted the session stays silent forever, so every
/// further wait times out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionScript {
    steps: VecDeque<ScriptStep>,
}

impl SessionScript {
    /// An empty script: the gateway never prints anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that connects with an explicit acknowledgment.
    pub fn connected() -> Self {
        Self::new()
            .output(MOCK_PROMPT)
            .output("Attempting to connect to AA:BB:CC:DD:EE:FF\nConnection successful\n")
            .output(MOCK_PROMPT)
    }

    /// A session that connects and only reports the `[CON]` link indicator.
    pub fn connected_via_link_indicator() -> Self {
        Self::new()
            .output(MOCK_PROMPT)
            .output("[CON][AA:BB:CC:DD:EE:FF][LE]> ")
    }

    /// Append printed text.
    pub fn output(mut self, text: impl Into<String>) -> Self {
        self.steps.push_back(ScriptStep::Output(text.into()));
        self
    }

    /// Append a silent pause.
    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push_back(ScriptStep::Wait(duration));
        self
    }

    /// Append a process exit.
    pub fn exit(mut self) -> Self {
        self.steps.push_back(ScriptStep::Exit);
        self
    }

    /// Append a descriptor listing of `(handle, uuid class)` entries.
    pub fn descriptors(self, entries: &[(u16, u32)]) -> Self {
        let listing: String = entries
            .iter()
            .map(|(handle, class)| {
                format!(
                    "handle: 0x{:04x}, uuid: {:08x}-0000-1000-8000-00805f9b34fb\n",
                    handle, class
                )
            })
            .collect();
        self.output(listing)
    }

    /// Append the listing of a typical heart rate strap: measurement at
    /// `0x000e`, its CCC descriptor at `0x000f`, body sensor location after.
    pub fn heart_rate_descriptors(self) -> Self {
        self.descriptors(&[
            (0x0001, 0x2800),
            (0x0002, 0x2803),
            (0x0003, 0x2a00),
            (0x000c, 0x2800),
            (0x000d, 0x2803),
            (0x000e, 0x2a37),
            (0x000f, 0x2902),
            (0x0010, 0x2803),
            (0x0011, 0x2a38),
        ])
    }

    /// Append a notification line.
    pub fn notification(self, handle: u16, payload: &[u8]) -> Self {
        let value: String = payload.iter().map(|b| format!("{:02x} ", b)).collect();
        self.output(format!(
            "Notification handle = 0x{:04x} value: {}\n",
            handle, value
        ))
    }

    /// Number of remaining steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the script has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Default)]
struct MockState {
    /// Scripts for upcoming sessions, in spawn order.
    scripts: VecDeque<SessionScript>,
    /// Script used once `scripts` runs out.
    fallback: SessionScript,
    /// Sessions spawned so far.
    spawned: usize,
    /// Sessions currently alive.
    live: usize,
    /// Highest number of simultaneously alive sessions.
    max_live: usize,
    /// Command lines received, per session.
    commands: Vec<Vec<String>>,
    /// Address each session was spawned for.
    addresses: Vec<String>,
}

/// A [`GatewayConnector`] that spawns scripted sessions.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    /// Create a gateway whose sessions never print anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next spawned session.
    pub fn push_session(&self, script: SessionScript) {
        self.state.lock().scripts.push_back(script);
    }

    /// Script used for every session after the queued ones.
    pub fn set_fallback(&self, script: SessionScript) {
        self.state.lock().fallback = script;
    }

    /// Number of sessions spawned.
    pub fn spawn_count(&self) -> usize {
        self.state.lock().spawned
    }

    /// Number of sessions currently alive.
    pub fn live_sessions(&self) -> usize {
        self.state.lock().live
    }

    /// Highest number of sessions that were alive at the same time.
    pub fn max_live_sessions(&self) -> usize {
        self.state.lock().max_live
    }

    /// Command lines received by the session with the given spawn index.
    pub fn commands(&self, session: usize) -> Vec<String> {
        self.state
            .lock()
            .commands
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    /// Command lines received by every session, in spawn order.
    pub fn all_commands(&self) -> Vec<Vec<String>> {
        self.state.lock().commands.clone()
    }

    /// Addresses sessions were spawned for.
    pub fn addresses(&self) -> Vec<String> {
        self.state.lock().addresses.clone()
    }
}

#[async_trait]
impl GatewayConnector for MockGateway {
    async fn spawn(&self, address: &str) -> Result<Box<dyn Transport>> {
        let mut state = self.state.lock();

        let script = match state.scripts.pop_front() {
            Some(script) => script,
            None => state.fallback.clone(),
        };
        let index = state.spawned;
        state.spawned += 1;
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        state.commands.push(Vec::new());
        state.addresses.push(address.to_string());

        Ok(Box::new(ScriptedTransport {
            index,
            steps: script.steps,
            buffer: OutputBuffer::new(),
            exited: false,
            closed: false,
            state: self.state.clone(),
        }))
    }
}

/// In-memory session replaying a script.
struct ScriptedTransport {
    /// Spawn index of this session.
    index: usize,
    /// Remaining script.
    steps: VecDeque<ScriptStep>,
    /// Printed but unconsumed output.
    buffer: OutputBuffer,
    /// Whether the scripted process has exited.
    exited: bool,
    /// Whether the session has been released.
    closed: bool,
    /// Shared gateway bookkeeping.
    state: Arc<Mutex<MockState>>,
}

impl ScriptedTransport {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().live -= 1;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        if self.closed || self.exited {
            return Err(Error::SessionClosed);
        }
        self.state.lock().commands[self.index].push(line.to_string());
        Ok(())
    }

    async fn expect(&mut self, patterns: &[Pattern], timeout: Duration) -> Result<Response> {
        if self.closed {
            return Err(Error::SessionClosed);
        }

        let mut remaining = timeout;
        loop {
            if let Some(response) = self.buffer.take_match(patterns) {
                return Ok(response);
            }
            if self.exited {
                return Err(Error::SessionClosed);
            }

            match self.steps.pop_front() {
                Some(ScriptStep::Output(text)) => self.buffer.push(&text),
                Some(ScriptStep::Wait(pause)) => {
                    if pause <= remaining {
                        tokio::time::sleep(pause).await;
                        remaining -= pause;
                    } else {
                        tokio::time::sleep(remaining).await;
                        self.steps.push_front(ScriptStep::Wait(pause - remaining));
                        return Err(Error::Timeout);
                    }
                }
                Some(ScriptStep::Exit) => self.exited = true,
                None => {
                    tokio::time::sleep(remaining).await;
                    return Err(Error::Timeout);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AttributeHandle;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_output_is_matched() {
        let gateway = MockGateway::new();
        gateway.push_session(SessionScript::new().output(MOCK_PROMPT));

        let mut transport = gateway.spawn("AA:BB:CC:DD:EE:FF").await.unwrap();
        let response = transport
            .expect(&[Pattern::Prompt], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response, Response::Prompt);
        assert_eq!(gateway.addresses(), vec!["AA:BB:CC:DD:EE:FF"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_script_times_out() {
        let gateway = MockGateway::new();
        let mut transport = gateway.spawn("AA").await.unwrap();

        let started = tokio::time::Instant::now();
        let result = transport
            .expect(&[Pattern::Prompt], Duration::from_secs(10))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_longer_than_timeout_carries_over() {
        let gateway = MockGateway::new();
        gateway.push_session(
            SessionScript::new()
                .wait(Duration::from_secs(15))
                .notification(0x000e, &[0x00, 0x48]),
        );
        let mut transport = gateway.spawn("AA").await.unwrap();
        let pattern = [Pattern::Notification(AttributeHandle::new(0x0e))];

        let first = transport.expect(&pattern, Duration::from_secs(10)).await;
        assert!(matches!(first, Err(Error::Timeout)));

        let second = transport.expect(&pattern, Duration::from_secs(10)).await;
        assert!(matches!(second, Ok(Response::Notification(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_closes_session() {
        let gateway = MockGateway::new();
        gateway.push_session(SessionScript::new().exit());
        let mut transport = gateway.spawn("AA").await.unwrap();

        let result = transport
            .expect(&[Pattern::Prompt], Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(Error::SessionClosed)));
        assert!(transport.send_line("quit").await.is_err());
    }

    #[tokio::test]
    async fn test_live_session_tracking() {
        let gateway = MockGateway::new();
        let mut first = gateway.spawn("AA").await.unwrap();
        let second = gateway.spawn("AA").await.unwrap();
        assert_eq!(gateway.live_sessions(), 2);
        assert_eq!(gateway.max_live_sessions(), 2);

        first.close().await.unwrap();
        drop(second);
        assert_eq!(gateway.live_sessions(), 0);
        assert_eq!(gateway.spawn_count(), 2);
    }

    #[tokio::test]
    async fn test_commands_recorded_per_session() {
        let gateway = MockGateway::new();
        let mut first = gateway.spawn("AA").await.unwrap();
        let mut second = gateway.spawn("AA").await.unwrap();
        first.send_line("connect").await.unwrap();
        second.send_line("char-desc").await.unwrap();

        assert_eq!(gateway.commands(0), vec!["connect"]);
        assert_eq!(gateway.commands(1), vec!["char-desc"]);
        assert!(gateway.commands(5).is_empty());
        assert_eq!(gateway.all_commands().len(), 2);
    }

    #[test]
    fn test_script_builders() {
        let script = SessionScript::connected()
            .heart_rate_descriptors()
            .notification(0x000e, &[0x10, 0x41, 0x00, 0x04]);
        assert_eq!(script.len(), 5);
        assert!(SessionScript::new().is_empty());
    }
}
