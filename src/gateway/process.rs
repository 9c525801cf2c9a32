//! `gatttool` subprocess transport.
//!
//! Spawns `gatttool -b <address> -t <type> --interactive` with piped
//! standard streams. Output from stdout and stderr is pumped into one
//! channel so waits stay cancel-safe under `tokio::time::timeout`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{GatewayConnector, Transport, ECHO_TARGET};
use crate::config::{AddressType, MonitorConfig, DEFAULT_GATEWAY_PROGRAM};
use crate::error::{Error, Result};
use crate::protocol::{OutputBuffer, Pattern, Response};

/// Output chunks buffered between the pump tasks and the transport.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;
/// Read size for the pump tasks.
const READ_CHUNK_SIZE: usize = 1024;

/// Locate the gateway executable.
///
/// An explicit path must exist. A bare program name (or none, meaning
/// `gatttool`) is searched for on `PATH`.
///
/// # Errors
///
/// Returns [`Error::GatewayNotFound`] if nothing usable is found.
pub fn resolve_gateway(explicit: Option<&Path>) -> Result<PathBuf> {
    let requested = explicit.unwrap_or_else(|| Path::new(DEFAULT_GATEWAY_PROGRAM));

    let is_bare_name = requested.components().count() == 1 && !requested.is_absolute();
    if is_bare_name {
        if let Some(found) = find_on_path(requested) {
            return Ok(found);
        }
    } else if requested.is_file() {
        return Ok(requested.to_path_buf());
    }

    Err(Error::GatewayNotFound {
        path: requested.display().to_string(),
    })
}

fn find_on_path(program: &Path) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Spawns real `gatttool` sessions.
#[derive(Debug, Clone)]
pub struct GatttoolConnector {
    /// Resolved gateway executable.
    program: PathBuf,
    /// Address type passed with `-t`.
    address_type: AddressType,
    /// Whether to mirror raw I/O to the log.
    echo: bool,
    /// How long to wait for the process to exit on close.
    quit_timeout: Duration,
}

impl GatttoolConnector {
    /// Create a connector for an already located executable.
    pub fn new(program: PathBuf, address_type: AddressType) -> Self {
        Self {
            program,
            address_type,
            echo: false,
            quit_timeout: Duration::from_secs(5),
        }
    }

    /// Build a connector from a monitor configuration, locating the executable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GatewayNotFound`] if the executable cannot be found.
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let program = resolve_gateway(config.gateway_path.as_deref())?;
        let connector = Self::new(program, config.address_type)
            .with_echo(config.echo_gateway_io)
            .with_quit_timeout(config.timeouts.quit);

        debug!("Using gateway executable {}", connector.program().display());
        Ok(connector)
    }

    /// Mirror raw I/O to the log.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// How long to wait for the gateway to exit before killing it.
    pub fn with_quit_timeout(mut self, quit_timeout: Duration) -> Self {
        self.quit_timeout = quit_timeout;
        self
    }

    /// The gateway executable.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl GatewayConnector for GatttoolConnector {
    async fn spawn(&self, address: &str) -> Result<Box<dyn Transport>> {
        debug!(
            "Spawning {} -b {} -t {} --interactive",
            self.program.display(),
            address,
            self.address_type
        );

        let mut child = Command::new(&self.program)
            .arg("-b")
            .arg(address)
            .arg("-t")
            .arg(self.address_type.as_arg())
            .arg("--interactive")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("gateway stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("gateway stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("gateway stderr not captured".to_string()))?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let pumps = vec![
            tokio::spawn(pump_output(stdout, output_tx.clone())),
            tokio::spawn(pump_output(stderr, output_tx)),
        ];

        Ok(Box::new(GatttoolTransport {
            child,
            stdin: Some(stdin),
            output: output_rx,
            buffer: OutputBuffer::new(),
            pumps,
            echo: self.echo,
            quit_timeout: self.quit_timeout,
        }))
    }
}

/// Forward everything read from `reader` as text chunks until EOF.
///
/// A multi-byte character split across reads is held back until the rest
/// of it arrives.
async fn pump_output<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<String>) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut pending = Vec::new();
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                let text = take_complete_text(&mut pending);
                if !text.is_empty() && tx.send(text).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                trace!("Gateway output read failed: {}", e);
                break;
            }
        }
    }

    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned()).await;
    }
}

/// Decode the longest prefix of `pending` that cannot change with more input.
///
/// Invalid sequences become U+FFFD. An incomplete sequence at the end stays
/// in `pending`.
fn take_complete_text(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut consumed = 0;

    loop {
        match std::str::from_utf8(&pending[consumed..]) {
            Ok(valid) => {
                text.push_str(valid);
                consumed = pending.len();
                break;
            }
            Err(e) => {
                let valid_up_to = consumed + e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&pending[consumed..valid_up_to]));
                match e.error_len() {
                    Some(invalid) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        consumed = valid_up_to + invalid;
                    }
                    None => {
                        consumed = valid_up_to;
                        break;
                    }
                }
            }
        }
    }

    pending.drain(..consumed);
    text
}

/// A live `gatttool` subprocess.
pub struct GatttoolTransport {
    /// The gateway process.
    child: Child,
    /// Command input; `None` once closed.
    stdin: Option<ChildStdin>,
    /// Merged stdout/stderr chunks.
    output: mpsc::Receiver<String>,
    /// Unconsumed output.
    buffer: OutputBuffer,
    /// Output pump tasks.
    pumps: Vec<JoinHandle<()>>,
    /// Whether to mirror raw I/O to the log.
    echo: bool,
    /// How long to wait for the process to exit on close.
    quit_timeout: Duration,
}

#[async_trait]
impl Transport for GatttoolTransport {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::SessionClosed)?;

        if self.echo {
            info!(target: ECHO_TARGET, ">> {}", line);
        }

        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn expect(&mut self, patterns: &[Pattern], timeout: Duration) -> Result<Response> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(response) = self.buffer.take_match(patterns) {
                return Ok(response);
            }

            match tokio::time::timeout_at(deadline, self.output.recv()).await {
                Err(_) => return Err(Error::Timeout),
                Ok(None) => return Err(Error::SessionClosed),
                Ok(Some(chunk)) => {
                    if self.echo {
                        info!(target: ECHO_TARGET, "<< {}", chunk.trim_end());
                    }
                    self.buffer.push(&chunk);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping stdin delivers EOF, which also ends the session.
        self.stdin.take();

        match tokio::time::timeout(self.quit_timeout, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Gateway exited: {}", status),
            Ok(Err(e)) => debug!("Waiting for gateway exit failed: {}", e),
            Err(_) => {
                warn!("Gateway did not exit within {:?}; killing it", self.quit_timeout);
                if let Err(e) = self.child.start_kill() {
                    debug!("Killing gateway failed: {}", e);
                }
                let _ = self.child.wait().await;
            }
        }

        for pump in self.pumps.drain(..) {
            pump.abort();
        }

        Ok(())
    }
}

impl Drop for GatttoolTransport {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}
