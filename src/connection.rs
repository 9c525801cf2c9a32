//! Connection state tracking.
//!
//! The acquisition worker walks through these states on every connect
//! cycle. Consumers can poll the current state or subscribe to changes.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Connection state of the acquisition worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No gateway session is open.
    #[default]
    Disconnected,
    /// Spawning the gateway and running the connect exchange.
    Connecting,
    /// Listing descriptors to find the measurement and control handles.
    Resolving,
    /// Notifications have been requested.
    Subscribed,
    /// Waiting for and decoding notifications.
    Streaming,
}

impl ConnectionState {
    /// Check if a link to the monitor is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Resolving | Self::Subscribed | Self::Streaming)
    }

    /// Check if notifications are being received.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Resolving | Self::Subscribed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Subscribed => write!(f, "Subscribed"),
            Self::Streaming => write!(f, "Streaming"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Address of the monitor.
    pub address: String,
    /// The state before the change.
    pub previous: ConnectionState,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Shared connection state with change notifications.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionTracker {
    address: String,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionTracker {
    pub(crate) fn new(address: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(32);
        Self {
            address: address.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Update the state, emitting an event only when it changes.
    pub(crate) fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = self.event_tx.send(ConnectionEvent {
                address: self.address.clone(),
                previous: old_state,
                state: new_state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Resolving.is_connected());
        assert!(ConnectionState::Streaming.is_connected());

        assert!(ConnectionState::Streaming.is_streaming());
        assert!(!ConnectionState::Subscribed.is_streaming());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Subscribed.is_transitioning());
        assert!(!ConnectionState::Streaming.is_transitioning());
        assert!(!ConnectionState::Disconnected.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Streaming), "Streaming");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    #[test]
    fn test_tracker_emits_only_on_change() {
        let tracker = ConnectionTracker::new("AA:BB:CC:DD:EE:FF");
        let mut events = tracker.subscribe();

        tracker.set_state(ConnectionState::Connecting);
        tracker.set_state(ConnectionState::Connecting);
        tracker.set_state(ConnectionState::Streaming);

        let first = events.try_recv().unwrap();
        assert_eq!(first.previous, ConnectionState::Disconnected);
        assert_eq!(first.state, ConnectionState::Connecting);
        assert_eq!(first.address, "AA:BB:CC:DD:EE:FF");

        let second = events.try_recv().unwrap();
        assert_eq!(second.previous, ConnectionState::Connecting);
        assert_eq!(second.state, ConnectionState::Streaming);

        assert!(events.try_recv().is_err());
        assert_eq!(tracker.state(), ConnectionState::Streaming);
    }
}
