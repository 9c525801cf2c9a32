//! Error types for the hrm-relay crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// No device address was configured.
    #[error("No device address configured")]
    MissingAddress,

    /// The gateway executable could not be located.
    #[error("Gateway executable not found: {path}")]
    GatewayNotFound {
        /// The path or program name that was searched for.
        path: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// The gateway did not bring the link up in time.
    #[error("Connection timeout while waiting for {stage}")]
    ConnectTimeout {
        /// Which step of the connect exchange timed out.
        stage: &'static str,
    },

    /// The characteristic listing never contained a heart rate measurement handle.
    #[error("Heart rate measurement handle not found")]
    ResolutionFailure,

    /// Invalid data was received from the monitor.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// No notification arrived within the streaming timeout.
    #[error("Connection lost")]
    LinkLost,

    /// A gateway response did not arrive in time.
    #[error("Gateway response timeout")]
    Timeout,

    /// The gateway process closed its output.
    #[error("Gateway session closed")]
    SessionClosed,

    /// I/O error talking to the gateway process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the acquisition worker handles this error locally and carries on.
    ///
    /// Configuration errors and a failed handle resolution are fatal for a
    /// worker instance; everything else leads to a retry or a dropped
    /// notification.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::MissingAddress
                | Self::GatewayNotFound { .. }
                | Self::InvalidParameter { .. }
                | Self::ResolutionFailure
                | Self::Internal(_)
        )
    }

    /// Whether this error belongs to the configuration class.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingAddress | Self::GatewayNotFound { .. } | Self::InvalidParameter { .. }
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(!Error::MissingAddress.is_recoverable());
        assert!(!Error::ResolutionFailure.is_recoverable());
        assert!(Error::ConnectTimeout { stage: "prompt" }.is_recoverable());
        assert!(Error::LinkLost.is_recoverable());
        assert!(Error::InvalidData {
            context: "short".to_string()
        }
        .is_recoverable());

        assert!(Error::GatewayNotFound {
            path: "gatttool".to_string()
        }
        .is_configuration());
        assert!(!Error::Timeout.is_configuration());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::ConnectTimeout { stage: "connect" }.to_string(),
            "Connection timeout while waiting for connect"
        );
        assert_eq!(Error::LinkLost.to_string(), "Connection lost");
    }
}
