//! Notification subscription.

use tracing::debug;

use super::GatewaySession;
use crate::error::Result;
use crate::protocol::{AttributeHandle, Command};

/// Enable heart rate notifications for the current connection.
///
/// Writes the "notifications on" value to the control handle. Without a
/// control handle the monitor is assumed to stream unconditionally and
/// nothing is sent.
///
/// Returns whether a subscription request was sent.
pub async fn enable_notifications(
    session: &mut GatewaySession,
    control: Option<AttributeHandle>,
) -> Result<bool> {
    let Some(handle) = control else {
        debug!("No control handle; assuming notifications are already enabled");
        return Ok(false);
    };

    session.send(&Command::enable_notifications(handle)).await?;
    debug!("Requested notifications through {}", handle);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::gateway::MockTransport;

    #[tokio::test]
    async fn test_writes_enable_value_to_control_handle() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_line()
            .withf(|line| line == "char-write-req 0x000f 0100")
            .times(1)
            .returning(|_| Ok(()));

        let mut session = GatewaySession::new(Box::new(transport), "AA:BB:CC:DD:EE:FF");
        let sent = enable_notifications(&mut session, Some(AttributeHandle::new(0x0f)))
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_without_control_handle_sends_nothing() {
        let mut transport = MockTransport::new();
        transport.expect_send_line().never();

        let mut session = GatewaySession::new(Box::new(transport), "AA:BB:CC:DD:EE:FF");
        let sent = enable_notifications(&mut session, None).await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_line()
            .returning(|_| Err(Error::SessionClosed));

        let mut session = GatewaySession::new(Box::new(transport), "AA:BB:CC:DD:EE:FF");
        let result = enable_notifications(&mut session, Some(AttributeHandle::new(0x0f))).await;
        assert!(matches!(result, Err(Error::SessionClosed)));
    }
}
