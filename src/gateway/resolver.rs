//! Characteristic handle resolution.
//!
//! Lists the characteristic descriptors over the gateway and picks out the
//! Heart Rate Measurement handle and the Client Characteristic
//! Configuration descriptor that follows it.

use std::time::Duration;
use tracing::{debug, trace};

use super::GatewaySession;
use crate::error::{Error, Result};
use crate::protocol::uuids::{CLIENT_CHARACTERISTIC_CONFIG_UUID, HEART_RATE_MEASUREMENT_UUID};
use crate::protocol::{AttributeHandle, Command, Descriptor, Pattern, Response};

/// Handles used to stream heart rate notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedHandles {
    /// Heart Rate Measurement value handle.
    pub measurement: Option<AttributeHandle>,
    /// CCC descriptor handle used to enable notifications.
    pub control: Option<AttributeHandle>,
}

impl ResolvedHandles {
    /// Check if the measurement handle is known.
    pub fn is_resolved(&self) -> bool {
        self.measurement.is_some()
    }
}

/// Whether a descriptor scan needs more input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Keep reading the listing.
    Continue,
    /// Both handles found; the rest of the listing is irrelevant.
    Complete,
}

/// Incremental scan over one descriptor listing.
///
/// A CCC descriptor only counts as the control handle if the measurement
/// characteristic was already seen in the same listing; descriptors belong
/// to the characteristic declared before them.
#[derive(Debug, Clone, Default)]
pub struct DescriptorScan {
    handles: ResolvedHandles,
    seen: usize,
}

impl DescriptorScan {
    /// Start an empty scan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next descriptor of the listing.
    pub fn observe(&mut self, descriptor: &Descriptor) -> ScanStep {
        self.seen += 1;

        if descriptor.uuid == CLIENT_CHARACTERISTIC_CONFIG_UUID && self.handles.measurement.is_some()
        {
            self.handles.control = Some(descriptor.handle);
            return ScanStep::Complete;
        }

        if descriptor.uuid == HEART_RATE_MEASUREMENT_UUID {
            self.handles.measurement = Some(descriptor.handle);
        }

        ScanStep::Continue
    }

    /// Number of descriptors observed.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Handles found so far.
    pub fn handles(&self) -> ResolvedHandles {
        self.handles
    }

    /// Finish the scan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResolutionFailure`] if no measurement handle was listed.
    pub fn finish(self) -> Result<ResolvedHandles> {
        if self.handles.measurement.is_none() {
            return Err(Error::ResolutionFailure);
        }
        Ok(self.handles)
    }
}

/// Resolves the measurement and control handles over a session.
#[derive(Debug, Clone, Copy)]
pub struct HandleResolver {
    /// Wait for each descriptor line; a timeout ends the listing.
    descriptor_timeout: Duration,
}

impl HandleResolver {
    /// Create a resolver with the given per-line timeout.
    pub fn new(descriptor_timeout: Duration) -> Self {
        Self { descriptor_timeout }
    }

    /// List descriptors and resolve the heart rate handles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResolutionFailure`] if the listing contains no
    /// measurement characteristic, or a transport error if the session
    /// fails mid-listing.
    pub async fn resolve(&self, session: &mut GatewaySession) -> Result<ResolvedHandles> {
        session.send(&Command::DescribeCharacteristics).await?;

        let mut scan = DescriptorScan::new();
        loop {
            match session
                .expect(&[Pattern::Descriptor], self.descriptor_timeout)
                .await
            {
                Ok(Response::Descriptor(descriptor)) => {
                    trace!(
                        "Descriptor {} uuid {}",
                        descriptor.handle,
                        descriptor.uuid
                    );
                    if scan.observe(&descriptor) == ScanStep::Complete {
                        break;
                    }
                }
                Ok(other) => trace!("Ignoring {:?} during descriptor listing", other),
                Err(Error::Timeout) => {
                    debug!("Descriptor listing ended after {} entries", scan.seen());
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let handles = scan.finish()?;
        debug!(
            "Resolved measurement handle {:?}, control handle {:?}",
            handles.measurement, handles.control
        );
        Ok(handles)
    }
}
