//! Protocol module for parsing and constructing gateway traffic.
//!
//! This module contains the implementations for:
//! - Heart Rate Measurement decoding
//! - Gateway command lines and response patterns
//! - Output buffering and pattern matching
//! - Heart rate GATT UUIDs

pub mod gatttool;
pub mod measurement;
pub mod output;
pub mod uuids;

pub use gatttool::{AttributeHandle, Command, Descriptor, Notification, Pattern, Response};
pub use measurement::{HeartRateMeasurement, SensorContact};
pub use output::OutputBuffer;
