//! Utility functions for the hrm-relay crate.

use crate::error::{Error, Result};

/// RR intervals are transmitted in units of 1/1024 second.
pub const RR_INTERVAL_RESOLUTION: f64 = 1024.0;

/// Convert a raw RR interval to seconds.
///
/// # Example
///
/// ```
/// use hrm_relay::rr_interval_to_seconds;
///
/// assert!((rr_interval_to_seconds(1024) - 1.0).abs() < 1e-9);
/// ```
#[inline]
pub fn rr_interval_to_seconds(rr: u16) -> f64 {
    f64::from(rr) / RR_INTERVAL_RESOLUTION
}

/// Instantaneous heart rate implied by one raw RR interval.
///
/// Returns `None` for a zero interval.
///
/// # Example
///
/// ```
/// use hrm_relay::bpm_from_rr_interval;
///
/// assert_eq!(bpm_from_rr_interval(1024), Some(60.0));
/// assert_eq!(bpm_from_rr_interval(0), None);
/// ```
#[inline]
pub fn bpm_from_rr_interval(rr: u16) -> Option<f64> {
    if rr == 0 {
        None
    } else {
        Some(60.0 / rr_interval_to_seconds(rr))
    }
}

/// Parse a gateway value dump such as `"10 41 00 04"` into bytes.
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    text.split_whitespace()
        .map(|token| {
            u8::from_str_radix(token, 16).map_err(|_| Error::InvalidData {
                context: format!("Invalid hex byte '{}' in value '{}'", token, text.trim()),
            })
        })
        .collect()
}

/// Render bytes in the gateway's write-request form, e.g. `[0x01, 0x00]` -> `"0100"`.
pub fn to_hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
