//! Heart Rate Measurement characteristic parsing.
//!
//! Decodes the payload of the standard Heart Rate Measurement
//! characteristic (0x2A37) as delivered in gateway notifications.

use bytes::Buf;

use crate::error::{Error, Result};
use crate::utils::rr_interval_to_seconds;

/// Sensor contact status reported in the flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorContact {
    /// The sensor does not report contact status.
    #[default]
    Unsupported,
    /// Contact is supported but not currently detected.
    NotDetected,
    /// Skin contact is detected.
    Detected,
}

impl SensorContact {
    /// Extract the contact status from bits 1-2 of a flags byte.
    pub fn from_flags(flags: u8) -> Self {
        match (flags >> 1) & 0x03 {
            2 => Self::NotDetected,
            3 => Self::Detected,
            _ => Self::Unsupported,
        }
    }

    /// Check if the sensor reports contact status at all.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Check if skin contact is detected.
    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected)
    }
}

impl std::fmt::Display for SensorContact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => write!(f, "Sensor contact not supported"),
            Self::NotDetected => write!(f, "No contact detected"),
            Self::Detected => write!(f, "Contact detected"),
        }
    }
}

/// A decoded heart rate measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartRateMeasurement {
    /// Heart rate in beats per minute.
    pub heart_rate: u16,

    /// Whether the heart rate was sent as a 16-bit value.
    pub hr_is_wide: bool,

    /// Sensor contact status.
    pub sensor_contact: SensorContact,

    /// Energy expended in kilojoules, if present.
    pub energy_expended: Option<u16>,

    /// RR intervals in units of 1/1024 second, if present.
    ///
    /// `Some(vec![])` means the RR flag was set but no intervals followed.
    pub rr_intervals: Option<Vec<u16>>,
}

impl HeartRateMeasurement {
    /// Flags bit 0: heart rate value is 16 bits wide.
    pub const FLAG_HR_WIDE: u8 = 0x01;
    /// Flags bit 3: energy expended field present.
    pub const FLAG_ENERGY_EXPENDED: u8 = 0x08;
    /// Flags bit 4: RR intervals present.
    pub const FLAG_RR_INTERVALS: u8 = 0x10;

    /// Parse a measurement from a notification payload.
    ///
    /// The layout is fixed by the flags byte:
    /// - Byte 0: flags
    /// - Heart rate: 1 byte, or 2 bytes little-endian when bit 0 is set
    /// - Energy expended: 2 bytes little-endian when bit 3 is set
    /// - RR intervals: remaining bytes as little-endian u16 pairs when bit 4 is set
    ///
    /// A heart rate is returned whether or not RR intervals are present.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = data;

        if !buf.has_remaining() {
            return Err(Error::InvalidData {
                context: "Empty heart rate measurement".to_string(),
            });
        }

        let flags = buf.get_u8();
        let hr_is_wide = flags & Self::FLAG_HR_WIDE != 0;
        let sensor_contact = SensorContact::from_flags(flags);

        let heart_rate = if hr_is_wide {
            ensure_remaining(buf.remaining(), 2, "16-bit heart rate", data)?;
            buf.get_u16_le()
        } else {
            ensure_remaining(buf.remaining(), 1, "8-bit heart rate", data)?;
            u16::from(buf.get_u8())
        };

        let energy_expended = if flags & Self::FLAG_ENERGY_EXPENDED != 0 {
            ensure_remaining(buf.remaining(), 2, "energy expended", data)?;
            Some(buf.get_u16_le())
        } else {
            None
        };

        let rr_intervals = if flags & Self::FLAG_RR_INTERVALS != 0 {
            if buf.remaining() % 2 != 0 {
                return Err(Error::InvalidData {
                    context: format!(
                        "Truncated RR interval in {} byte measurement: {:02X?}",
                        data.len(),
                        data
                    ),
                });
            }

            let mut intervals = Vec::with_capacity(buf.remaining() / 2);
            while buf.has_remaining() {
                intervals.push(buf.get_u16_le());
            }
            Some(intervals)
        } else {
            None
        };

        Ok(Self {
            heart_rate,
            hr_is_wide,
            sensor_contact,
            energy_expended,
            rr_intervals,
        })
    }

    /// Check if the energy expended field was present.
    pub fn energy_present(&self) -> bool {
        self.energy_expended.is_some()
    }

    /// Check if the RR interval flag was set.
    pub fn rr_present(&self) -> bool {
        self.rr_intervals.is_some()
    }

    /// RR intervals converted to seconds.
    pub fn rr_intervals_seconds(&self) -> Vec<f64> {
        self.rr_intervals
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|&rr| rr_interval_to_seconds(rr))
            .collect()
    }
}

fn ensure_remaining(remaining: usize, needed: usize, field: &str, data: &[u8]) -> Result<()> {
    if remaining < needed {
        return Err(Error::InvalidData {
            context: format!(
                "Measurement too short for {}: {} bytes ({:02X?})",
                field,
                data.len(),
                data
            ),
        });
    }
    Ok(())
}
