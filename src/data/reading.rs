//! Published heart rate readings.

use chrono::{DateTime, Utc};

use crate::protocol::HeartRateMeasurement;
use crate::utils::bpm_from_rr_interval;

/// One decoded notification, as delivered to consumers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartRateReading {
    /// Heart rate in beats per minute.
    pub heart_rate: u16,

    /// The full decoded measurement.
    pub measurement: HeartRateMeasurement,

    /// When the notification was received.
    pub received_at: DateTime<Utc>,
}

impl HeartRateReading {
    /// Create a reading received now.
    pub fn new(measurement: HeartRateMeasurement) -> Self {
        Self::at(measurement, Utc::now())
    }

    /// Create a reading with an explicit receive time.
    pub fn at(measurement: HeartRateMeasurement, received_at: DateTime<Utc>) -> Self {
        Self {
            heart_rate: measurement.heart_rate,
            measurement,
            received_at,
        }
    }

    /// Heart rate derived from the most recent RR interval, if any.
    pub fn instantaneous_bpm(&self) -> Option<f64> {
        self.measurement
            .rr_intervals
            .as_ref()?
            .last()
            .and_then(|&rr| bpm_from_rr_interval(rr))
    }
}
