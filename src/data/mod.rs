//! Data structures for acquired heart rate data.
//!
//! This module contains the reading type delivered to consumers, the
//! notification period estimate and the acquisition counters.

pub mod reading;
pub mod stats;
pub mod timing;

pub use reading::HeartRateReading;
pub use stats::MonitorStats;
pub(crate) use stats::StatsCounters;
pub use timing::PeriodEstimate;
