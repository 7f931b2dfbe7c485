//! Observation epochs as Modified Julian Dates.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// MJD of the Unix epoch (1970-01-01T00:00:00).
const MJD_UNIX_EPOCH: f64 = 40_587.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// A UTC instant expressed as a Modified Julian Date (days).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(f64);

impl Epoch {
    pub fn from_mjd(mjd: f64) -> Self {
        Epoch(mjd)
    }

    pub fn mjd(self) -> f64 {
        self.0
    }

    /// Convert a naive UTC date-time.
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        let utc = dt.and_utc();
        let seconds = utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9;
        Epoch(MJD_UNIX_EPOCH + seconds / SECONDS_PER_DAY)
    }

    /// Build from calendar fields, the way session archives tag scans
    /// (year, month, day, hour, minute plus fractional seconds).
    ///
    /// Returns `None` for an impossible date or time of day.
    pub fn from_calendar(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        seconds: f64,
    ) -> Option<Self> {
        if !seconds.is_finite() || !(0.0..61.0).contains(&seconds) {
            return None;
        }
        let dt = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
        let base = Epoch::from_datetime(dt);
        Some(Epoch(base.0 + seconds / SECONDS_PER_DAY))
    }

    /// Nearest representable date-time (microsecond resolution).
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        let micros = ((self.0 - MJD_UNIX_EPOCH) * SECONDS_PER_DAY * 1e6).round();
        if !micros.is_finite() || micros.abs() > i64::MAX as f64 {
            return None;
        }
        DateTime::from_timestamp_micros(micros as i64).map(|dt| dt.naive_utc())
    }

    /// Signed interval `self - other` in days.
    pub fn days_since(self, other: Epoch) -> f64 {
        self.0 - other.0
    }

    /// Midpoint between two epochs.
    pub fn midpoint(self, other: Epoch) -> Epoch {
        Epoch(0.5 * (self.0 + other.0))
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3f")),
            None => write!(f, "MJD {:.6}", self.0),
        }
    }
}
