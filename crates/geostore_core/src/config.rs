//! Store configuration.
//!
//! # Responsibility
//! - Carry per-session tuning knobs from the host into the store adapter.
//!
//! # Invariants
//! - `closed_tolerance` is finite and non-negative.
//! - `page_size` is at least 1.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default endpoint tolerance for closed lines: 1 mm in project units of meters.
pub const DEFAULT_CLOSED_TOLERANCE: f64 = 0.001;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PAGE_SIZE: u32 = 256;

/// Options applied when a [`Session`](crate::db::Session) is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// How long a writer waits on a competing lock before `StoreBusy`.
    #[serde(with = "duration_ms")]
    pub busy_timeout: Duration,
    /// Maximum planar gap between first and last vertex of a closed line.
    pub closed_tolerance: f64,
    /// Rows fetched per round-trip by lazy query cursors.
    pub page_size: u32,
    /// Use write-ahead logging for file stores.
    pub write_ahead_log: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            closed_tolerance: DEFAULT_CLOSED_TOLERANCE,
            page_size: DEFAULT_PAGE_SIZE,
            write_ahead_log: true,
        }
    }
}

impl StoreOptions {
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Invalid tolerances (negative, NaN) fall back to the default.
    pub fn with_closed_tolerance(mut self, tolerance: f64) -> Self {
        self.closed_tolerance = if tolerance.is_finite() && tolerance >= 0.0 {
            tolerance
        } else {
            DEFAULT_CLOSED_TOLERANCE
        };
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_write_ahead_log(mut self, enabled: bool) -> Self {
        self.write_ahead_log = enabled;
        self
    }

    /// Returns a copy with out-of-range values clamped to usable ones.
    pub(crate) fn normalized(&self) -> Self {
        self.clone()
            .with_closed_tolerance(self.closed_tolerance)
            .with_page_size(self.page_size)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
