//! Monotonic span timestamps with a wall-clock projection for exporters.

use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Wall-clock anchor captured once per process.
struct ClockAnchor {
    instant: Instant,
    unix_nanos: u64,
}

static ANCHOR: Lazy<ClockAnchor> = Lazy::new(|| ClockAnchor {
    instant: Instant::now(),
    unix_nanos: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64,
});

/// Point in time on the monotonic clock.
///
/// Backed by `tokio::time::Instant`, so paused test runtimes control it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Instant);

impl Timestamp {
    pub fn now() -> Self {
        Lazy::force(&ANCHOR);
        Self(Instant::now())
    }

    /// Nanoseconds since the Unix epoch, projected through the anchor.
    ///
    /// The projection is affine in both directions: paused test clocks can
    /// hand out instants that precede the anchor.
    pub fn unix_nanos(&self) -> u64 {
        let anchor = &*ANCHOR;
        if self.0 >= anchor.instant {
            let ahead = self.0.duration_since(anchor.instant).as_nanos() as u64;
            anchor.unix_nanos.saturating_add(ahead)
        } else {
            let behind = anchor.instant.duration_since(self.0).as_nanos() as u64;
            anchor.unix_nanos.saturating_sub(behind)
        }
    }

    /// Microseconds since the Unix epoch.
    pub fn unix_micros(&self) -> u64 {
        self.unix_nanos() / 1_000
    }

    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.unix_nanos())
    }
}
