//! Monotonic timestamps relative to a process-wide epoch
//!
//! Timestamps are plain nanosecond counters so that events stay `Copy`,
//! compare cheaply and serialize without losing precision.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

/// Process-start epoch shared by every thread.
static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Nanoseconds since the process epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Elapsed nanoseconds from `earlier` to `self`, zero if the clock
    /// appears to have gone backwards.
    pub fn nanos_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Read the monotonic clock
#[inline]
pub fn now() -> Timestamp {
    Timestamp(epoch().elapsed().as_nanos() as u64)
}

/// Unit used when rendering durations in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Ns,
    Us,
}

impl TimeUnit {
    pub fn label(self) -> &'static str {
        match self {
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
        }
    }

    /// Convert a nanosecond count, truncating
    pub fn convert(self, ns: u64) -> u64 {
        match self {
            TimeUnit::Ns => ns,
            TimeUnit::Us => ns / 1_000,
        }
    }

    pub fn convert_f64(self, ns: f64) -> f64 {
        match self {
            TimeUnit::Ns => ns,
            TimeUnit::Us => ns / 1_000.0,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
