//! Timestamp capture and duration arithmetic.
//!
//! Protocol timestamps and durations are split into whole seconds and the
//! remaining nanoseconds. Arithmetic happens on total nanoseconds held in a
//! `u128`, so any `u64` seconds value round-trips without overflow.

use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::MessagesError;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

fn split_nanos(total: u128) -> (u64, u32) {
    let seconds = u64::try_from(total.div_euclid(NANOS_PER_SECOND)).unwrap_or(u64::MAX);
    // The remainder is below one billion and always fits.
    let nanos = u32::try_from(total.rem_euclid(NANOS_PER_SECOND)).unwrap_or(u32::MAX);
    (seconds, nanos)
}

/// Point in time since the Unix epoch, as carried by protocol messages.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::clock::Timestamp;
///
/// let ts = Timestamp::from_epoch_nanos(1_700_000_000_123_456_789);
/// assert_eq!(ts.seconds, 1_700_000_000);
/// assert_eq!(ts.nanos, 123_456_789);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Whole seconds since the epoch.
    pub seconds: u64,
    /// Nanoseconds past `seconds`, always below one billion.
    pub nanos: u32,
}

impl Timestamp {
    /// Split a nanosecond epoch counter into seconds and nanoseconds.
    #[must_use]
    pub fn from_epoch_nanos(nanos: u64) -> Self {
        Self::from_total_nanos(u128::from(nanos))
    }

    /// Split a wide nanosecond counter into seconds and nanoseconds.
    #[must_use]
    pub fn from_total_nanos(total: u128) -> Self {
        let (seconds, nanos) = split_nanos(total);
        Self { seconds, nanos }
    }

    /// Total nanoseconds represented by this timestamp.
    #[must_use]
    pub fn total_nanos(self) -> u128 {
        u128::from(self.seconds) * NANOS_PER_SECOND + u128::from(self.nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.seconds, self.nanos)
    }
}

/// Elapsed time between two timestamps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration {
    /// Whole seconds.
    pub seconds: u64,
    /// Nanoseconds past `seconds`, always below one billion.
    pub nanos: u32,
}

impl Duration {
    /// Total nanoseconds represented by this duration.
    #[must_use]
    pub fn total_nanos(self) -> u128 {
        u128::from(self.seconds) * NANOS_PER_SECOND + u128::from(self.nanos)
    }
}

/// Compute `finish - start` with the same floor split used for timestamps.
///
/// # Errors
///
/// Returns [`MessagesError::ClockRegression`] when `finish` precedes `start`.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::clock::{duration_between, Timestamp};
///
/// let start = Timestamp { seconds: 10, nanos: 900_000_000 };
/// let finish = Timestamp { seconds: 12, nanos: 100_000_000 };
/// let elapsed = duration_between(start, finish).unwrap();
/// assert_eq!((elapsed.seconds, elapsed.nanos), (1, 200_000_000));
/// ```
pub fn duration_between(start: Timestamp, finish: Timestamp) -> Result<Duration, MessagesError> {
    let elapsed = finish
        .total_nanos()
        .checked_sub(start.total_nanos())
        .ok_or(MessagesError::ClockRegression { start, finish })?;
    let (seconds, nanos) = split_nanos(elapsed);
    Ok(Duration { seconds, nanos })
}

/// Source of timestamps for the tracker.
///
/// Implementations must never return a value earlier than one they returned
/// before.
pub trait Clock {
    /// Capture the current time.
    fn now(&self) -> Timestamp;
}

/// Wall clock anchored once and advanced by a monotonic [`Instant`].
///
/// The anchor is read from [`SystemTime`] at construction; every later read
/// adds the monotonic elapsed time, so adjustments to the system clock during
/// a run cannot produce a negative step duration.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor_nanos: u128,
    anchor: Instant,
}

impl SystemClock {
    /// Anchor a new clock at the current wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            anchor_nanos: epoch.as_nanos(),
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.anchor.elapsed().as_nanos();
        Timestamp::from_total_nanos(self.anchor_nanos.saturating_add(elapsed))
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
