//! Submit rate type for expressing how often a session delivers shares.

use std::fmt;
use std::time::Duration;

/// Share submission rate in whole shares per minute.
///
/// The retargeting controller only ever sees the interval between the last
/// two accepted shares, so the rate is derived from a single round duration
/// and truncated to an integer, matching the thresholds operators configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubmitRate(u64);

impl SubmitRate {
    /// Create a rate of N shares per minute.
    pub const fn per_minute(shares: u64) -> Self {
        Self(shares)
    }

    /// Derive the rate from the interval between two shares.
    ///
    /// Two shares accepted within the same millisecond have no measurable
    /// interval; that case yields the maximum rate so it always counts as
    /// "too fast".
    pub fn from_round_duration(round: Duration) -> Self {
        let millis = round.as_millis();
        if millis == 0 {
            return Self(u64::MAX);
        }
        Self((60_000 / millis) as u64)
    }

    /// Get the rate as shares per minute.
    pub const fn as_per_minute(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubmitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} shares/min", self.0)
    }
}
