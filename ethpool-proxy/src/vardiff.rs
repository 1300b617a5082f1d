//! Per-session dynamic difficulty ("vardiff").
//!
//! After every fully accepted share (except a session's first), the interval
//! since the previous accepted share is turned into a submit rate and the
//! session difficulty is scaled by a fixed step: up when the miner submits
//! faster than the configured band, down when slower. Only the last share
//! time is kept per session.

use std::time::Duration;

use crate::config::DynamicDifficultyConfig;
use crate::types::{Difficulty, SubmitRate};

/// Direction of a retarget step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Too many shares: make them harder.
    Raise,
    /// Too few shares: make them easier.
    Lower,
    Keep,
}

impl Adjustment {
    pub fn factor(&self) -> f64 {
        match self {
            Adjustment::Raise => 1.2,
            Adjustment::Lower => 0.8,
            Adjustment::Keep => 1.0,
        }
    }
}

/// Outcome of one retarget step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retarget {
    pub rate: SubmitRate,
    pub adjustment: Adjustment,
    pub difficulty: Difficulty,
}

/// Retargeting controller with a configured submit-rate band.
#[derive(Debug, Clone, Copy)]
pub struct VardiffController {
    min_rate: SubmitRate,
    max_rate: SubmitRate,
}

impl VardiffController {
    pub fn new(min_rate: SubmitRate, max_rate: SubmitRate) -> Self {
        Self { min_rate, max_rate }
    }

    pub fn from_config(config: &DynamicDifficultyConfig) -> Self {
        Self::new(
            SubmitRate::per_minute(config.min_submit_rate),
            SubmitRate::per_minute(config.max_submit_rate),
        )
    }

    /// Classify a submit rate against the band. The upper bound wins ties
    /// in a misconfigured band where both would apply.
    pub fn classify(&self, rate: SubmitRate) -> Adjustment {
        if rate > self.max_rate {
            Adjustment::Raise
        } else if rate < self.min_rate {
            Adjustment::Lower
        } else {
            Adjustment::Keep
        }
    }

    /// Compute the next difficulty from the interval since the last
    /// accepted share.
    pub fn retarget(&self, current: Difficulty, round: Duration) -> Retarget {
        let rate = SubmitRate::from_round_duration(round);
        let adjustment = self.classify(rate);
        let scaled = (current.as_u64() as f64 * adjustment.factor()) as u64;
        Retarget {
            rate,
            adjustment,
            difficulty: Difficulty::new(scaled),
        }
    }
}
