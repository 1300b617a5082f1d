//! Share difficulty and its target encoding.
//!
//! Ethash pools hand out work as a *target* (also called the boundary): a
//! 256-bit value that the result digest of a share must not exceed. The
//! target relates to the integer difficulty by `target = 2^256 / difficulty`.
//! On the wire the target travels as a `0x`-prefixed, 64-digit, lower-case
//! hex string.

use std::fmt;

use ruint::aliases::U256;

/// Integer share difficulty.
///
/// Always at least 1, because a zero difficulty has no target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Difficulty(u64);

impl Difficulty {
    /// The easiest representable difficulty.
    pub const MIN: Difficulty = Difficulty(1);

    /// Create a difficulty, clamping zero up to [`Difficulty::MIN`].
    pub const fn new(value: u64) -> Self {
        if value == 0 {
            Self::MIN
        } else {
            Self(value)
        }
    }

    /// Get the integer value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The 256-bit boundary a result digest must not exceed.
    ///
    /// Difficulty 1 would need `2^256`, which doesn't fit; it saturates to
    /// `U256::MAX`.
    pub fn boundary(&self) -> U256 {
        pow256_div(U256::from(self.0))
    }

    /// Encode as the protocol's hex target.
    pub fn to_target_hex(&self) -> String {
        format!("0x{}", hex::encode(self.boundary().to_be_bytes::<32>()))
    }

    /// Decode the protocol's hex target back to a difficulty.
    ///
    /// Returns `None` for strings that are not hex or encode a zero target.
    /// Targets so small that the difficulty overflows `u64` saturate.
    pub fn from_target_hex(target: &str) -> Option<Self> {
        let digits = target.strip_prefix("0x").unwrap_or(target);
        let target = U256::from_str_radix(digits, 16).ok()?;
        if target.is_zero() {
            return None;
        }
        Some(Self::new(pow256_div(target).saturating_to::<u64>()))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Difficulty {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

// Compute floor(2^256 / divisor) without a 512-bit intermediate. With
// 2^256 = MAX + 1, the quotient is one more than MAX / divisor exactly when
// the remainder of MAX / divisor is divisor - 1.
fn pow256_div(divisor: U256) -> U256 {
    debug_assert!(!divisor.is_zero());
    if divisor == U256::from(1u64) {
        return U256::MAX;
    }
    let quotient = U256::MAX / divisor;
    let remainder = U256::MAX % divisor;
    if remainder + U256::from(1u64) == divisor {
        quotient + U256::from(1u64)
    } else {
        quotient
    }
}
