//! Quota arithmetic.
//!
//! The account page records hard limits in KiB. Backends are driven in bytes:
//!
//! ```text
//! hard = KiB * 1024 * replication_factor
//! soft = floor(hard * soft_fraction)
//! ```
//!
//! Fractions are held in parts per million so the floor is exact for every
//! value the account page can hand out (no `0.95 * 20480 = 19455.999..`).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const PPM: u64 = 1_000_000;

/// A fraction in (0, 1], stored in parts per million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Fraction(u64);

impl Fraction {
    /// Build a fraction, rejecting values outside (0, 1].
    pub fn new(value: f64) -> CoreResult<Self> {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            return Err(CoreError::InvalidQuota {
                name: "fraction",
                value: value.to_string(),
            });
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let ppm = (value * PPM as f64).round() as u64;
        Ok(Self(ppm.max(1)))
    }

    /// The fraction as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / PPM as f64
    }

    /// `floor(value * self)`, computed without floating point.
    #[must_use]
    pub fn apply_floor(&self, value: u64) -> u64 {
        let scaled = u128::from(value) * u128::from(self.0) / u128::from(PPM);
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

impl TryFrom<f64> for Fraction {
    type Error = CoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Fraction> for f64 {
    fn from(fraction: Fraction) -> Self {
        fraction.as_f64()
    }
}

/// Deployment-wide quota policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    soft_fraction: Fraction,
}

impl QuotaPolicy {
    /// Create a policy with the given soft fraction.
    pub fn new(soft_fraction: f64) -> CoreResult<Self> {
        Ok(Self {
            soft_fraction: Fraction::new(soft_fraction)?,
        })
    }

    /// Create a policy from an already validated fraction.
    #[must_use]
    pub fn from_fraction(soft_fraction: Fraction) -> Self {
        Self { soft_fraction }
    }

    /// The soft fraction.
    #[must_use]
    pub fn soft_fraction(&self) -> Fraction {
        self.soft_fraction
    }

    /// Soft limit for a hard limit.
    ///
    /// For every `hard > 0` the result satisfies `0 < soft <= hard`.
    #[must_use]
    pub fn soft_for(&self, hard: u64) -> u64 {
        if hard == 0 {
            return 0;
        }
        self.soft_fraction.apply_floor(hard).clamp(1, hard)
    }
}

/// Soft and hard limits in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Soft limit in bytes.
    pub soft: u64,
    /// Hard limit in bytes.
    pub hard: u64,
}

impl QuotaLimits {
    /// Limits for a hard limit already expressed in bytes.
    #[must_use]
    pub fn from_hard_bytes(hard: u64, policy: &QuotaPolicy) -> Self {
        Self {
            soft: policy.soft_for(hard),
            hard,
        }
    }

    /// Limits for a KiB value from the account page.
    ///
    /// A replication factor of 0 is treated as 1 (no replication).
    #[must_use]
    pub fn from_kib(kib: u64, replication_factor: u32, policy: &QuotaPolicy) -> Self {
        let hard = kib
            .saturating_mul(1024)
            .saturating_mul(u64::from(replication_factor.max(1)));
        Self::from_hard_bytes(hard, policy)
    }

    /// A member's share of these limits, e.g. half of a project quota.
    #[must_use]
    pub fn share(&self, share: Fraction, policy: &QuotaPolicy) -> Self {
        Self::from_hard_bytes(share.apply_floor(self.hard), policy)
    }
}
