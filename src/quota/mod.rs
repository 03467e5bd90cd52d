//! CV-creation quota tracking and consumption.
//!
//! A quota is a counter with a ceiling: `used` never exceeds `allowed`
//! (unlimited plans excepted) no matter how many tasks try to consume at
//! once. Consumption is check-and-increment under optimistic locking, never
//! check-then-increment as two separate writes.

mod consumer;

pub use consumer::{ConsumeOutcome, DenyReason, QuotaConsumer};

use serde::{Deserialize, Serialize};

/// How the quota was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPlan {
    /// Resets each billing month.
    Monthly,
    /// A single purchased batch.
    OneTime,
    /// No ceiling; `used` still counts for telemetry.
    Unlimited,
}

impl QuotaPlan {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::OneTime => "one_time",
            Self::Unlimited => "unlimited",
        }
    }
}

impl std::fmt::Display for QuotaPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's CV-creation allowance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CvQuota {
    pub user_id: String,
    /// Ceiling; ignored for `Unlimited` plans.
    pub allowed: u32,
    /// Consumed so far.
    pub used: u32,
    pub plan: QuotaPlan,
    /// Unix timestamp after which the quota no longer grants anything.
    pub expires_at: Option<u64>,
    pub updated_at: u64,
    /// Optimistic-locking version.
    pub version: u64,
}

impl CvQuota {
    /// Create a fresh quota with zero usage.
    #[must_use]
    pub fn new(user_id: impl Into<String>, allowed: u32, plan: QuotaPlan) -> Self {
        Self {
            user_id: user_id.into(),
            allowed,
            used: 0,
            plan,
            expires_at: None,
            updated_at: crate::store::unix_now(),
            version: 0,
        }
    }

    /// Whether the quota has lapsed.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Slots left, `None` for unlimited plans.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        match self.plan {
            QuotaPlan::Unlimited => None,
            _ => Some(self.allowed.saturating_sub(self.used)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining() {
        let mut quota = CvQuota::new("u1", 3, QuotaPlan::Monthly);
        assert_eq!(quota.remaining(), Some(3));
        quota.used = 2;
        assert_eq!(quota.remaining(), Some(1));
        quota.used = 5;
        assert_eq!(quota.remaining(), Some(0));

        let quota = CvQuota::new("u1", 0, QuotaPlan::Unlimited);
        assert_eq!(quota.remaining(), None);
    }

    #[test]
    fn test_expiry() {
        let mut quota = CvQuota::new("u1", 3, QuotaPlan::OneTime);
        assert!(!quota.is_expired(1_000));
        quota.expires_at = Some(500);
        assert!(quota.is_expired(1_000));
        assert!(quota.is_expired(500));
        assert!(!quota.is_expired(499));
    }
}
