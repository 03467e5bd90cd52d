//! Quota consumption with optimistic locking.

use std::time::Duration;

use crate::error::{Result, WalletError};
use crate::store::{unix_now, WalletStore};

use super::{CvQuota, QuotaPlan};

/// Maximum number of retries for optimistic locking conflicts.
const MAX_RETRIES: u32 = 3;

/// Result of a consumption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// One slot was consumed. `remaining` is `None` for unlimited plans.
    Consumed { remaining: Option<u32> },
    /// Nothing was consumed.
    Denied(DenyReason),
}

/// Why consumption was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The user has no quota record at all.
    NoQuota,
    /// The quota's `expires_at` has passed.
    Expired,
    /// `used` has reached `allowed`.
    Exhausted,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoQuota => "no quota",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
        };
        write!(f, "{}", s)
    }
}

/// Consumes and administers CV-creation quotas.
pub struct QuotaConsumer<S: WalletStore> {
    store: S,
}

impl<S: WalletStore> QuotaConsumer<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Try to consume one slot.
    ///
    /// Check and increment happen against the same read snapshot; the
    /// conditional save makes a concurrent consumer's write visible as a
    /// conflict, so `used` can never pass `allowed` however many tasks race.
    pub async fn consume(&self, user_id: &str) -> Result<ConsumeOutcome> {
        for attempt in 0..MAX_RETRIES {
            let Some(quota) = self.store.get_quota(user_id).await? else {
                return Ok(ConsumeOutcome::Denied(DenyReason::NoQuota));
            };

            if quota.is_expired(unix_now()) {
                tracing::debug!(user_id = %user_id, "quota expired");
                return Ok(ConsumeOutcome::Denied(DenyReason::Expired));
            }
            if quota.plan != QuotaPlan::Unlimited && quota.used >= quota.allowed {
                tracing::debug!(
                    user_id = %user_id,
                    used = quota.used,
                    allowed = quota.allowed,
                    "quota exhausted"
                );
                return Ok(ConsumeOutcome::Denied(DenyReason::Exhausted));
            }

            let expected_version = quota.version;
            let mut updated = quota.clone();
            updated.used += 1;
            updated.updated_at = unix_now();
            updated.version = expected_version + 1;

            if self
                .store
                .compare_and_save_quota(&updated, expected_version)
                .await?
            {
                tracing::info!(
                    user_id = %user_id,
                    used = updated.used,
                    allowed = updated.allowed,
                    "quota slot consumed"
                );
                return Ok(ConsumeOutcome::Consumed {
                    remaining: updated.remaining(),
                });
            }

            tracing::debug!(
                user_id = %user_id,
                attempt = attempt + 1,
                "quota version conflict, retrying"
            );
            backoff(attempt).await;
        }

        Err(WalletError::ConcurrencyConflict {
            resource: format!("quota:{}", user_id),
        })
    }

    /// Consume a slot or fail with `QuotaExhausted`.
    ///
    /// For callers that gate an action on the quota and want a plain error
    /// path instead of inspecting the outcome.
    pub async fn require(&self, user_id: &str) -> Result<Option<u32>> {
        match self.consume(user_id).await? {
            ConsumeOutcome::Consumed { remaining } => Ok(remaining),
            ConsumeOutcome::Denied(reason) => {
                let (used, allowed) = match self.store.get_quota(user_id).await? {
                    Some(quota) => (quota.used, quota.allowed),
                    None => (0, 0),
                };
                tracing::warn!(user_id = %user_id, %reason, "quota denied");
                Err(WalletError::QuotaExhausted {
                    used,
                    allowed,
                    reason,
                })
            }
        }
    }

    /// Grant or replace a user's quota. Administrative; not expected to race
    /// active consumption.
    pub async fn set_quota(
        &self,
        user_id: &str,
        allowed: u32,
        plan: QuotaPlan,
        expires_at: Option<u64>,
    ) -> Result<()> {
        let mut quota = CvQuota::new(user_id, allowed, plan);
        quota.expires_at = expires_at;
        if let Some(existing) = self.store.get_quota(user_id).await? {
            quota.version = existing.version + 1;
        }
        self.store.save_quota(&quota).await?;
        tracing::info!(user_id = %user_id, allowed, plan = %quota.plan, "quota set");
        Ok(())
    }

    /// Reset usage to zero (e.g., at the start of a billing month).
    pub async fn reset_usage(&self, user_id: &str) -> Result<()> {
        let Some(quota) = self.store.get_quota(user_id).await? else {
            return Err(WalletError::not_found(format!("quota for {}", user_id)));
        };
        let mut updated = quota;
        updated.used = 0;
        updated.updated_at = unix_now();
        updated.version += 1;
        self.store.save_quota(&updated).await?;
        tracing::info!(user_id = %user_id, "quota usage reset");
        Ok(())
    }

    /// Slots left: `Ok(None)` for unlimited plans, zero when absent or
    /// expired.
    pub async fn remaining(&self, user_id: &str) -> Result<Option<u32>> {
        let Some(quota) = self.store.get_quota(user_id).await? else {
            return Ok(Some(0));
        };
        if quota.is_expired(unix_now()) {
            return Ok(Some(0));
        }
        Ok(quota.remaining())
    }
}

async fn backoff(attempt: u32) {
    tokio::time::sleep(Duration::from_millis(10 << attempt)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test::InMemoryWalletStore;

    fn consumer() -> QuotaConsumer<InMemoryWalletStore> {
        QuotaConsumer::new(InMemoryWalletStore::new())
    }

    #[tokio::test]
    async fn test_consume_until_exhausted() {
        let consumer = consumer();
        consumer
            .set_quota("u1", 2, QuotaPlan::Monthly, None)
            .await
            .unwrap();

        assert_eq!(
            consumer.consume("u1").await.unwrap(),
            ConsumeOutcome::Consumed { remaining: Some(1) }
        );
        assert_eq!(
            consumer.consume("u1").await.unwrap(),
            ConsumeOutcome::Consumed { remaining: Some(0) }
        );
        assert_eq!(
            consumer.consume("u1").await.unwrap(),
            ConsumeOutcome::Denied(DenyReason::Exhausted)
        );
        assert_eq!(consumer.remaining("u1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_no_quota_denied() {
        let consumer = consumer();
        assert_eq!(
            consumer.consume("ghost").await.unwrap(),
            ConsumeOutcome::Denied(DenyReason::NoQuota)
        );
        assert_eq!(consumer.remaining("ghost").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_expired_quota_denied() {
        let consumer = consumer();
        consumer
            .set_quota("u1", 5, QuotaPlan::OneTime, Some(1))
            .await
            .unwrap();
        assert_eq!(
            consumer.consume("u1").await.unwrap(),
            ConsumeOutcome::Denied(DenyReason::Expired)
        );
    }

    #[tokio::test]
    async fn test_unlimited_counts_usage_but_never_denies() {
        let consumer = consumer();
        consumer
            .set_quota("u1", 0, QuotaPlan::Unlimited, None)
            .await
            .unwrap();

        for _ in 0..10 {
            assert_eq!(
                consumer.consume("u1").await.unwrap(),
                ConsumeOutcome::Consumed { remaining: None }
            );
        }
        assert_eq!(consumer.remaining("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_require_maps_denial_to_error() {
        let consumer = consumer();
        consumer
            .set_quota("u1", 1, QuotaPlan::Monthly, None)
            .await
            .unwrap();

        assert_eq!(consumer.require("u1").await.unwrap(), Some(0));
        let err = consumer.require("u1").await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::QuotaExhausted {
                used: 1,
                allowed: 1,
                reason: DenyReason::Exhausted,
            }
        ));
    }

    #[tokio::test]
    async fn test_require_distinguishes_deny_reasons() {
        let consumer = consumer();
        let err = consumer.require("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::QuotaExhausted {
                reason: DenyReason::NoQuota,
                ..
            }
        ));

        consumer
            .set_quota("u1", 5, QuotaPlan::OneTime, Some(1))
            .await
            .unwrap();
        let err = consumer.require("u1").await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::QuotaExhausted {
                used: 0,
                allowed: 5,
                reason: DenyReason::Expired,
            }
        ));
    }

    #[tokio::test]
    async fn test_reset_usage() {
        let consumer = consumer();
        consumer
            .set_quota("u1", 1, QuotaPlan::Monthly, None)
            .await
            .unwrap();
        consumer.consume("u1").await.unwrap();
        consumer.reset_usage("u1").await.unwrap();
        assert_eq!(consumer.remaining("u1").await.unwrap(), Some(1));
    }
}
