//! Sequence allocation with bounded, jittered retry.
//!
//! The counter increment itself is a single locked upsert in
//! `gatepass_db::repositories::SequenceRepo`; this module adds the retry
//! discipline around the *whole transactional unit* that uses the ordinal.
//! On a serialization conflict the entire unit re-runs; re-reading the
//! counter alone would hand out an ordinal whose transaction already rolled
//! back. The loop lives here so every call site (approval, duplicate
//! repair) gets the same guarantee instead of re-implementing backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use sqlx::{PgConnection, PgPool};

use gatepass_core::sequence;
use gatepass_db::repositories::SequenceRepo;

use crate::error::{WorkflowError, WorkflowResult};

/// Default maximum allocation attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default first-retry delay in milliseconds.
const DEFAULT_BASE_DELAY_MS: u64 = 25;
/// Default delay cap in milliseconds.
const DEFAULT_MAX_DELAY_MS: u64 = 1_000;

/// SQLSTATEs treated as transient conflicts: serialization failure,
/// deadlock detected, lock not available.
const TRANSIENT_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

/// Retry policy for transient allocation conflicts: exponential doubling
/// from a base delay, capped, with uniform jitter on top.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based): `base * 2^(attempt-1)`,
    /// capped, plus up to half of itself in jitter so colliding callers
    /// fan out instead of re-colliding in lockstep.
    fn delay_before_retry(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        let jitter = rand::rng().random_range(0..=capped / 2);
        Duration::from_millis(capped + jitter)
    }
}

/// Whether an error is a transient concurrency conflict worth retrying.
fn is_transient_conflict(err: &WorkflowError) -> bool {
    let WorkflowError::Database(sqlx::Error::Database(db_err)) = err else {
        return false;
    };
    db_err
        .code()
        .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref()))
}

/// Run one transactional allocation unit, retrying transient conflicts.
///
/// `unit` must build a fresh transaction per call and either commit wholly
/// or roll back by dropping it. Non-transient errors propagate immediately;
/// exhausting the budget yields [`WorkflowError::AllocationExhausted`].
pub(crate) async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    scope: &str,
    mut unit: F,
) -> WorkflowResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WorkflowResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match unit().await {
            Err(err) if is_transient_conflict(&err) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        scope,
                        attempts = attempt,
                        error = %err,
                        "Sequence allocation retries exhausted"
                    );
                    return Err(WorkflowError::AllocationExhausted {
                        scope: scope.to_string(),
                        attempts: attempt,
                    });
                }
                let delay = policy.delay_before_retry(attempt);
                tracing::warn!(
                    scope,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient allocation conflict, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Allocates document numbers for a scope.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    policy: RetryPolicy,
}

impl SequenceAllocator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Allocate and format the next document number inside the caller's
    /// transaction. The counter row stays locked until that transaction
    /// commits or rolls back, which is what keeps issued numbers gap-free.
    pub async fn allocate_in(
        &self,
        conn: &mut PgConnection,
        scope_key: &str,
    ) -> Result<String, sqlx::Error> {
        let ordinal = SequenceRepo::increment(conn, scope_key).await?;
        Ok(sequence::format_sequence_number(scope_key, ordinal))
    }

    /// Preview the number the scope would issue next.
    ///
    /// Non-authoritative: no lock is taken and the value can be stale the
    /// moment it returns. Display only.
    pub async fn preview_next(
        &self,
        pool: &PgPool,
        scope_key: &str,
    ) -> Result<String, sqlx::Error> {
        let ordinal = SequenceRepo::peek_next(pool, scope_key).await?;
        Ok(sequence::format_sequence_number(scope_key, ordinal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_from_base() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
        };
        // Jitter adds at most half of the capped delay.
        for (attempt, expected) in [(1u32, 100u64), (2, 200), (3, 400), (4, 800)] {
            let delay = policy.delay_before_retry(attempt).as_millis() as u64;
            assert!(
                (expected..=expected + expected / 2).contains(&delay),
                "attempt {attempt}: delay {delay} outside [{expected}, {}]",
                expected + expected / 2
            );
        }
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 20,
            base_delay_ms: 100,
            max_delay_ms: 500,
        };
        for attempt in 4..20 {
            let delay = policy.delay_before_retry(attempt).as_millis() as u64;
            assert!(delay <= 750, "attempt {attempt}: {delay}ms exceeds cap+jitter");
        }
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            base_delay_ms: u64::MAX / 2,
            max_delay_ms: 1_000,
        };
        let delay = policy.delay_before_retry(u32::MAX).as_millis() as u64;
        assert!(delay <= 1_500);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: WorkflowResult<()> = run_with_retry(&policy, "2025", || {
            calls += 1;
            async { Err(WorkflowError::NotFound { id: 1 }) }
        })
        .await;
        assert!(matches!(result, Err(WorkflowError::NotFound { id: 1 })));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn success_passes_through() {
        let policy = RetryPolicy::default();
        let result = run_with_retry(&policy, "2025", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
