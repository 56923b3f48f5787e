//! Repository for the `sequence_counters` table.
//!
//! This is the only code path that writes `sequence_counters`. A counter is
//! one durable, lockable integer per numbering scope, stored as a
//! first-class row so the locking granularity is a single-row lock rather
//! than a table scan over issued numbers.

use sqlx::{PgConnection, PgPool};

use crate::models::sequence::{DuplicateSequence, SequenceCounter};

/// Provides allocation and integrity operations for sequence counters.
pub struct SequenceRepo;

impl SequenceRepo {
    /// Allocate the next ordinal for a scope.
    ///
    /// A single upsert-increment: the first allocation in a scope creates
    /// the row at 1; afterwards the `DO UPDATE` takes the row lock and
    /// serializes concurrent increments. The lock is held until the caller's
    /// transaction commits, which is what makes the issued range gap-free:
    /// an aborted transaction rolls the increment back before anyone else
    /// can observe it.
    ///
    /// Must be called inside the transaction that also persists whatever
    /// the ordinal is being issued for.
    pub async fn increment(conn: &mut PgConnection, scope_key: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO sequence_counters (scope_key, last_issued)
             VALUES ($1, 1)
             ON CONFLICT (scope_key) DO UPDATE
             SET last_issued = sequence_counters.last_issued + 1,
                 updated_at = NOW()
             RETURNING last_issued",
        )
        .bind(scope_key)
        .fetch_one(&mut *conn)
        .await
    }

    /// Read the next ordinal a scope would issue, without locking.
    ///
    /// Non-authoritative: the value can be stale the moment it returns.
    /// Display/preview use only; never feed it back into an allocation.
    pub async fn peek_next(pool: &PgPool, scope_key: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(
                (SELECT last_issued FROM sequence_counters WHERE scope_key = $1),
                0
             ) + 1",
        )
        .bind(scope_key)
        .fetch_one(pool)
        .await
    }

    /// Find a counter row by scope.
    pub async fn find(
        pool: &PgPool,
        scope_key: &str,
    ) -> Result<Option<SequenceCounter>, sqlx::Error> {
        sqlx::query_as::<_, SequenceCounter>(
            "SELECT scope_key, last_issued, updated_at
             FROM sequence_counters
             WHERE scope_key = $1",
        )
        .bind(scope_key)
        .fetch_optional(pool)
        .await
    }

    /// Surface document numbers held by more than one approved permit.
    ///
    /// Under the transactional allocation contract (and the partial unique
    /// index) this returns nothing; a hit means an out-of-band writer
    /// bypassed both and the rows need manual repair. Holders are ordered by
    /// creation time so the first listed permit is the one whose number
    /// stays stable.
    pub async fn find_duplicate_sequences(
        pool: &PgPool,
    ) -> Result<Vec<DuplicateSequence>, sqlx::Error> {
        sqlx::query_as::<_, DuplicateSequence>(
            "SELECT sequence_number,
                    ARRAY_AGG(id ORDER BY created_at ASC, id ASC) AS permit_ids
             FROM permit_requests
             WHERE sequence_number IS NOT NULL
             GROUP BY sequence_number
             HAVING COUNT(*) > 1
             ORDER BY sequence_number ASC",
        )
        .fetch_all(pool)
        .await
    }
}
