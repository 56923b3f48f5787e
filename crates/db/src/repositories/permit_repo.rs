//! Repository for the `permit_requests` table.
//!
//! Workflow transitions are guarded conditional UPDATEs: the `WHERE` clause
//! encodes the state-machine precondition and `RETURNING` hands back the
//! updated row, so a concurrent transition can never be overwritten: the
//! loser simply matches zero rows. The approval path additionally locks the
//! row with `SELECT ... FOR UPDATE` so the precondition re-check and the
//! sequence allocation happen under the same transaction.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use gatepass_core::status::{ApprovalStatus, ReviewStatus};
use gatepass_core::types::DbId;

use crate::models::permit::{CreatePermitRequest, PermitRequest, ValidityWindow};

/// Column list for permit_requests queries.
const COLUMNS: &str = "id, public_id, vendor_ref, description, \
    review_status_id, approval_status_id, sequence_number, \
    validity_start, validity_end, reviewer_ref, reviewed_at, review_note, \
    approver_ref, approved_at, rejected_at, rejection_reason, \
    created_at, updated_at";

/// Provides persistence operations for permit requests.
pub struct PermitRepo;

impl PermitRepo {
    /// Insert a new permit request in the initial workflow state.
    ///
    /// Runs inside the caller's transaction so the submission audit entry
    /// commits atomically with the row.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreatePermitRequest,
    ) -> Result<PermitRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO permit_requests (public_id, vendor_ref, description)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(Uuid::now_v7())
            .bind(input.vendor_ref)
            .bind(&input.description)
            .fetch_one(&mut *conn)
            .await
    }

    /// Find a permit by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM permit_requests WHERE id = $1");
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a permit by its public (credential) identity.
    pub async fn find_by_public_id(
        pool: &PgPool,
        public_id: Uuid,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM permit_requests WHERE public_id = $1");
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(public_id)
            .fetch_optional(pool)
            .await
    }

    /// List all permits submitted by a vendor, newest first.
    pub async fn list_for_vendor(
        pool: &PgPool,
        vendor_ref: DbId,
    ) -> Result<Vec<PermitRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM permit_requests
             WHERE vendor_ref = $1
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(vendor_ref)
            .fetch_all(pool)
            .await
    }

    /// List permits awaiting a reviewer's decision, oldest first.
    pub async fn list_pending_review(pool: &PgPool) -> Result<Vec<PermitRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM permit_requests
             WHERE review_status_id = $1 AND approval_status_id = $2
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(ReviewStatus::PendingReview.id())
            .bind(ApprovalStatus::PendingApproval.id())
            .fetch_all(pool)
            .await
    }

    /// Re-read a permit inside the caller's transaction.
    pub async fn find_by_id_in(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM permit_requests WHERE id = $1");
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Lock a permit row for the duration of the caller's transaction.
    ///
    /// The approval path locks the permit before touching the sequence
    /// counter; that lock order is the same everywhere, so two approvals
    /// cannot deadlock against each other.
    pub async fn lock_for_transition(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM permit_requests WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Record a reviewer's decision on a permit awaiting review.
    ///
    /// Returns `None` if the permit is not in (PendingReview,
    /// PendingApproval); an earlier decision is never overwritten.
    pub async fn record_review(
        conn: &mut PgConnection,
        id: DbId,
        outcome_status: ReviewStatus,
        reviewer_ref: DbId,
        note: Option<&str>,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE permit_requests
             SET review_status_id = $2,
                 reviewer_ref = $3,
                 reviewed_at = NOW(),
                 review_note = $4,
                 updated_at = NOW()
             WHERE id = $1
               AND review_status_id = $5
               AND approval_status_id = $6
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .bind(outcome_status.id())
            .bind(reviewer_ref)
            .bind(note)
            .bind(ReviewStatus::PendingReview.id())
            .bind(ApprovalStatus::PendingApproval.id())
            .fetch_optional(&mut *conn)
            .await
    }

    /// Return a review-failed permit to the queue, clearing the prior
    /// reviewer's artifacts so the next reviewer sees a fresh record.
    pub async fn clear_review(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE permit_requests
             SET review_status_id = $2,
                 reviewer_ref = NULL,
                 reviewed_at = NULL,
                 review_note = NULL,
                 updated_at = NOW()
             WHERE id = $1
               AND review_status_id = $3
               AND approval_status_id = $4
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .bind(ReviewStatus::PendingReview.id())
            .bind(ReviewStatus::NotMeetsRequirements.id())
            .bind(ApprovalStatus::PendingApproval.id())
            .fetch_optional(&mut *conn)
            .await
    }

    /// Flip a permit to Approved, attaching its freshly allocated sequence
    /// number and optional validity window.
    ///
    /// Must run in the same transaction as the counter increment. The guard
    /// re-checks the precondition even though the caller holds the row lock.
    pub async fn record_approval(
        conn: &mut PgConnection,
        id: DbId,
        sequence_number: &str,
        approver_ref: DbId,
        validity: Option<ValidityWindow>,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE permit_requests
             SET approval_status_id = $2,
                 sequence_number = $3,
                 approver_ref = $4,
                 approved_at = NOW(),
                 validity_start = $5,
                 validity_end = $6,
                 updated_at = NOW()
             WHERE id = $1
               AND review_status_id = $7
               AND approval_status_id = $8
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .bind(ApprovalStatus::Approved.id())
            .bind(sequence_number)
            .bind(approver_ref)
            .bind(validity.map(|w| w.start))
            .bind(validity.map(|w| w.end))
            .bind(ReviewStatus::MeetsRequirements.id())
            .bind(ApprovalStatus::PendingApproval.id())
            .fetch_optional(&mut *conn)
            .await
    }

    /// Record an approver's rejection. Terminal; no sequence number.
    pub async fn record_rejection(
        conn: &mut PgConnection,
        id: DbId,
        approver_ref: DbId,
        reason: &str,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE permit_requests
             SET approval_status_id = $2,
                 approver_ref = $3,
                 rejected_at = NOW(),
                 rejection_reason = $4,
                 updated_at = NOW()
             WHERE id = $1
               AND approval_status_id = $5
               AND review_status_id IN ($6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .bind(ApprovalStatus::Rejected.id())
            .bind(approver_ref)
            .bind(reason)
            .bind(ApprovalStatus::PendingApproval.id())
            .bind(ReviewStatus::MeetsRequirements.id())
            .bind(ReviewStatus::NotMeetsRequirements.id())
            .fetch_optional(&mut *conn)
            .await
    }

    /// List the IDs of all permits holding a given sequence number,
    /// earliest-created first. More than one element means the uniqueness
    /// contract was violated out-of-band.
    pub async fn find_ids_holding_sequence(
        conn: &mut PgConnection,
        sequence_number: &str,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM permit_requests
             WHERE sequence_number = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(sequence_number)
        .fetch_all(&mut *conn)
        .await
    }

    /// Replace the sequence number of a duplicate-repair target.
    ///
    /// Only called by the explicit repair procedure; the guard insists the
    /// permit is approved and currently holds the expected number.
    pub async fn replace_sequence_number(
        conn: &mut PgConnection,
        id: DbId,
        expected_current: &str,
        new_sequence_number: &str,
    ) -> Result<Option<PermitRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE permit_requests
             SET sequence_number = $3,
                 updated_at = NOW()
             WHERE id = $1
               AND approval_status_id = $4
               AND sequence_number = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PermitRequest>(&query)
            .bind(id)
            .bind(expected_current)
            .bind(new_sequence_number)
            .bind(ApprovalStatus::Approved.id())
            .fetch_optional(&mut *conn)
            .await
    }
}
