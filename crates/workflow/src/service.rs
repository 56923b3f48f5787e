//! Permit workflow service.
//!
//! The inbound API for the (external) HTTP layer. Each mutating operation
//! runs the pure transition rules from `gatepass_core::workflow` against the
//! repository layer in one short transaction, with its audit entry committed
//! atomically alongside the state change.
//!
//! Approval is the concurrency-critical path: the permit row lock, the
//! counter increment, the status flip, and the audit entry share a single
//! transaction, retried as a whole on transient conflicts. A caller-imposed
//! deadline that cancels `approve` mid-flight simply drops the open
//! transaction, so either everything committed or nothing did.

use chrono::{Datelike, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use gatepass_core::audit::action_types;
use gatepass_core::credential::{self, CredentialClaims, VerifyError};
use gatepass_core::error::CoreError;
use gatepass_core::sequence::parse_sequence_number;
use gatepass_core::status::{ApprovalStatus, ReviewStatus};
use gatepass_core::types::DbId;
use gatepass_core::workflow::{self, ReviewOutcome, TransitionError, WorkflowState};
use gatepass_db::models::audit::CreateAuditEntry;
use gatepass_db::models::permit::{CreatePermitRequest, PermitRequest, ValidityWindow};
use gatepass_db::models::sequence::DuplicateSequence;
use gatepass_db::repositories::{AuditRepo, PermitRepo, SequenceRepo};

use crate::allocator::{run_with_retry, SequenceAllocator};
use crate::config::WorkflowConfig;
use crate::error::{WorkflowError, WorkflowResult};

/// Drives permit requests through review, approval, numbering, and
/// credential issuance.
#[derive(Debug, Clone)]
pub struct PermitService {
    pool: PgPool,
    config: WorkflowConfig,
    allocator: SequenceAllocator,
}

impl PermitService {
    pub fn new(pool: PgPool, config: WorkflowConfig) -> Self {
        let allocator = SequenceAllocator::new(config.retry.clone());
        Self {
            pool,
            config,
            allocator,
        }
    }

    /// Create a permit request in the initial (pending review, pending
    /// approval) state. Vendor-facing.
    pub async fn submit_for_review(
        &self,
        input: &CreatePermitRequest,
    ) -> WorkflowResult<PermitRequest> {
        let mut tx = self.pool.begin().await?;
        let permit = PermitRepo::create(&mut tx, input).await?;
        self.audit(&mut tx, permit.id, None, action_types::SUBMIT, None)
            .await?;
        tx.commit().await?;

        tracing::info!(
            permit_id = permit.id,
            vendor_ref = permit.vendor_ref,
            "Permit request submitted"
        );
        Ok(permit)
    }

    /// Record a reviewer's pass/fail decision on a pending permit.
    ///
    /// Fails with an invalid-transition error if the permit has already
    /// been reviewed or decided: review decisions are immutable except via
    /// [`PermitService::resubmit`].
    pub async fn review(
        &self,
        permit_id: DbId,
        outcome: ReviewOutcome,
        note: Option<&str>,
        reviewer_ref: DbId,
    ) -> WorkflowResult<PermitRequest> {
        let outcome_status = match outcome {
            ReviewOutcome::Pass => ReviewStatus::MeetsRequirements,
            ReviewOutcome::Fail => ReviewStatus::NotMeetsRequirements,
        };

        let mut tx = self.pool.begin().await?;
        let Some(permit) =
            PermitRepo::record_review(&mut tx, permit_id, outcome_status, reviewer_ref, note)
                .await?
        else {
            return Err(Self::transition_failure(&mut tx, permit_id, |s| {
                workflow::apply_review(s, outcome)
            })
            .await);
        };
        let action = match outcome {
            ReviewOutcome::Pass => action_types::REVIEW_PASS,
            ReviewOutcome::Fail => action_types::REVIEW_FAIL,
        };
        self.audit(
            &mut tx,
            permit_id,
            Some(reviewer_ref),
            action,
            note.map(str::to_string),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            permit_id,
            reviewer_ref,
            outcome = outcome.as_str(),
            "Permit reviewed"
        );
        Ok(permit)
    }

    /// Return a review-failed permit to the review queue.
    ///
    /// Clears the prior reviewer reference, timestamp, and note so the next
    /// reviewer sees a fresh record rather than stale reasoning.
    pub async fn resubmit(&self, permit_id: DbId) -> WorkflowResult<PermitRequest> {
        let mut tx = self.pool.begin().await?;
        let Some(permit) = PermitRepo::clear_review(&mut tx, permit_id).await? else {
            return Err(
                Self::transition_failure(&mut tx, permit_id, workflow::apply_resubmit).await,
            );
        };
        self.audit(&mut tx, permit_id, None, action_types::RESUBMIT, None)
            .await?;
        tx.commit().await?;

        tracing::info!(permit_id, "Permit resubmitted for review");
        Ok(permit)
    }

    /// Approve a permit that passed review, allocating its document number.
    ///
    /// The number allocation and the status flip are indivisible: both
    /// commit in one transaction or neither does. Transient conflicts are
    /// retried with backoff; if the retry budget is spent the permit stays
    /// pending approval and the caller gets
    /// [`WorkflowError::AllocationExhausted`].
    pub async fn approve(
        &self,
        permit_id: DbId,
        approver_ref: DbId,
        validity: Option<ValidityWindow>,
    ) -> WorkflowResult<PermitRequest> {
        // Scope is the approval-time year: a December submission approved
        // in January numbers into the new year.
        let scope = Utc::now().year().to_string();

        let permit = run_with_retry(&self.config.retry, &scope, || {
            self.approve_once(permit_id, approver_ref, validity, &scope)
        })
        .await?;

        tracing::info!(
            permit_id,
            approver_ref,
            sequence_number = permit.sequence_number.as_deref().unwrap_or(""),
            "Permit approved"
        );
        Ok(permit)
    }

    /// One attempt of the approve unit. Lock order is permit row first,
    /// then counter row; the same order everywhere rules out deadlocks
    /// between concurrent approvals.
    async fn approve_once(
        &self,
        permit_id: DbId,
        approver_ref: DbId,
        validity: Option<ValidityWindow>,
        scope: &str,
    ) -> WorkflowResult<PermitRequest> {
        let mut tx = self.pool.begin().await?;

        let Some(permit) = PermitRepo::lock_for_transition(&mut tx, permit_id).await? else {
            return Err(WorkflowError::NotFound { id: permit_id });
        };
        // Check the precondition before touching the counter so an invalid
        // approval never takes the counter lock at all.
        workflow::apply_approve(permit.workflow_state()?)?;

        let sequence_number = self.allocator.allocate_in(&mut tx, scope).await?;
        let updated =
            PermitRepo::record_approval(&mut tx, permit_id, &sequence_number, approver_ref, validity)
                .await?
                .ok_or_else(|| {
                    // The row is locked and the precondition held above.
                    CoreError::Internal(format!(
                        "approval guard failed under row lock for permit {permit_id}"
                    ))
                })?;
        self.audit(
            &mut tx,
            permit_id,
            Some(approver_ref),
            action_types::APPROVE,
            Some(sequence_number),
        )
        .await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Reject a reviewed permit. Terminal: a rejected permit is never
    /// resubmittable and never receives a sequence number.
    pub async fn reject(
        &self,
        permit_id: DbId,
        approver_ref: DbId,
        reason: &str,
    ) -> WorkflowResult<PermitRequest> {
        let mut tx = self.pool.begin().await?;
        let Some(permit) =
            PermitRepo::record_rejection(&mut tx, permit_id, approver_ref, reason).await?
        else {
            return Err(
                Self::transition_failure(&mut tx, permit_id, workflow::apply_reject).await,
            );
        };
        self.audit(
            &mut tx,
            permit_id,
            Some(approver_ref),
            action_types::REJECT,
            Some(reason.to_string()),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(permit_id, approver_ref, "Permit rejected");
        Ok(permit)
    }

    /// Preview the document number a scope would issue next.
    ///
    /// Non-authoritative: the counter is read without a lock, so the value
    /// may be stale the moment it returns. Display only: issued numbers
    /// come exclusively from [`PermitService::approve`].
    pub async fn preview_next_sequence(&self, scope: &str) -> WorkflowResult<String> {
        Ok(self.allocator.preview_next(&self.pool, scope).await?)
    }

    /// Derive the printable QR credential for an approved permit.
    pub async fn derive_credential(&self, permit_id: DbId) -> WorkflowResult<String> {
        let Some(permit) = PermitRepo::find_by_id(&self.pool, permit_id).await? else {
            return Err(WorkflowError::NotFound { id: permit_id });
        };
        let state = permit.workflow_state()?;
        if state.approval != ApprovalStatus::Approved {
            return Err(TransitionError::InvalidTransition {
                event: "issue credential",
                review: state.review,
                approval: state.approval,
            }
            .into());
        }

        let claims = CredentialClaims {
            permit_id: permit.public_id,
            validity_start: permit.validity_start,
            validity_end: permit.validity_end,
        };
        Ok(credential::derive_token(&claims, &self.config.credential_secret))
    }

    /// Verify a scanned credential as of the given calendar date (UTC).
    ///
    /// Standalone: no database access. On success returns the permit's
    /// public identity; callers that want to reject e.g. later-revoked
    /// permits can cross-check live state via
    /// [`PermitService::find_by_public_id`].
    pub fn verify_credential(&self, token: &str, as_of: NaiveDate) -> Result<Uuid, VerifyError> {
        credential::verify_token(token, &self.config.credential_secret, as_of)
    }

    /// Look up a permit by the public identity a credential carries.
    ///
    /// `None` means the credential names a permit this store has never
    /// issued, which can happen when a scanner verifies a token minted by
    /// another deployment sharing the secret.
    pub async fn find_by_public_id(
        &self,
        public_id: Uuid,
    ) -> WorkflowResult<Option<PermitRequest>> {
        Ok(PermitRepo::find_by_public_id(&self.pool, public_id).await?)
    }

    /// Fetch a permit by internal id.
    pub async fn find_by_id(&self, permit_id: DbId) -> WorkflowResult<PermitRequest> {
        PermitRepo::find_by_id(&self.pool, permit_id)
            .await?
            .ok_or(WorkflowError::NotFound { id: permit_id })
    }

    /// Surface document numbers held by more than one permit.
    ///
    /// A non-empty result means the transactional allocation contract was
    /// bypassed by an out-of-band writer. Nothing is repaired here:
    /// renumbering a document that may already be printed is a manual
    /// decision, made per permit via
    /// [`PermitService::repair_duplicate_sequence`].
    pub async fn find_duplicate_sequences(&self) -> WorkflowResult<Vec<DuplicateSequence>> {
        let duplicates = SequenceRepo::find_duplicate_sequences(&self.pool).await?;
        if !duplicates.is_empty() {
            tracing::error!(
                count = duplicates.len(),
                "Duplicate sequence numbers detected; manual repair required"
            );
        }
        Ok(duplicates)
    }

    /// Reassign a fresh number to a later-created holder of a duplicated
    /// document number.
    ///
    /// The earliest-created holder keeps its number, since that is the copy
    /// most likely to be printed and in the field. Repairing a permit that is
    /// not a later-created duplicate holder is rejected.
    pub async fn repair_duplicate_sequence(
        &self,
        permit_id: DbId,
        actor_ref: DbId,
    ) -> WorkflowResult<PermitRequest> {
        // Read the current number up front for the retry scope label; the
        // authoritative re-check happens under the row lock inside the unit.
        let permit = self.find_by_id(permit_id).await?;
        let Some(current) = permit.sequence_number.clone() else {
            return Err(WorkflowError::DuplicateRepairRejected(format!(
                "permit {permit_id} holds no sequence number"
            )));
        };
        let (scope, _) = parse_sequence_number(&current)?;

        let repaired = run_with_retry(&self.config.retry, &scope, || {
            self.repair_once(permit_id, actor_ref, &current, &scope)
        })
        .await?;

        tracing::info!(
            permit_id,
            actor_ref,
            old_sequence = current.as_str(),
            new_sequence = repaired.sequence_number.as_deref().unwrap_or(""),
            "Duplicate sequence number repaired"
        );
        Ok(repaired)
    }

    async fn repair_once(
        &self,
        permit_id: DbId,
        actor_ref: DbId,
        expected_current: &str,
        scope: &str,
    ) -> WorkflowResult<PermitRequest> {
        let mut tx = self.pool.begin().await?;

        let Some(permit) = PermitRepo::lock_for_transition(&mut tx, permit_id).await? else {
            return Err(WorkflowError::NotFound { id: permit_id });
        };
        if permit.sequence_number.as_deref() != Some(expected_current) {
            return Err(WorkflowError::DuplicateRepairRejected(format!(
                "permit {permit_id} no longer holds sequence number {expected_current}"
            )));
        }

        let holders = PermitRepo::find_ids_holding_sequence(&mut tx, expected_current).await?;
        if holders.len() < 2 {
            return Err(WorkflowError::DuplicateRepairRejected(format!(
                "sequence number {expected_current} is not duplicated"
            )));
        }
        if holders.first() == Some(&permit_id) {
            return Err(WorkflowError::DuplicateRepairRejected(format!(
                "permit {permit_id} is the earliest-created holder of {expected_current} \
                 and keeps its number"
            )));
        }

        let new_sequence = self.allocator.allocate_in(&mut tx, scope).await?;
        let updated =
            PermitRepo::replace_sequence_number(&mut tx, permit_id, expected_current, &new_sequence)
                .await?
                .ok_or_else(|| {
                    CoreError::Internal(format!(
                        "sequence repair guard failed under row lock for permit {permit_id}"
                    ))
                })?;
        self.audit(
            &mut tx,
            permit_id,
            Some(actor_ref),
            action_types::SEQUENCE_REPAIR,
            Some(format!("{expected_current} -> {new_sequence}")),
        )
        .await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Append an audit entry inside the caller's transaction.
    async fn audit(
        &self,
        conn: &mut PgConnection,
        permit_id: DbId,
        actor_ref: Option<DbId>,
        action: &str,
        detail: Option<String>,
    ) -> Result<(), sqlx::Error> {
        AuditRepo::insert(
            conn,
            &CreateAuditEntry {
                permit_id,
                actor_ref,
                action: action.to_string(),
                detail,
            },
        )
        .await?;
        Ok(())
    }

    /// Classify a guarded-update miss: the permit either does not exist or
    /// its current state forbids the event. Replays the pure transition
    /// rule against the re-read state so the error names the exact
    /// precondition that failed.
    async fn transition_failure<F>(
        conn: &mut PgConnection,
        permit_id: DbId,
        check: F,
    ) -> WorkflowError
    where
        F: FnOnce(WorkflowState) -> Result<WorkflowState, TransitionError>,
    {
        match PermitRepo::find_by_id_in(conn, permit_id).await {
            Ok(Some(permit)) => match permit.workflow_state() {
                Ok(state) => match check(state) {
                    Err(err) => err.into(),
                    // The guard matched zero rows but the rules allow the
                    // transition: the state changed again between the
                    // update and this re-read.
                    Ok(_) => CoreError::Internal(format!(
                        "transition guard disagreed with workflow rules for permit {permit_id}"
                    ))
                    .into(),
                },
                Err(core) => core.into(),
            },
            Ok(None) => WorkflowError::NotFound { id: permit_id },
            Err(err) => err.into(),
        }
    }
}
