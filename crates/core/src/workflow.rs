//! Permit workflow transition table.
//!
//! Pure functions shared by the repository and service layers: each takes the
//! current `(review, approval)` status pair and returns the successor pair or
//! [`TransitionError::InvalidTransition`]. Side effects (timestamps, actor
//! references, sequence allocation) belong to the callers; the rules here
//! only decide whether a transition is legal.
//!
//! The two axes are deliberately asymmetric: a failed review is correctable
//! by the vendor through `resubmit`, while an approver's rejection is final
//! and requires a brand-new permit request.

use crate::status::{ApprovalStatus, ReviewStatus};

/// The `(review, approval)` status pair of a permit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowState {
    pub review: ReviewStatus,
    pub approval: ApprovalStatus,
}

impl WorkflowState {
    /// State of a freshly submitted permit request.
    pub fn initial() -> Self {
        Self {
            review: ReviewStatus::PendingReview,
            approval: ApprovalStatus::PendingApproval,
        }
    }
}

/// Outcome of a reviewer's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Documents meet the requirements.
    Pass,
    /// Documents do not meet the requirements.
    Fail,
}

impl ReviewOutcome {
    /// Audit/logging label for this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewOutcome::Pass => "pass",
            ReviewOutcome::Fail => "fail",
        }
    }
}

/// A workflow precondition was violated. Always a caller error; never
/// retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {event}: permit is {} / {}", .review.label(), .approval.label())]
    InvalidTransition {
        /// The attempted event (`"review"`, `"resubmit"`, `"approve"`, `"reject"`).
        event: &'static str,
        review: ReviewStatus,
        approval: ApprovalStatus,
    },
}

fn invalid(event: &'static str, state: WorkflowState) -> TransitionError {
    TransitionError::InvalidTransition {
        event,
        review: state.review,
        approval: state.approval,
    }
}

/// `review(outcome)`: only a permit awaiting review may be reviewed.
///
/// Review decisions are immutable once made; reviewing an already-reviewed
/// permit fails rather than silently overwriting the earlier decision. The
/// only way back to `PendingReview` is [`apply_resubmit`].
pub fn apply_review(
    state: WorkflowState,
    outcome: ReviewOutcome,
) -> Result<WorkflowState, TransitionError> {
    if state.review != ReviewStatus::PendingReview
        || state.approval != ApprovalStatus::PendingApproval
    {
        return Err(invalid("review", state));
    }
    let review = match outcome {
        ReviewOutcome::Pass => ReviewStatus::MeetsRequirements,
        ReviewOutcome::Fail => ReviewStatus::NotMeetsRequirements,
    };
    Ok(WorkflowState { review, ..state })
}

/// `resubmit()`: only a review-failed permit returns to `PendingReview`.
///
/// Callers must clear the prior reviewer reference, timestamp, and note so
/// the next reviewer sees a fresh record instead of stale reasoning.
pub fn apply_resubmit(state: WorkflowState) -> Result<WorkflowState, TransitionError> {
    if state.review != ReviewStatus::NotMeetsRequirements
        || state.approval != ApprovalStatus::PendingApproval
    {
        return Err(invalid("resubmit", state));
    }
    Ok(WorkflowState {
        review: ReviewStatus::PendingReview,
        ..state
    })
}

/// `approve()`: requires a passed review and a pending approval.
///
/// The caller must allocate and attach the sequence number in the same
/// transaction that persists this state flip.
pub fn apply_approve(state: WorkflowState) -> Result<WorkflowState, TransitionError> {
    if state.review != ReviewStatus::MeetsRequirements
        || state.approval != ApprovalStatus::PendingApproval
    {
        return Err(invalid("approve", state));
    }
    Ok(WorkflowState {
        approval: ApprovalStatus::Approved,
        ..state
    })
}

/// `reject()`: any not-yet-decided permit may be rejected, whatever its
/// review status. No sequence number is allocated. Terminal.
pub fn apply_reject(state: WorkflowState) -> Result<WorkflowState, TransitionError> {
    if state.approval != ApprovalStatus::PendingApproval {
        return Err(invalid("reject", state));
    }
    if state.review == ReviewStatus::PendingReview {
        // An approver cannot pre-empt the reviewer: rejection requires a
        // completed review on record.
        return Err(invalid("reject", state));
    }
    Ok(WorkflowState {
        approval: ApprovalStatus::Rejected,
        ..state
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApprovalStatus::*;
    use ReviewStatus::*;

    fn state(review: ReviewStatus, approval: ApprovalStatus) -> WorkflowState {
        WorkflowState { review, approval }
    }

    /// Every (review, approval) combination the database can hold.
    fn all_states() -> Vec<WorkflowState> {
        let mut out = Vec::new();
        for review in [PendingReview, MeetsRequirements, NotMeetsRequirements] {
            for approval in [PendingApproval, Approved, Rejected] {
                out.push(state(review, approval));
            }
        }
        out
    }

    #[test]
    fn initial_state_is_pending_pending() {
        let s = WorkflowState::initial();
        assert_eq!(s.review, PendingReview);
        assert_eq!(s.approval, PendingApproval);
    }

    #[test]
    fn review_pass_from_initial() {
        let next = apply_review(WorkflowState::initial(), ReviewOutcome::Pass).unwrap();
        assert_eq!(next, state(MeetsRequirements, PendingApproval));
    }

    #[test]
    fn review_fail_from_initial() {
        let next = apply_review(WorkflowState::initial(), ReviewOutcome::Fail).unwrap();
        assert_eq!(next, state(NotMeetsRequirements, PendingApproval));
    }

    #[test]
    fn review_is_immutable_once_made() {
        // Re-reviewing an already-reviewed permit must fail, not overwrite.
        for reviewed in [MeetsRequirements, NotMeetsRequirements] {
            let s = state(reviewed, PendingApproval);
            assert!(apply_review(s, ReviewOutcome::Pass).is_err());
            assert!(apply_review(s, ReviewOutcome::Fail).is_err());
        }
    }

    #[test]
    fn resubmit_only_after_failed_review() {
        let next = apply_resubmit(state(NotMeetsRequirements, PendingApproval)).unwrap();
        assert_eq!(next, state(PendingReview, PendingApproval));

        assert!(apply_resubmit(state(PendingReview, PendingApproval)).is_err());
        assert!(apply_resubmit(state(MeetsRequirements, PendingApproval)).is_err());
    }

    #[test]
    fn rejected_permit_is_not_resubmittable() {
        // Approval rejection is final; only review failure is correctable.
        assert!(apply_resubmit(state(NotMeetsRequirements, Rejected)).is_err());
        assert!(apply_resubmit(state(MeetsRequirements, Rejected)).is_err());
    }

    #[test]
    fn approve_requires_passed_review() {
        let next = apply_approve(state(MeetsRequirements, PendingApproval)).unwrap();
        assert_eq!(next, state(MeetsRequirements, Approved));

        assert!(apply_approve(state(PendingReview, PendingApproval)).is_err());
        assert!(apply_approve(state(NotMeetsRequirements, PendingApproval)).is_err());
    }

    #[test]
    fn approve_is_not_repeatable() {
        assert!(apply_approve(state(MeetsRequirements, Approved)).is_err());
    }

    #[test]
    fn reject_from_either_reviewed_state() {
        for review in [MeetsRequirements, NotMeetsRequirements] {
            let next = apply_reject(state(review, PendingApproval)).unwrap();
            assert_eq!(next, state(review, Rejected));
        }
    }

    #[test]
    fn reject_requires_a_completed_review() {
        assert!(apply_reject(state(PendingReview, PendingApproval)).is_err());
    }

    #[test]
    fn terminal_states_accept_no_events() {
        for s in all_states() {
            if s.approval == PendingApproval {
                continue;
            }
            assert!(apply_review(s, ReviewOutcome::Pass).is_err());
            assert!(apply_review(s, ReviewOutcome::Fail).is_err());
            assert!(apply_resubmit(s).is_err());
            assert!(apply_approve(s).is_err());
            assert!(apply_reject(s).is_err());
        }
    }

    #[test]
    fn invalid_transition_message_names_the_event() {
        let err = apply_approve(state(PendingReview, PendingApproval)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("approve"), "message should name the event: {msg}");
        assert!(msg.contains("pending_review"), "message should name the state: {msg}");
    }
}
