//! Permit request models.

use chrono::NaiveDate;
use gatepass_core::error::CoreError;
use gatepass_core::status::{ApprovalStatus, ReviewStatus};
use gatepass_core::types::{DbId, Timestamp};
use gatepass_core::workflow::WorkflowState;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `permit_requests` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PermitRequest {
    pub id: DbId,
    /// Opaque external identity; the only identifier embedded in credentials.
    pub public_id: Uuid,
    pub vendor_ref: DbId,
    pub description: Option<String>,
    pub review_status_id: i16,
    pub approval_status_id: i16,
    /// Formatted document number; non-null exactly when approved.
    pub sequence_number: Option<String>,
    pub validity_start: Option<NaiveDate>,
    pub validity_end: Option<NaiveDate>,
    pub reviewer_ref: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub review_note: Option<String>,
    pub approver_ref: Option<DbId>,
    pub approved_at: Option<Timestamp>,
    pub rejected_at: Option<Timestamp>,
    pub rejection_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PermitRequest {
    /// Decode the status columns into the workflow state pair.
    ///
    /// An unknown status id means the row predates or postdates this build's
    /// seed data; surfaced as an internal error rather than a panic.
    pub fn workflow_state(&self) -> Result<WorkflowState, CoreError> {
        let review = ReviewStatus::from_id(self.review_status_id).ok_or_else(|| {
            CoreError::Internal(format!("unknown review status id {}", self.review_status_id))
        })?;
        let approval = ApprovalStatus::from_id(self.approval_status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "unknown approval status id {}",
                self.approval_status_id
            ))
        })?;
        Ok(WorkflowState { review, approval })
    }
}

/// DTO for creating a new permit request (vendor submission).
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermitRequest {
    pub vendor_ref: DbId,
    pub description: Option<String>,
}

/// Validity window granted at approval time.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ValidityWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}
