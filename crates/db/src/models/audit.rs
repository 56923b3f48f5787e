//! Workflow audit trail models.

use gatepass_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `audit_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEntry {
    pub id: DbId,
    pub permit_id: DbId,
    pub actor_ref: Option<DbId>,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for appending an audit entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuditEntry {
    pub permit_id: DbId,
    pub actor_ref: Option<DbId>,
    pub action: String,
    pub detail: Option<String>,
}
