//! Repository for the `audit_log` table.

use sqlx::{PgConnection, PgPool};

use gatepass_core::types::DbId;

use crate::models::audit::{AuditEntry, CreateAuditEntry};

/// Column list for audit_log queries.
const COLUMNS: &str = "id, permit_id, actor_ref, action, detail, created_at";

/// Provides append/read operations for the workflow audit trail.
pub struct AuditRepo;

impl AuditRepo {
    /// Append an audit entry inside the caller's transaction.
    ///
    /// Transitions write their audit entry in the same transaction as the
    /// state change, so the trail cannot disagree with the permit row.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &CreateAuditEntry,
    ) -> Result<AuditEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_log (permit_id, actor_ref, action, detail)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditEntry>(&query)
            .bind(input.permit_id)
            .bind(input.actor_ref)
            .bind(&input.action)
            .bind(&input.detail)
            .fetch_one(&mut *conn)
            .await
    }

    /// List the audit trail for a permit, oldest first.
    pub async fn list_for_permit(
        pool: &PgPool,
        permit_id: DbId,
    ) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_log
             WHERE permit_id = $1
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, AuditEntry>(&query)
            .bind(permit_id)
            .fetch_all(pool)
            .await
    }
}
