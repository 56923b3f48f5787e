//! Sequence counter models.

use gatepass_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `sequence_counters` table: one durable, lockable integer
/// per numbering scope.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SequenceCounter {
    pub scope_key: String,
    pub last_issued: i64,
    pub updated_at: Timestamp,
}

/// A duplicated document number surfaced by the integrity check.
///
/// `permit_ids` is ordered by creation time: the first element is the
/// earliest-created holder, whose number stays stable during repair.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DuplicateSequence {
    pub sequence_number: String,
    pub permit_ids: Vec<DbId>,
}
