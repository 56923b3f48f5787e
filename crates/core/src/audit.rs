//! Audit action constants.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the repository and service layers.

/// Known action types for permit audit log entries.
pub mod action_types {
    pub const SUBMIT: &str = "submit";
    pub const REVIEW_PASS: &str = "review_pass";
    pub const REVIEW_FAIL: &str = "review_fail";
    pub const RESUBMIT: &str = "resubmit";
    pub const APPROVE: &str = "approve";
    pub const REJECT: &str = "reject";
    pub const SEQUENCE_REPAIR: &str = "sequence_repair";
}
