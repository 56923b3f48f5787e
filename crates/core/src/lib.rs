//! Pure domain logic for the gatepass permit workflow.
//!
//! This crate has no internal dependencies and no I/O: it defines the permit
//! status enums, the workflow transition table, the document-number format,
//! and the signed QR credential. The `db` and `workflow` crates build on it.

pub mod audit;
pub mod credential;
pub mod error;
pub mod sequence;
pub mod status;
pub mod types;
pub mod workflow;
