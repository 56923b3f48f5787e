//! Orchestration layer for the gatepass permit workflow.
//!
//! [`PermitService`] is the inbound API an HTTP layer calls: it drives the
//! workflow state machine over the repository layer, allocates document
//! numbers through the retrying [`allocator`], and issues/verifies QR
//! credentials. Every state change and its audit entry commit in one
//! transaction.

pub mod allocator;
pub mod config;
pub mod error;
pub mod service;

pub use config::WorkflowConfig;
pub use error::{WorkflowError, WorkflowResult};
pub use service::PermitService;
