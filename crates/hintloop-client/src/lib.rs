//! HintLoop backend client
//!
//! Typed REST client for the orchestration backend plus the poll driver
//! that resolves in-flight hint requests into the session state machine.

pub mod client;
pub mod driver;
pub mod types;

pub use client::{ApiFailure, ErrorHook, HintClient};
pub use driver::{drive_to_resolution, poll_pending_once};
pub use types::{ExecutionResult, HintStatusResponse, InstructorAssignment, ProgrammingProblem};
