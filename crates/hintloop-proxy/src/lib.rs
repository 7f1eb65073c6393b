//! HintLoop notebook proxy
//!
//! Local HTTP server that exposes the `/hintbot` routes notebook frontends
//! expect and forwards them to the orchestration backend, holding the
//! student identity server-side.

pub mod api;

pub use api::{create_router, AppState, ErrorResponse};
