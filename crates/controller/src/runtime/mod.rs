//! # Runtime
//!
//! - `initialization` - process setup and the shared runtime context
//! - `watch_loop` - per-kind controllers and their restart loop
//! - `error_policy` - reconciliation and watch stream error handling

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
