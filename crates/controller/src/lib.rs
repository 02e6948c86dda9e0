//! Resource Controller Library
//!
//! Keeps Elasticsearch and Kibana resources (roles, users, API keys, index
//! templates, lifecycle policies, pipelines, spaces, saved objects, data
//! views) in sync with declarative custom resources.
//!
//! ## Quick Start
//!
//! ```rust
//! use resource_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod external;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod store;
pub mod template;
