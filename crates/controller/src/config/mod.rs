//! # Configuration
//!
//! Controller settings read from the environment at startup.

pub mod controller;

pub use controller::{parse_kind_list, parse_policy_overrides, ControllerConfig};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Configuration shared between the runtime tasks
pub type SharedControllerConfig = Arc<RwLock<ControllerConfig>>;

/// Load the configuration from the environment into a shared handle
#[must_use]
pub fn create_shared_config() -> SharedControllerConfig {
    Arc::new(RwLock::new(ControllerConfig::from_env()))
}
