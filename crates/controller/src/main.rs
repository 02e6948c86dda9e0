//! # Resource Controller
//!
//! Kubernetes controller that keeps Elasticsearch and Kibana resources in
//! sync with declarative custom resources.
//!
//! One reconciliation loop runs per declared kind. Each loop renders the
//! object's body (optionally parameterized by `ResourceTemplateData`
//! objects), applies it to the target instance, records the outcome in the
//! object's status and removes the external resource when the object is
//! deleted.

use anyhow::Result;
use resource_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.context, init.server_state, init.controller_config).await
}
