//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use resource_controller::prelude::*;
//! ```

// CRD types - most commonly used
pub use crate::crd::*;

// Reconciliation engine
pub use crate::controller::indexer::{DependencyIndex, KindFilter, KindRegistry};
pub use crate::controller::reconciler::{reconcile, Engine, EngineConfig, EngineError, Phase};

// Stores and external clients
pub use crate::external::{
    ExternalError, ExternalResource, InstanceResolver, RecoveryStrategy, ServiceClient,
    UnresolvedIdentityPolicy,
};
pub use crate::store::{DeclaredObjectStore, ObjectStore, SecretStore, StoreError};

// Templates
pub use crate::template::{BodyRenderer, NamespacePolicy, ReferenceResolver};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, SharedControllerConfig};
