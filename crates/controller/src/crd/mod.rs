//! # Custom Resource Definitions
//!
//! CRD types for the resource controller.
//!
//! ## Module Structure
//!
//! - `common.rs` - Target instance pointer, template references, label selectors
//! - `status.rs` - Status shared by every declared kind
//! - `managed.rs` - `ManagedResource` trait implemented by every declared kind
//! - `elasticsearch.rs` / `kibana.rs` - Declared kinds per service
//! - `instance.rs` - ElasticsearchInstance / KibanaInstance
//! - `template_data.rs` - ResourceTemplateData

mod common;
pub mod elasticsearch;
mod instance;
pub mod kibana;
pub(crate) mod managed;
mod status;
mod template_data;

pub use common::{
    LabelSelector, LabelSelectorRequirement, ReferenceTarget, TargetInstance, TemplateReference,
    TemplateSpec,
};
pub use elasticsearch::{
    ComponentTemplate, ElasticsearchApikey, ElasticsearchRole, ElasticsearchUser,
    IndexLifecyclePolicy, IndexTemplate, IngestPipeline, SnapshotLifecyclePolicy,
    SnapshotRepository,
};
pub use instance::{
    CertificateRef, ElasticsearchInstance, ElasticsearchInstanceSpec, InstanceAuthentication,
    InstanceSettings, KibanaInstance, KibanaInstanceSpec, SecretKeyRef,
};
pub use kibana::{DataView, KibanaRole, SavedObject, SavedObjectType, Space};
pub use managed::{ManagedResource, Service};
pub use status::{
    Condition, ResourceStatus, CONDITION_ERROR, CONDITION_INITIALIZED, CONDITION_READY,
    STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN,
};
pub use template_data::{decode_value, ResourceTemplateData, ResourceTemplateDataSpec};
