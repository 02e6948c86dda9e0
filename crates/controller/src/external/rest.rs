//! # REST Scheme
//!
//! Most kinds are addressed by name and follow one of a few REST shapes.
//! `RestResource` captures a shape as a table of paths and verbs instead of a
//! hand-written client per kind.

use crate::crd::ManagedResource;
use crate::external::{Created, ExternalError, ExternalResource, HttpMethod, ServiceClient};
use async_trait::async_trait;
use serde_json::Value;

type PathFn<K> = fn(&K, &str) -> String;

/// Which call a body is being prepared for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

type PrepareFn<K> = fn(&K, &str, Operation, &Value) -> Value;

/// A verb and path pair
pub struct Endpoint<K> {
    pub method: HttpMethod,
    pub path: PathFn<K>,
}

impl<K> Clone for Endpoint<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Endpoint<K> {}

/// Table-driven client for a name-addressed kind
pub struct RestResource<K> {
    kind: &'static str,
    read: PathFn<K>,
    create: Endpoint<K>,
    update: Endpoint<K>,
    delete: PathFn<K>,
    prepare: PrepareFn<K>,
}

impl<K> std::fmt::Debug for RestResource<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestResource")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn unchanged<K>(_: &K, _: &str, _: Operation, body: &Value) -> Value {
    body.clone()
}

impl<K: ManagedResource> RestResource<K> {
    /// Resource read, written (PUT) and deleted at the same path
    #[must_use]
    pub fn put_by_name(kind: &'static str, path: PathFn<K>) -> Self {
        Self {
            kind,
            read: path,
            create: Endpoint {
                method: HttpMethod::Put,
                path,
            },
            update: Endpoint {
                method: HttpMethod::Put,
                path,
            },
            delete: path,
            prepare: unchanged,
        }
    }

    /// Resource with distinct create and update endpoints
    #[must_use]
    pub fn with_endpoints(
        kind: &'static str,
        item: PathFn<K>,
        create: Endpoint<K>,
        update: Endpoint<K>,
    ) -> Self {
        Self {
            kind,
            read: item,
            create,
            update,
            delete: item,
            prepare: unchanged,
        }
    }

    /// Transform the rendered body before it is sent
    #[must_use]
    pub fn preparing(mut self, prepare: PrepareFn<K>) -> Self {
        self.prepare = prepare;
        self
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Path a create call for `obj` is sent to
    #[must_use]
    pub fn create_path(&self, obj: &K, id: &str) -> String {
        (self.create.path)(obj, id)
    }

    /// Body sent for `operation`
    #[must_use]
    pub fn prepared_body(&self, obj: &K, id: &str, operation: Operation, body: &Value) -> Value {
        (self.prepare)(obj, id, operation, body)
    }
}

#[async_trait]
impl<K: ManagedResource> ExternalResource<K> for RestResource<K> {
    async fn exists(
        &self,
        client: &ServiceClient,
        obj: &K,
        id: &str,
    ) -> Result<bool, ExternalError> {
        match client.request(HttpMethod::Get, &(self.read)(obj, id), None).await {
            Ok(_) => Ok(true),
            Err(ExternalError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        client: &ServiceClient,
        obj: &K,
        body: &Value,
    ) -> Result<Created, ExternalError> {
        let id = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| ExternalError::Configuration("object has no name".to_string()))?;
        let body = (self.prepare)(obj, &id, Operation::Create, body);
        let raw = client
            .request(self.create.method, &(self.create.path)(obj, &id), Some(&body))
            .await?;
        Ok(Created {
            external_id: id,
            raw,
        })
    }

    async fn update(
        &self,
        client: &ServiceClient,
        obj: &K,
        id: &str,
        body: &Value,
    ) -> Result<(), ExternalError> {
        let body = (self.prepare)(obj, id, Operation::Update, body);
        client
            .request(self.update.method, &(self.update.path)(obj, id), Some(&body))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        client: &ServiceClient,
        obj: &K,
        id: &str,
    ) -> Result<(), ExternalError> {
        client
            .request(HttpMethod::Delete, &(self.delete)(obj, id), None)
            .await?;
        Ok(())
    }
}
