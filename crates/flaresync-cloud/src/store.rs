//! Managed resource store boundary
//!
//! The reconciler only ever reads objects, writes status, and adds
//! annotations. Spec writes go through [`SpecWriter`], which is used by
//! whoever declares desired state (the CLI, tests), never by the loop.

use crate::error::{CloudError, Result};
use crate::external::{Managed, ResourceKind};
use crate::managed::ResourceStatus;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ResourceStore<K: ResourceKind>: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Managed<K>>>;

    async fn list(&self) -> Result<Vec<Managed<K>>>;

    /// Replace the status sub-resource
    async fn update_status(&self, name: &str, status: ResourceStatus<K::Observation>)
    -> Result<()>;

    /// Merge annotations into the object's metadata
    async fn set_annotations(&self, name: &str, annotations: BTreeMap<String, String>)
    -> Result<()>;

    /// Forget the object (after a successful delete)
    async fn remove(&self, name: &str) -> Result<()>;
}

/// Desired-state writes, kept apart from [`ResourceStore`]
#[async_trait]
pub trait SpecWriter<K: ResourceKind>: Send + Sync {
    /// Insert or replace the object's spec. Status and existing annotations
    /// are kept; the generation is bumped when the spec changed.
    async fn apply(&self, resource: Managed<K>) -> Result<()>;

    /// Record deletion intent. Returns `false` if the object does not exist.
    async fn request_deletion(&self, name: &str) -> Result<bool>;
}

/// Merge an incoming manifest into the stored object. Shared by the store
/// implementations so they agree on generation semantics.
pub(crate) fn merge_applied<K: ResourceKind>(
    existing: Option<Managed<K>>,
    mut incoming: Managed<K>,
) -> Result<Managed<K>> {
    let Some(existing) = existing else {
        incoming.metadata.generation = incoming.metadata.generation.max(1);
        incoming.status = ResourceStatus::default();
        return Ok(incoming);
    };

    let spec_changed =
        serde_json::to_value(&existing.spec)? != serde_json::to_value(&incoming.spec)?;

    let mut annotations = existing.metadata.annotations;
    annotations.extend(incoming.metadata.annotations);

    incoming.metadata.annotations = annotations;
    incoming.metadata.generation = if spec_changed {
        existing.metadata.generation + 1
    } else {
        existing.metadata.generation
    };
    incoming.metadata.deletion_timestamp = existing.metadata.deletion_timestamp;
    incoming.status = existing.status;
    Ok(incoming)
}

/// In-memory store, mainly for tests and embedding
pub struct MemoryStore<K: ResourceKind> {
    objects: RwLock<BTreeMap<String, Managed<K>>>,
}

impl<K: ResourceKind> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: ResourceKind> MemoryStore<K> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<K: ResourceKind> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, name: &str) -> Result<Option<Managed<K>>> {
        Ok(self.objects.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Managed<K>>> {
        Ok(self.objects.read().await.values().cloned().collect())
    }

    async fn update_status(
        &self,
        name: &str,
        status: ResourceStatus<K::Observation>,
    ) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(name)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("{}/{}", K::KIND, name)))?;
        object.status = status;
        Ok(())
    }

    async fn set_annotations(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
    ) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(name)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("{}/{}", K::KIND, name)))?;
        object.metadata.annotations.extend(annotations);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.objects.write().await.remove(name);
        Ok(())
    }
}

#[async_trait]
impl<K: ResourceKind> SpecWriter<K> for MemoryStore<K> {
    async fn apply(&self, resource: Managed<K>) -> Result<()> {
        let mut objects = self.objects.write().await;
        let name = resource.metadata.name.clone();
        let merged = merge_applied::<K>(objects.remove(&name), resource)?;
        objects.insert(name, merged);
        Ok(())
    }

    async fn request_deletion(&self, name: &str) -> Result<bool> {
        let mut objects = self.objects.write().await;
        match objects.get_mut(name) {
            Some(object) => {
                object
                    .metadata
                    .deletion_timestamp
                    .get_or_insert_with(Utc::now);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
