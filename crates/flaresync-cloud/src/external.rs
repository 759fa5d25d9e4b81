//! External client abstraction
//!
//! Every resource kind (DNS record, ruleset, R2 bucket, ...) plugs into the
//! generic reconciler through these traits instead of duplicating the
//! observe / create / update / delete control flow.

use crate::error::Result;
use crate::managed::ManagedResource;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Static description of one resource kind
pub trait ResourceKind: Send + Sync + 'static {
    /// Kind name used in manifests, logs and state files (e.g. "DnsRecord")
    const KIND: &'static str;

    /// `true` when a repeated create with the same params cannot produce a
    /// second remote entity (name-addressed kinds). Kinds with remote-assigned
    /// IDs refuse to create again after an interrupted create.
    const IDEMPOTENT_CREATE: bool = false;

    /// Desired state (`spec.forProvider`)
    type Params: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Projection of the remote entity (`status.atProvider`)
    type Observation: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// Managed resource of a given kind
pub type Managed<K> =
    ManagedResource<<K as ResourceKind>::Params, <K as ResourceKind>::Observation>;

/// Result of a successful remote create
#[derive(Debug, Clone)]
pub struct Creation<O> {
    /// Remote-assigned ID, or the desired name for name-addressed kinds
    pub external_name: String,
    pub observation: O,
}

/// Result of the observe step of one reconcile pass
#[derive(Debug, Clone)]
pub struct ExternalObservation<O> {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
    pub observation: Option<O>,
}

impl<O> ExternalObservation<O> {
    pub fn absent() -> Self {
        Self {
            resource_exists: false,
            resource_up_to_date: false,
            observation: None,
        }
    }

    pub fn present(observation: O, up_to_date: bool) -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            observation: Some(observation),
        }
    }
}

/// Per-kind capability set against the remote API
///
/// Implementations must:
/// - validate scope and convert fields before issuing any remote call
/// - report a missing remote entity from `observe` as a not-found
///   [`CloudError::Remote`](crate::CloudError::Remote)
/// - treat not-found as success in `delete`
/// - never retry internally
#[async_trait]
pub trait ExternalClient<K: ResourceKind>: Send + Sync {
    /// Read the remote entity identified by `external_name`
    async fn observe(&self, external_name: &str, params: &K::Params) -> Result<K::Observation>;

    /// Issue exactly one remote create call
    async fn create(&self, params: &K::Params) -> Result<Creation<K::Observation>>;

    /// Converge the remote entity to `params`
    async fn update(&self, external_name: &str, params: &K::Params) -> Result<K::Observation>;

    /// Remove the remote entity. Already absent is not an error.
    async fn delete(&self, external_name: &str, params: &K::Params) -> Result<()>;

    /// `true` when every set desired field equals its observed counterpart
    fn is_up_to_date(&self, params: &K::Params, observed: &K::Observation) -> Result<bool>;
}

/// Builds an [`ExternalClient`] for one managed resource
///
/// Connectors resolve provider configuration and credentials. They may keep
/// HTTP clients and read-through caches between calls.
#[async_trait]
pub trait Connector<K: ResourceKind>: Send + Sync {
    async fn connect(&self, resource: &Managed<K>) -> Result<Box<dyn ExternalClient<K>>>;
}
