//! YAML manifests and the state directory they are applied to
//!
//! A manifest file holds one or more documents:
//!
//! ```yaml
//! kind: DnsRecord
//! metadata:
//!   name: www
//! spec:
//!   forProvider:
//!     zoneId: 023e105f4ecef8ad9ca31a8372d0c353
//!     name: www
//!     type: A
//!     content: 192.0.2.10
//!     proxied: true
//!   providerConfigRef: production
//!   deletionPolicy: Delete
//! ---
//! kind: R2Bucket
//! metadata:
//!   name: assets
//! spec:
//!   forProvider:
//!     name: assets
//! ```

use crate::resources::{
    BotManagement, CacheRule, DnsRecord, R2Bucket, RateLimitRule, Ruleset, TransformRule,
    TurnstileWidget, Zone,
};
use flaresync_cloud::identity::external_name;
use flaresync_cloud::{
    CloudError, Condition, ConditionType, FileStore, Managed, ManagedResource, ObjectMeta,
    ResourceKind, ResourceSpec, ResourceStatus, ResourceStore, Result, SpecWriter,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// Run `$f::<Kind>(args).await` for the kind named `$kind`
macro_rules! dispatch {
    ($kind:expr, $f:ident($($arg:expr),*)) => {
        match $kind {
            k if k == Zone::KIND => $f::<Zone>($($arg),*).await,
            k if k == DnsRecord::KIND => $f::<DnsRecord>($($arg),*).await,
            k if k == R2Bucket::KIND => $f::<R2Bucket>($($arg),*).await,
            k if k == TurnstileWidget::KIND => $f::<TurnstileWidget>($($arg),*).await,
            k if k == BotManagement::KIND => $f::<BotManagement>($($arg),*).await,
            k if k == Ruleset::KIND => $f::<Ruleset>($($arg),*).await,
            k if k == TransformRule::KIND => $f::<TransformRule>($($arg),*).await,
            k if k == CacheRule::KIND => $f::<CacheRule>($($arg),*).await,
            k if k == RateLimitRule::KIND => $f::<RateLimitRule>($($arg),*).await,
            other => Err(CloudError::InvalidConfig(format!("unknown kind '{}'", other))),
        }
    };
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestMeta {
    name: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "P: DeserializeOwned"))]
struct Document<P> {
    metadata: ManifestMeta,
    spec: ResourceSpec<P>,
}

/// One document of a manifest file, not yet typed
pub struct RawDocument {
    pub kind: String,
    pub name: String,
    value: serde_yaml::Value,
    origin: String,
}

/// A document written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub kind: String,
    pub name: String,
}

/// Split a multi-document YAML file. `origin` names the source in errors.
pub fn parse_documents(content: &str, origin: &str) -> Result<Vec<RawDocument>> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let origin = format!("{} (document {})", origin, index + 1);
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| CloudError::InvalidConfig(format!("{}: {}", origin, e)))?;
        if value.is_null() {
            continue;
        }

        let header: Header = serde_yaml::from_value(value.clone())
            .map_err(|e| CloudError::InvalidConfig(format!("{}: {}", origin, e)))?;
        let name = value
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CloudError::InvalidConfig(format!("{}: metadata.name is required", origin)))?
            .to_string();

        documents.push(RawDocument {
            kind: header.kind,
            name,
            value,
            origin,
        });
    }
    Ok(documents)
}

fn decode<K: ResourceKind>(document: &RawDocument) -> Result<Managed<K>> {
    let parsed: Document<K::Params> = serde_yaml::from_value(document.value.clone())
        .map_err(|e| CloudError::InvalidConfig(format!("{}: {}", document.origin, e)))?;
    Ok(ManagedResource {
        metadata: ObjectMeta {
            annotations: parsed.metadata.annotations,
            labels: parsed.metadata.labels,
            ..ObjectMeta::new(parsed.metadata.name)
        },
        spec: parsed.spec,
        status: ResourceStatus::default(),
    })
}

async fn validate_one<K: ResourceKind>(document: &RawDocument) -> Result<()> {
    decode::<K>(document).map(|_| ())
}

async fn apply_one<K: ResourceKind>(project_root: &Path, document: &RawDocument) -> Result<()> {
    let resource = decode::<K>(document)?;
    FileStore::<K>::new(project_root).apply(resource).await
}

/// Check every document, then write them all. Nothing is written when any
/// document is invalid.
pub async fn apply_manifests(project_root: &Path, content: &str, origin: &str) -> Result<Vec<Applied>> {
    let documents = parse_documents(content, origin)?;
    for document in &documents {
        dispatch!(document.kind.as_str(), validate_one(document))?;
    }

    let mut applied = Vec::with_capacity(documents.len());
    for document in &documents {
        dispatch!(document.kind.as_str(), apply_one(project_root, document))?;
        tracing::info!(kind = %document.kind, name = %document.name, "Applied manifest");
        applied.push(Applied {
            kind: document.kind.clone(),
            name: document.name.clone(),
        });
    }
    Ok(applied)
}

async fn request_deletion_of<K: ResourceKind>(project_root: &Path, name: &str) -> Result<bool> {
    FileStore::<K>::new(project_root).request_deletion(name).await
}

/// Mark `kind/name` for deletion. `false` when no such resource is stored.
pub async fn request_deletion(project_root: &Path, kind: &str, name: &str) -> Result<bool> {
    dispatch!(kind, request_deletion_of(project_root, name))
}

/// One line of `flaresync status`
#[derive(Debug, Clone)]
pub struct StatusRow {
    pub kind: &'static str,
    pub name: String,
    pub external_name: Option<String>,
    pub generation: i64,
    pub observed_generation: Option<i64>,
    pub deleting: bool,
    pub ready: Option<Condition>,
    pub synced: Option<Condition>,
}

impl StatusRow {
    fn from_resource<K: ResourceKind>(resource: &Managed<K>) -> Self {
        Self {
            kind: K::KIND,
            name: resource.name().to_string(),
            external_name: external_name(&resource.metadata).map(str::to_string),
            generation: resource.metadata.generation,
            observed_generation: resource.status.observed_generation,
            deleting: resource.metadata.is_being_deleted(),
            ready: resource.status.condition(ConditionType::Ready).cloned(),
            synced: resource.status.condition(ConditionType::Synced).cloned(),
        }
    }
}

async fn status_of<K: ResourceKind>(project_root: &Path) -> Result<Vec<StatusRow>> {
    let resources = FileStore::<K>::new(project_root).list().await?;
    Ok(resources.iter().map(StatusRow::from_resource::<K>).collect())
}

/// Status of every stored resource, grouped by kind
pub async fn status(project_root: &Path) -> Result<Vec<StatusRow>> {
    let mut rows = Vec::new();
    for kind in crate::setup::KINDS {
        rows.extend(dispatch!(kind, status_of(project_root))?);
    }
    Ok(rows)
}
