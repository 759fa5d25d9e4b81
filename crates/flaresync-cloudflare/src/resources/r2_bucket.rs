//! R2 buckets
//!
//! Buckets are addressed by name, so a repeated create cannot produce a
//! second bucket and the external name is the desired name.

use crate::api::{ApiR2Bucket, R2Api, R2BucketCreate};
use crate::connector::Profile;
use crate::error::ResultExt;
use crate::resources::ignore_not_found;
use async_trait::async_trait;
use flaresync_cloud::{CloudError, Creation, ExternalClient, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Location reported for buckets created without a hint
pub const AUTO_LOCATION: &str = "auto";

pub struct R2Bucket;

impl ResourceKind for R2Bucket {
    const KIND: &'static str = "R2Bucket";
    const IDEMPOTENT_CREATE: bool = true;
    type Params = R2BucketParams;
    type Observation = R2BucketObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R2BucketParams {
    pub name: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,

    /// Location hint (wnam, enam, weur, eeur, apac, oc) or "auto"
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub location: Field<String>,

    /// "Standard" or "InfrequentAccess"
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub storage_class: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R2BucketObservation {
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

pub fn generate_observation(bucket: &ApiR2Bucket) -> R2BucketObservation {
    R2BucketObservation {
        name: bucket.name.clone(),
        location: bucket
            .location
            .as_deref()
            .filter(|l| !l.is_empty())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| AUTO_LOCATION.to_string()),
        storage_class: bucket.storage_class.clone(),
        creation_date: bucket.creation_date.clone(),
    }
}

fn immutable(field: &str, desired: &str, observed: &str) -> CloudError {
    CloudError::ImmutableField {
        field: field.to_string(),
        desired: desired.to_string(),
        observed: observed.to_string(),
    }
}

pub fn is_up_to_date(params: &R2BucketParams, observed: &R2BucketObservation) -> Result<bool> {
    if params.name != observed.name {
        return Err(immutable("name", &params.name, &observed.name));
    }
    if let Field::Set(location) = &params.location {
        if !location.eq_ignore_ascii_case(&observed.location) {
            return Err(immutable("location", location, &observed.location));
        }
    }
    Ok(params
        .storage_class
        .matches_with(|desired| observed.storage_class.as_deref() == Some(desired.as_str())))
}

pub struct R2BucketClient {
    profile: Arc<Profile>,
}

impl R2BucketClient {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }

    async fn account(&self, params: &R2BucketParams) -> Result<String> {
        if params.name.is_empty() {
            return Err(CloudError::InvalidConfig("bucket name is required".to_string()));
        }
        self.profile.resolve_account(&params.account_id).await
    }
}

#[async_trait]
impl ExternalClient<R2Bucket> for R2BucketClient {
    async fn observe(&self, external_name: &str, params: &R2BucketParams) -> Result<R2BucketObservation> {
        let account = self.account(params).await?;
        let bucket = self
            .profile
            .api
            .get_bucket(&account, external_name)
            .await
            .context("cannot get r2 bucket")?;
        Ok(generate_observation(&bucket))
    }

    async fn create(&self, params: &R2BucketParams) -> Result<Creation<R2BucketObservation>> {
        let account = self.account(params).await?;
        let request = R2BucketCreate {
            name: params.name.clone(),
            location_hint: params
                .location
                .get()
                .filter(|l| !l.eq_ignore_ascii_case(AUTO_LOCATION))
                .cloned(),
            storage_class: params.storage_class.get().cloned(),
        };
        let bucket = self
            .profile
            .api
            .create_bucket(&account, &request)
            .await
            .context("cannot create r2 bucket")?;
        Ok(Creation {
            external_name: params.name.clone(),
            observation: generate_observation(&bucket),
        })
    }

    async fn update(&self, external_name: &str, params: &R2BucketParams) -> Result<R2BucketObservation> {
        let account = self.account(params).await?;
        let bucket = match params.storage_class.get() {
            Some(storage_class) => self
                .profile
                .api
                .set_bucket_storage_class(&account, external_name, storage_class)
                .await
                .context("cannot update r2 bucket")?,
            None => self
                .profile
                .api
                .get_bucket(&account, external_name)
                .await
                .context("cannot get r2 bucket")?,
        };
        Ok(generate_observation(&bucket))
    }

    async fn delete(&self, external_name: &str, params: &R2BucketParams) -> Result<()> {
        let account = self.account(params).await?;
        ignore_not_found(
            self.profile
                .api
                .delete_bucket(&account, external_name)
                .await
                .context("cannot delete r2 bucket"),
        )
    }

    fn is_up_to_date(&self, params: &R2BucketParams, observed: &R2BucketObservation) -> Result<bool> {
        is_up_to_date(params, observed)
    }
}

connector!(R2Bucket => R2BucketClient);
