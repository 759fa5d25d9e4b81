//! R2 buckets

use super::CloudflareApi;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiR2Bucket {
    pub name: String,
    #[serde(default)]
    pub creation_date: Option<String>,
    /// Location hint chosen at creation; absent means automatic placement
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct R2BucketCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[async_trait]
pub trait R2Api: Send + Sync {
    async fn get_bucket(&self, account_id: &str, name: &str) -> Result<ApiR2Bucket>;

    async fn create_bucket(&self, account_id: &str, bucket: &R2BucketCreate)
    -> Result<ApiR2Bucket>;

    /// Change the default storage class for new objects
    async fn set_bucket_storage_class(
        &self,
        account_id: &str,
        name: &str,
        storage_class: &str,
    ) -> Result<ApiR2Bucket>;

    async fn delete_bucket(&self, account_id: &str, name: &str) -> Result<()>;
}

#[async_trait]
impl R2Api for CloudflareApi {
    async fn get_bucket(&self, account_id: &str, name: &str) -> Result<ApiR2Bucket> {
        self.get(&format!("accounts/{}/r2/buckets/{}", account_id, name))
            .await
    }

    async fn create_bucket(
        &self,
        account_id: &str,
        bucket: &R2BucketCreate,
    ) -> Result<ApiR2Bucket> {
        self.post(&format!("accounts/{}/r2/buckets", account_id), bucket)
            .await
    }

    async fn set_bucket_storage_class(
        &self,
        account_id: &str,
        name: &str,
        storage_class: &str,
    ) -> Result<ApiR2Bucket> {
        self.patch_with_header(
            &format!("accounts/{}/r2/buckets/{}", account_id, name),
            ("cf-r2-storage-class", storage_class),
        )
        .await
    }

    async fn delete_bucket(&self, account_id: &str, name: &str) -> Result<()> {
        self.delete(&format!("accounts/{}/r2/buckets/{}", account_id, name))
            .await
    }
}
