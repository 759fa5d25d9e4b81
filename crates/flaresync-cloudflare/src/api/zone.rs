//! Zones

use super::CloudflareApi;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiZone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(rename = "type", default)]
    pub zone_type: String,
    #[serde(default)]
    pub name_servers: Vec<String>,
    #[serde(default)]
    pub vanity_name_servers: Vec<String>,
    #[serde(default)]
    pub account: Option<ZoneAccount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneCreate {
    pub name: String,
    pub account: ZoneAccountRef,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub zone_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneAccountRef {
    pub id: String,
}

/// Partial zone edit; only the set fields are sent
#[derive(Debug, Clone, Default, Serialize)]
pub struct ZoneEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub zone_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vanity_name_servers: Option<Vec<String>>,
}

#[async_trait]
pub trait ZoneApi: Send + Sync {
    async fn get_zone(&self, zone_id: &str) -> Result<ApiZone>;

    async fn create_zone(&self, zone: &ZoneCreate) -> Result<ApiZone>;

    async fn edit_zone(&self, zone_id: &str, edit: &ZoneEdit) -> Result<ApiZone>;

    async fn delete_zone(&self, zone_id: &str) -> Result<()>;
}

#[async_trait]
impl ZoneApi for CloudflareApi {
    async fn get_zone(&self, zone_id: &str) -> Result<ApiZone> {
        self.get(&format!("zones/{}", zone_id)).await
    }

    async fn create_zone(&self, zone: &ZoneCreate) -> Result<ApiZone> {
        self.post("zones", zone).await
    }

    async fn edit_zone(&self, zone_id: &str, edit: &ZoneEdit) -> Result<ApiZone> {
        self.patch(&format!("zones/{}", zone_id), edit).await
    }

    async fn delete_zone(&self, zone_id: &str) -> Result<()> {
        self.delete(&format!("zones/{}", zone_id)).await
    }
}
