//! Zone bot management settings (one per zone, never created or deleted)

use super::CloudflareApi;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiBotManagement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_js: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fight_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_bots_protection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbfm_definitely_automated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbfm_likely_automated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbfm_verified_bots: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbfm_static_resource_protection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize_wordpress: Option<bool>,
    /// Read-only
    #[serde(default, skip_serializing)]
    pub using_latest_model: Option<bool>,
}

#[async_trait]
pub trait BotManagementApi: Send + Sync {
    async fn get_bot_management(&self, zone_id: &str) -> Result<ApiBotManagement>;

    async fn update_bot_management(
        &self,
        zone_id: &str,
        settings: &ApiBotManagement,
    ) -> Result<ApiBotManagement>;
}

#[async_trait]
impl BotManagementApi for CloudflareApi {
    async fn get_bot_management(&self, zone_id: &str) -> Result<ApiBotManagement> {
        self.get(&format!("zones/{}/bot_management", zone_id)).await
    }

    async fn update_bot_management(
        &self,
        zone_id: &str,
        settings: &ApiBotManagement,
    ) -> Result<ApiBotManagement> {
        self.put(&format!("zones/{}/bot_management", zone_id), settings)
            .await
    }
}
