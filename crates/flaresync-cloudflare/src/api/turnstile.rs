//! Turnstile widgets

use super::CloudflareApi;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTurnstileWidget {
    pub sitekey: String,
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
    pub mode: String,
    #[serde(default)]
    pub bot_fight_mode: bool,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub modified_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnstileWidgetBody {
    pub name: String,
    pub domains: Vec<String>,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_fight_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[async_trait]
pub trait TurnstileApi: Send + Sync {
    async fn get_widget(&self, account_id: &str, sitekey: &str) -> Result<ApiTurnstileWidget>;

    async fn create_widget(
        &self,
        account_id: &str,
        widget: &TurnstileWidgetBody,
    ) -> Result<ApiTurnstileWidget>;

    async fn update_widget(
        &self,
        account_id: &str,
        sitekey: &str,
        widget: &TurnstileWidgetBody,
    ) -> Result<ApiTurnstileWidget>;

    async fn delete_widget(&self, account_id: &str, sitekey: &str) -> Result<()>;
}

#[async_trait]
impl TurnstileApi for CloudflareApi {
    async fn get_widget(&self, account_id: &str, sitekey: &str) -> Result<ApiTurnstileWidget> {
        self.get(&format!(
            "accounts/{}/challenges/widgets/{}",
            account_id, sitekey
        ))
        .await
    }

    async fn create_widget(
        &self,
        account_id: &str,
        widget: &TurnstileWidgetBody,
    ) -> Result<ApiTurnstileWidget> {
        self.post(&format!("accounts/{}/challenges/widgets", account_id), widget)
            .await
    }

    async fn update_widget(
        &self,
        account_id: &str,
        sitekey: &str,
        widget: &TurnstileWidgetBody,
    ) -> Result<ApiTurnstileWidget> {
        self.put(
            &format!("accounts/{}/challenges/widgets/{}", account_id, sitekey),
            widget,
        )
        .await
    }

    async fn delete_widget(&self, account_id: &str, sitekey: &str) -> Result<()> {
        self.delete(&format!(
            "accounts/{}/challenges/widgets/{}",
            account_id, sitekey
        ))
        .await
    }
}
