//! Accounts

use super::CloudflareApi;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Accounts visible to the API token
    async fn list_accounts(&self) -> Result<Vec<ApiAccount>>;
}

#[async_trait]
impl AccountApi for CloudflareApi {
    async fn list_accounts(&self) -> Result<Vec<ApiAccount>> {
        self.get("accounts?per_page=50").await
    }
}
