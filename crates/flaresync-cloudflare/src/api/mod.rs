//! Cloudflare v4 API client
//!
//! One trait per resource family, all implemented by [`CloudflareApi`].
//! Adapters only ever see the traits, so tests can swap in a fake.

pub mod account;
pub mod bot_management;
pub mod dns;
pub mod r2;
pub mod ruleset;
pub mod turnstile;
pub mod zone;

pub use account::{AccountApi, ApiAccount};
pub use bot_management::{ApiBotManagement, BotManagementApi};
pub use dns::{ApiDnsRecord, DnsRecordApi, DnsRecordBody};
pub use r2::{ApiR2Bucket, R2Api, R2BucketCreate};
pub use ruleset::{ApiRule, ApiRuleset, RulesetApi, RulesetBody};
pub use turnstile::{ApiTurnstileWidget, TurnstileApi, TurnstileWidgetBody};
pub use zone::{ApiZone, ZoneAccountRef, ZoneApi, ZoneCreate, ZoneEdit};

use crate::error::{CloudflareError, Result};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Every API family at once
pub trait CloudflareApis:
    AccountApi + ZoneApi + DnsRecordApi + R2Api + TurnstileApi + BotManagementApi + RulesetApi
{
}

impl<T> CloudflareApis for T where
    T: AccountApi
        + ZoneApi
        + DnsRecordApi
        + R2Api
        + TurnstileApi
        + BotManagementApi
        + RulesetApi
        + ?Sized
{
}

/// Cloudflare API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

pub struct CloudflareApi {
    client: reqwest::Client,
    api_token: String,
    api_base: String,
}

impl CloudflareApi {
    pub fn new(api_token: impl Into<String>, api_base: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_token: api_token.into(),
            api_base: api_base
                .unwrap_or(CLOUDFLARE_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        tracing::trace!(%method, %url, "Cloudflare API request");
        self.client
            .request(method, url)
            .bearer_auth(&self.api_token)
    }

    /// Send a request and unwrap the `result` of the response envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: ApiResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(CloudflareError::api(status.as_u16(), None, body));
            }
            Err(e) => {
                return Err(CloudflareError::Decode(format!(
                    "{} (body: {})",
                    e,
                    truncate(&body, 200)
                )));
            }
        };

        if !status.is_success() || !envelope.success {
            let first = envelope.errors.first();
            return Err(CloudflareError::api(
                status.as_u16(),
                first.map(|e| e.code),
                first
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        let result = envelope.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub(crate) async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    pub(crate) async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    pub(crate) async fn patch_with_header<T: DeserializeOwned>(
        &self,
        path: &str,
        header: (&str, &str),
    ) -> Result<T> {
        self.send(self.request(Method::PATCH, path).header(header.0, header.1))
            .await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        let _: serde_json::Value = self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
