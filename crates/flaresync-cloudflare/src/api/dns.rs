//! DNS records

use super::CloudflareApi;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDnsRecord {
    pub id: String,
    pub name: String,
    pub r#type: String,
    pub content: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: Option<bool>,
    #[serde(default)]
    pub priority: Option<u16>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub zone_name: Option<String>,
}

/// Record body. Create sends every field; update is a PATCH, so absent
/// optional fields are left alone remotely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnsRecordBody {
    pub name: String,
    pub r#type: String,
    pub content: String,
    /// 1 means "automatic"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[async_trait]
pub trait DnsRecordApi: Send + Sync {
    async fn get_dns_record(&self, zone_id: &str, record_id: &str) -> Result<ApiDnsRecord>;

    async fn create_dns_record(&self, zone_id: &str, record: &DnsRecordBody)
    -> Result<ApiDnsRecord>;

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecordBody,
    ) -> Result<ApiDnsRecord>;

    async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<()>;
}

#[async_trait]
impl DnsRecordApi for CloudflareApi {
    async fn get_dns_record(&self, zone_id: &str, record_id: &str) -> Result<ApiDnsRecord> {
        self.get(&format!("zones/{}/dns_records/{}", zone_id, record_id))
            .await
    }

    async fn create_dns_record(
        &self,
        zone_id: &str,
        record: &DnsRecordBody,
    ) -> Result<ApiDnsRecord> {
        self.post(&format!("zones/{}/dns_records", zone_id), record)
            .await
    }

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecordBody,
    ) -> Result<ApiDnsRecord> {
        self.patch(
            &format!("zones/{}/dns_records/{}", zone_id, record_id),
            record,
        )
        .await
    }

    async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        self.delete(&format!("zones/{}/dns_records/{}", zone_id, record_id))
            .await
    }
}
