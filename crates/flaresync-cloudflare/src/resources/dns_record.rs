//! DNS records
//!
//! External names are `<zone id>/<record id>` so a record stays tied to the
//! zone it was created in. A bare record ID (an adopted record) is looked up
//! in the desired zone.

use crate::api::{ApiDnsRecord, DnsRecordApi, DnsRecordBody};
use crate::connector::Profile;
use crate::error::ResultExt;
use crate::resources::ignore_not_found;
use async_trait::async_trait;
use flaresync_cloud::{CloudError, Creation, ExternalClient, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

pub struct DnsRecord;

impl ResourceKind for DnsRecord {
    const KIND: &'static str = "DnsRecord";
    type Params = DnsRecordParams;
    type Observation = DnsRecordObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordParams {
    pub zone_id: String,

    /// Relative name, fully qualified name, or `@` for the zone apex
    pub name: String,

    #[serde(rename = "type")]
    pub record_type: String,

    pub content: String,

    /// Seconds; 1 means automatic
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub ttl: Field<u32>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub proxied: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub priority: Field<u16>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub comment: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub tags: Field<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordObservation {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
}

pub fn generate_observation(record: &ApiDnsRecord) -> DnsRecordObservation {
    DnsRecordObservation {
        id: record.id.clone(),
        name: record.name.clone(),
        record_type: record.r#type.clone(),
        content: record.content.clone(),
        ttl: record.ttl,
        proxied: record.proxied.unwrap_or(false),
        priority: record.priority,
        comment: record.comment.clone().filter(|c| !c.is_empty()),
        tags: record.tags.clone(),
        zone_name: record.zone_name.clone(),
    }
}

/// Canonical content. A and AAAA content must be a valid address of the
/// right family.
fn canonical_content(record_type: &str, content: &str) -> Result<String> {
    let conversion = |family: &str| {
        CloudError::Conversion(format!(
            "{} record content '{}' is not a valid {} address",
            record_type, content, family
        ))
    };
    match record_type.to_ascii_uppercase().as_str() {
        "A" => content
            .trim()
            .parse::<Ipv4Addr>()
            .map(|ip| ip.to_string())
            .map_err(|_| conversion("IPv4")),
        "AAAA" => content
            .trim()
            .parse::<Ipv6Addr>()
            .map(|ip| ip.to_string())
            .map_err(|_| conversion("IPv6")),
        _ => Ok(content.to_string()),
    }
}

fn body(params: &DnsRecordParams) -> Result<DnsRecordBody> {
    if params.zone_id.is_empty() {
        return Err(CloudError::InvalidConfig("zoneId is required".to_string()));
    }
    Ok(DnsRecordBody {
        name: params.name.clone(),
        r#type: params.record_type.to_ascii_uppercase(),
        content: canonical_content(&params.record_type, &params.content)?,
        ttl: params.ttl.get().copied(),
        proxied: params.proxied.get().copied(),
        priority: params.priority.get().copied(),
        comment: params.comment.get().cloned(),
        tags: params.tags.get().cloned(),
    })
}

/// Desired name against the fully qualified observed name
fn name_matches(desired: &str, observed: &DnsRecordObservation) -> bool {
    let desired = desired.trim_end_matches('.').to_ascii_lowercase();
    let name = observed.name.trim_end_matches('.').to_ascii_lowercase();
    if desired == name {
        return true;
    }
    match observed.zone_name.as_deref().map(str::to_ascii_lowercase) {
        Some(zone) if desired == "@" => name == zone,
        Some(zone) => name == format!("{}.{}", desired, zone),
        None => desired != "@" && name.starts_with(&format!("{}.", desired)),
    }
}

fn content_matches(params: &DnsRecordParams, observed: &DnsRecordObservation) -> Result<bool> {
    let desired = canonical_content(&params.record_type, &params.content)?;
    Ok(match params.record_type.to_ascii_uppercase().as_str() {
        "A" | "AAAA" => observed.content.trim().parse::<IpAddr>().ok() == desired.parse().ok(),
        _ => desired == observed.content,
    })
}

pub fn is_up_to_date(params: &DnsRecordParams, observed: &DnsRecordObservation) -> Result<bool> {
    Ok(name_matches(&params.name, observed)
        && params.record_type.eq_ignore_ascii_case(&observed.record_type)
        && content_matches(params, observed)?
        && params.ttl.matches(&observed.ttl)
        && params.proxied.matches(&observed.proxied)
        && params.priority.matches_opt(observed.priority.as_ref())
        && params.comment.matches_opt(observed.comment.as_ref())
        && params.tags.matches_unordered(&observed.tags))
}

/// Split an external name into (zone, record), falling back to the desired zone
fn recorded<'a>(external_name: &'a str, params: &'a DnsRecordParams) -> (&'a str, &'a str) {
    external_name
        .split_once('/')
        .unwrap_or((params.zone_id.as_str(), external_name))
}

/// Zone and record to act on, refusing a record whose zone moved
fn locate<'a>(external_name: &'a str, params: &'a DnsRecordParams) -> Result<(&'a str, &'a str)> {
    let (zone_id, record_id) = recorded(external_name, params);
    if zone_id != params.zone_id {
        return Err(CloudError::ImmutableField {
            field: "zoneId".to_string(),
            desired: params.zone_id.clone(),
            observed: zone_id.to_string(),
        });
    }
    Ok((zone_id, record_id))
}

pub struct DnsRecordClient {
    profile: Arc<Profile>,
}

impl DnsRecordClient {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl ExternalClient<DnsRecord> for DnsRecordClient {
    async fn observe(&self, external_name: &str, params: &DnsRecordParams) -> Result<DnsRecordObservation> {
        body(params)?;
        let (zone_id, record_id) = locate(external_name, params)?;
        let record = self
            .profile
            .api
            .get_dns_record(zone_id, record_id)
            .await
            .context("cannot get dns record")?;
        Ok(generate_observation(&record))
    }

    async fn create(&self, params: &DnsRecordParams) -> Result<Creation<DnsRecordObservation>> {
        let body = body(params)?;
        let record = self
            .profile
            .api
            .create_dns_record(&params.zone_id, &body)
            .await
            .context("cannot create dns record")?;
        Ok(Creation {
            external_name: format!("{}/{}", params.zone_id, record.id),
            observation: generate_observation(&record),
        })
    }

    async fn update(&self, external_name: &str, params: &DnsRecordParams) -> Result<DnsRecordObservation> {
        let body = body(params)?;
        let (zone_id, record_id) = locate(external_name, params)?;
        let record = self
            .profile
            .api
            .update_dns_record(zone_id, record_id, &body)
            .await
            .context("cannot update dns record")?;
        Ok(generate_observation(&record))
    }

    async fn delete(&self, external_name: &str, params: &DnsRecordParams) -> Result<()> {
        let (zone_id, record_id) = recorded(external_name, params);
        ignore_not_found(
            self.profile
                .api
                .delete_dns_record(zone_id, record_id)
                .await
                .context("cannot delete dns record"),
        )
    }

    fn is_up_to_date(&self, params: &DnsRecordParams, observed: &DnsRecordObservation) -> Result<bool> {
        is_up_to_date(params, observed)
    }
}

connector!(DnsRecord => DnsRecordClient);
