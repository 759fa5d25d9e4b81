//! Zones

use crate::api::{ApiZone, ZoneAccountRef, ZoneApi, ZoneCreate, ZoneEdit};
use crate::connector::Profile;
use crate::error::ResultExt;
use crate::resources::ignore_not_found;
use async_trait::async_trait;
use flaresync_cloud::{CloudError, Creation, ExternalClient, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub struct Zone;

impl ResourceKind for Zone {
    const KIND: &'static str = "Zone";
    type Params = ZoneParams;
    type Observation = ZoneObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneParams {
    /// Domain name; fixed once the zone exists
    pub name: String,

    /// Owning account; defaults to the profile's account
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,

    /// "full" or "partial"
    #[serde(rename = "type", default, skip_serializing_if = "Field::is_unset")]
    pub zone_type: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub paused: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub vanity_name_servers: Field<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneObservation {
    pub id: String,
    pub name: String,
    pub status: String,
    pub paused: bool,
    #[serde(rename = "type")]
    pub zone_type: String,
    #[serde(default)]
    pub name_servers: Vec<String>,
    #[serde(default)]
    pub vanity_name_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

pub fn generate_observation(zone: &ApiZone) -> ZoneObservation {
    ZoneObservation {
        id: zone.id.clone(),
        name: zone.name.clone(),
        status: zone.status.clone(),
        paused: zone.paused,
        zone_type: zone.zone_type.clone(),
        name_servers: zone.name_servers.clone(),
        vanity_name_servers: zone.vanity_name_servers.clone(),
        account_id: zone.account.as_ref().map(|a| a.id.clone()),
    }
}

/// The zone name cannot be edited; a changed name means a different zone.
pub fn is_up_to_date(params: &ZoneParams, observed: &ZoneObservation) -> Result<bool> {
    if !params.name.eq_ignore_ascii_case(&observed.name) {
        return Err(CloudError::ImmutableField {
            field: "name".to_string(),
            desired: params.name.clone(),
            observed: observed.name.clone(),
        });
    }
    Ok(params.zone_type.matches(&observed.zone_type)
        && params.paused.matches(&observed.paused)
        && params
            .vanity_name_servers
            .matches_unordered(&observed.vanity_name_servers))
}

fn edit(params: &ZoneParams) -> ZoneEdit {
    ZoneEdit {
        paused: params.paused.get().copied(),
        zone_type: params.zone_type.get().cloned(),
        vanity_name_servers: params.vanity_name_servers.get().cloned(),
    }
}

fn validate(params: &ZoneParams) -> Result<()> {
    if params.name.trim().is_empty() {
        return Err(CloudError::InvalidConfig("zone name is required".to_string()));
    }
    Ok(())
}

pub struct ZoneClient {
    profile: Arc<Profile>,
}

impl ZoneClient {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl ExternalClient<Zone> for ZoneClient {
    async fn observe(&self, external_name: &str, params: &ZoneParams) -> Result<ZoneObservation> {
        validate(params)?;
        let zone = self
            .profile
            .api
            .get_zone(external_name)
            .await
            .context("cannot get zone")?;
        Ok(generate_observation(&zone))
    }

    async fn create(&self, params: &ZoneParams) -> Result<Creation<ZoneObservation>> {
        validate(params)?;
        let account_id = self.profile.resolve_account(&params.account_id).await?;
        let request = ZoneCreate {
            name: params.name.clone(),
            account: ZoneAccountRef { id: account_id },
            zone_type: params.zone_type.get().cloned(),
        };
        let mut zone = self
            .profile
            .api
            .create_zone(&request)
            .await
            .context("cannot create zone")?;

        // paused and vanity name servers are not accepted on create
        let edit = ZoneEdit {
            zone_type: None,
            ..edit(params)
        };
        if edit.paused.is_some() || edit.vanity_name_servers.is_some() {
            zone = self
                .profile
                .api
                .edit_zone(&zone.id, &edit)
                .await
                .context("cannot update zone")?;
        }

        Ok(Creation {
            external_name: zone.id.clone(),
            observation: generate_observation(&zone),
        })
    }

    async fn update(&self, external_name: &str, params: &ZoneParams) -> Result<ZoneObservation> {
        validate(params)?;
        let zone = self
            .profile
            .api
            .edit_zone(external_name, &edit(params))
            .await
            .context("cannot update zone")?;
        Ok(generate_observation(&zone))
    }

    async fn delete(&self, external_name: &str, params: &ZoneParams) -> Result<()> {
        validate(params)?;
        ignore_not_found(
            self.profile
                .api
                .delete_zone(external_name)
                .await
                .context("cannot delete zone"),
        )
    }

    fn is_up_to_date(&self, params: &ZoneParams, observed: &ZoneObservation) -> Result<bool> {
        is_up_to_date(params, observed)
    }
}

connector!(Zone => ZoneClient);
