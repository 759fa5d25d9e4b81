//! Zone bot management
//!
//! A singleton per zone: it always exists remotely, so "create" writes the
//! settings and "delete" turns the features back off.

use crate::api::{ApiBotManagement, BotManagementApi};
use crate::connector::Profile;
use crate::error::ResultExt;
use crate::resources::ignore_not_found;
use async_trait::async_trait;
use flaresync_cloud::{CloudError, Creation, ExternalClient, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub struct BotManagement;

impl ResourceKind for BotManagement {
    const KIND: &'static str = "BotManagement";
    const IDEMPOTENT_CREATE: bool = true;
    type Params = BotManagementParams;
    type Observation = BotManagementObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotManagementParams {
    pub zone_id: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub enable_js: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub fight_mode: Field<bool>,

    /// "block" or "disabled"
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub ai_bots_protection: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub sbfm_definitely_automated: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub sbfm_likely_automated: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub sbfm_verified_bots: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub sbfm_static_resource_protection: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub optimize_wordpress: Field<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotManagementObservation {
    pub zone_id: String,
    #[serde(flatten)]
    pub settings: ApiBotManagement,
}

pub fn generate_observation(zone_id: &str, settings: &ApiBotManagement) -> BotManagementObservation {
    BotManagementObservation {
        zone_id: zone_id.to_string(),
        settings: settings.clone(),
    }
}

pub fn is_up_to_date(
    params: &BotManagementParams,
    observed: &BotManagementObservation,
) -> Result<bool> {
    same_zone(params, &observed.zone_id)?;
    let s = &observed.settings;
    Ok(params.enable_js.matches_opt(s.enable_js.as_ref())
        && params.fight_mode.matches_opt(s.fight_mode.as_ref())
        && params.ai_bots_protection.matches_opt(s.ai_bots_protection.as_ref())
        && params
            .sbfm_definitely_automated
            .matches_opt(s.sbfm_definitely_automated.as_ref())
        && params
            .sbfm_likely_automated
            .matches_opt(s.sbfm_likely_automated.as_ref())
        && params.sbfm_verified_bots.matches_opt(s.sbfm_verified_bots.as_ref())
        && params
            .sbfm_static_resource_protection
            .matches_opt(s.sbfm_static_resource_protection.as_ref())
        && params.optimize_wordpress.matches_opt(s.optimize_wordpress.as_ref()))
}

fn settings(params: &BotManagementParams) -> ApiBotManagement {
    ApiBotManagement {
        enable_js: params.enable_js.get().copied(),
        fight_mode: params.fight_mode.get().copied(),
        ai_bots_protection: params.ai_bots_protection.get().cloned(),
        sbfm_definitely_automated: params.sbfm_definitely_automated.get().cloned(),
        sbfm_likely_automated: params.sbfm_likely_automated.get().cloned(),
        sbfm_verified_bots: params.sbfm_verified_bots.get().cloned(),
        sbfm_static_resource_protection: params.sbfm_static_resource_protection.get().copied(),
        optimize_wordpress: params.optimize_wordpress.get().copied(),
        using_latest_model: None,
    }
}

fn zone_id(params: &BotManagementParams) -> Result<&str> {
    if params.zone_id.is_empty() {
        return Err(CloudError::InvalidConfig("zoneId is required".to_string()));
    }
    Ok(&params.zone_id)
}

/// The settings belong to the zone they were first written to
fn same_zone(params: &BotManagementParams, zone_id: &str) -> Result<()> {
    if params.zone_id != zone_id {
        return Err(CloudError::ImmutableField {
            field: "zoneId".to_string(),
            desired: params.zone_id.clone(),
            observed: zone_id.to_string(),
        });
    }
    Ok(())
}

pub struct BotManagementClient {
    profile: Arc<Profile>,
}

impl BotManagementClient {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }

    async fn write(&self, params: &BotManagementParams, verb: &str) -> Result<BotManagementObservation> {
        let zone_id = zone_id(params)?;
        let updated = self
            .profile
            .api
            .update_bot_management(zone_id, &settings(params))
            .await
            .context(&format!("cannot {} bot management", verb))?;
        Ok(generate_observation(zone_id, &updated))
    }
}

#[async_trait]
impl ExternalClient<BotManagement> for BotManagementClient {
    async fn observe(
        &self,
        external_name: &str,
        params: &BotManagementParams,
    ) -> Result<BotManagementObservation> {
        zone_id(params)?;
        same_zone(params, external_name)?;
        let current = self
            .profile
            .api
            .get_bot_management(external_name)
            .await
            .context("cannot get bot management")?;
        Ok(generate_observation(external_name, &current))
    }

    async fn create(&self, params: &BotManagementParams) -> Result<Creation<BotManagementObservation>> {
        let observation = self.write(params, "create").await?;
        Ok(Creation {
            external_name: params.zone_id.clone(),
            observation,
        })
    }

    async fn update(
        &self,
        external_name: &str,
        params: &BotManagementParams,
    ) -> Result<BotManagementObservation> {
        same_zone(params, external_name)?;
        self.write(params, "update").await
    }

    async fn delete(&self, external_name: &str, params: &BotManagementParams) -> Result<()> {
        zone_id(params)?;
        let off = ApiBotManagement {
            enable_js: Some(false),
            fight_mode: Some(false),
            ..Default::default()
        };
        ignore_not_found(
            self.profile
                .api
                .update_bot_management(external_name, &off)
                .await
                .map(|_| ())
                .context("cannot delete bot management"),
        )
    }

    fn is_up_to_date(
        &self,
        params: &BotManagementParams,
        observed: &BotManagementObservation,
    ) -> Result<bool> {
        is_up_to_date(params, observed)
    }
}

connector!(BotManagement => BotManagementClient);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CloudflareApis;
    use crate::testing::FakeCloudflare;

    fn params() -> BotManagementParams {
        BotManagementParams {
            zone_id: "zone-a".to_string(),
            enable_js: Field::Unset,
            fight_mode: Field::Set(true),
            ai_bots_protection: Field::Set("block".to_string()),
            sbfm_definitely_automated: Field::Unset,
            sbfm_likely_automated: Field::Unset,
            sbfm_verified_bots: Field::Unset,
            sbfm_static_resource_protection: Field::Unset,
            optimize_wordpress: Field::Unset,
        }
    }

    fn client(fake: &Arc<FakeCloudflare>) -> BotManagementClient {
        BotManagementClient::new(Arc::new(Profile::new(
            "default",
            fake.clone() as Arc<dyn CloudflareApis>,
            None,
        )))
    }

    #[tokio::test]
    async fn test_create_is_addressed_by_zone() {
        let fake = FakeCloudflare::new();
        fake.insert_zone(FakeCloudflare::zone("zone-a", "example.com"));
        let client = client(&fake);

        let created = client.create(&params()).await.unwrap();
        assert_eq!(created.external_name, "zone-a");
        assert!(client.is_up_to_date(&params(), &created.observation).unwrap());

        let observed = client.observe("zone-a", &params()).await.unwrap();
        assert_eq!(observed.settings.fight_mode, Some(true));
        assert_eq!(observed.settings.ai_bots_protection.as_deref(), Some("block"));
    }

    #[test]
    fn test_false_is_drift_against_true() {
        let observed = generate_observation(
            "zone-a",
            &ApiBotManagement {
                fight_mode: Some(true),
                ai_bots_protection: Some("block".to_string()),
                ..Default::default()
            },
        );
        assert!(is_up_to_date(&params(), &observed).unwrap());

        let mut desired = params();
        desired.fight_mode = Field::Set(false);
        assert!(!is_up_to_date(&desired, &observed).unwrap());
    }

    #[tokio::test]
    async fn test_zone_change_is_rejected() {
        let fake = FakeCloudflare::new();
        fake.insert_zone(FakeCloudflare::zone("zone-a", "example.com"));
        fake.insert_zone(FakeCloudflare::zone("zone-b", "example.org"));
        let client = client(&fake);
        let created = client.create(&params()).await.unwrap();

        let mut moved = params();
        moved.zone_id = "zone-b".to_string();
        fake.clear_calls();

        let err = client.observe(&created.external_name, &moved).await.unwrap_err();
        assert!(matches!(err, CloudError::ImmutableField { ref field, .. } if field == "zoneId"));
        assert!(err.requires_spec_change());
        assert!(fake.calls().is_empty());

        assert!(client.is_up_to_date(&moved, &created.observation).is_err());
        assert!(client.update(&created.external_name, &moved).await.is_err());
        assert_eq!(fake.count("update_bot_management"), 0);
    }

    #[tokio::test]
    async fn test_delete_turns_features_off() {
        let fake = FakeCloudflare::new();
        fake.insert_zone(FakeCloudflare::zone("zone-a", "example.com"));
        let client = client(&fake);
        client.create(&params()).await.unwrap();

        client.delete("zone-a", &params()).await.unwrap();
        let observed = client.observe("zone-a", &params()).await.unwrap();
        assert_eq!(observed.settings.fight_mode, Some(false));
    }

    #[tokio::test]
    async fn test_delete_on_missing_zone_is_ok() {
        let fake = FakeCloudflare::new();
        client(&fake).delete("zone-gone", &params()).await.unwrap();
    }
}
