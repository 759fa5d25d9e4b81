//! Turnstile widgets

use crate::api::{ApiTurnstileWidget, TurnstileApi, TurnstileWidgetBody};
use crate::connector::Profile;
use crate::error::ResultExt;
use crate::resources::ignore_not_found;
use async_trait::async_trait;
use flaresync_cloud::{CloudError, Creation, ExternalClient, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_MODE: &str = "managed";
const MODES: [&str; 3] = ["managed", "non-interactive", "invisible"];

pub struct TurnstileWidget;

impl ResourceKind for TurnstileWidget {
    const KIND: &'static str = "TurnstileWidget";
    type Params = TurnstileWidgetParams;
    type Observation = TurnstileWidgetObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnstileWidgetParams {
    pub name: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,

    /// Hostnames the widget may be embedded on
    #[serde(default)]
    pub domains: Vec<String>,

    /// managed, non-interactive or invisible
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub mode: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub bot_fight_mode: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub region: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnstileWidgetObservation {
    pub sitekey: String,
    pub name: String,
    pub domains: Vec<String>,
    pub mode: String,
    pub bot_fight_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<String>,
}

pub fn generate_observation(widget: &ApiTurnstileWidget) -> TurnstileWidgetObservation {
    TurnstileWidgetObservation {
        sitekey: widget.sitekey.clone(),
        name: widget.name.clone(),
        domains: widget.domains.clone(),
        mode: widget.mode.clone(),
        bot_fight_mode: widget.bot_fight_mode,
        region: widget.region.clone(),
        modified_on: widget.modified_on.clone(),
    }
}

pub fn is_up_to_date(
    params: &TurnstileWidgetParams,
    observed: &TurnstileWidgetObservation,
) -> Result<bool> {
    Ok(params.name == observed.name
        && Field::Set(params.domains.clone()).matches_unordered(&observed.domains)
        && params.mode.matches(&observed.mode)
        && params.bot_fight_mode.matches(&observed.bot_fight_mode)
        && params.region.matches_opt(observed.region.as_ref()))
}

fn validate(params: &TurnstileWidgetParams) -> Result<()> {
    if let Field::Set(mode) = &params.mode {
        if !MODES.contains(&mode.as_str()) {
            return Err(CloudError::Conversion(format!(
                "unknown widget mode '{}', expected one of {}",
                mode,
                MODES.join(", ")
            )));
        }
    }
    Ok(())
}

fn body(params: &TurnstileWidgetParams, mode: String) -> TurnstileWidgetBody {
    TurnstileWidgetBody {
        name: params.name.clone(),
        domains: params.domains.clone(),
        mode,
        bot_fight_mode: params.bot_fight_mode.get().copied(),
        region: params.region.get().cloned(),
    }
}

pub struct TurnstileClient {
    profile: Arc<Profile>,
}

impl TurnstileClient {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl ExternalClient<TurnstileWidget> for TurnstileClient {
    async fn observe(
        &self,
        external_name: &str,
        params: &TurnstileWidgetParams,
    ) -> Result<TurnstileWidgetObservation> {
        validate(params)?;
        let account = self.profile.resolve_account(&params.account_id).await?;
        let widget = self
            .profile
            .api
            .get_widget(&account, external_name)
            .await
            .context("cannot get turnstile widget")?;
        Ok(generate_observation(&widget))
    }

    async fn create(
        &self,
        params: &TurnstileWidgetParams,
    ) -> Result<Creation<TurnstileWidgetObservation>> {
        validate(params)?;
        let account = self.profile.resolve_account(&params.account_id).await?;
        let mode = params
            .mode
            .get()
            .cloned()
            .unwrap_or_else(|| DEFAULT_MODE.to_string());
        let widget = self
            .profile
            .api
            .create_widget(&account, &body(params, mode))
            .await
            .context("cannot create turnstile widget")?;
        Ok(Creation {
            external_name: widget.sitekey.clone(),
            observation: generate_observation(&widget),
        })
    }

    async fn update(
        &self,
        external_name: &str,
        params: &TurnstileWidgetParams,
    ) -> Result<TurnstileWidgetObservation> {
        validate(params)?;
        let account = self.profile.resolve_account(&params.account_id).await?;
        // PUT replaces the widget; keep the remote mode when none is pinned
        let mode = match params.mode.get() {
            Some(mode) => mode.clone(),
            None => {
                self.profile
                    .api
                    .get_widget(&account, external_name)
                    .await
                    .context("cannot get turnstile widget")?
                    .mode
            }
        };
        let widget = self
            .profile
            .api
            .update_widget(&account, external_name, &body(params, mode))
            .await
            .context("cannot update turnstile widget")?;
        Ok(generate_observation(&widget))
    }

    async fn delete(&self, external_name: &str, params: &TurnstileWidgetParams) -> Result<()> {
        let account = self.profile.resolve_account(&params.account_id).await?;
        ignore_not_found(
            self.profile
                .api
                .delete_widget(&account, external_name)
                .await
                .context("cannot delete turnstile widget"),
        )
    }

    fn is_up_to_date(
        &self,
        params: &TurnstileWidgetParams,
        observed: &TurnstileWidgetObservation,
    ) -> Result<bool> {
        is_up_to_date(params, observed)
    }
}

connector!(TurnstileWidget => TurnstileClient);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CloudflareApis;
    use crate::testing::FakeCloudflare;

    fn params(mode: Option<&str>) -> TurnstileWidgetParams {
        TurnstileWidgetParams {
            name: "login".to_string(),
            account_id: Field::Unset,
            domains: vec!["example.com".to_string(), "www.example.com".to_string()],
            mode: mode.map(str::to_string).into(),
            bot_fight_mode: Field::Unset,
            region: Field::Unset,
        }
    }

    fn remote(mode: &str) -> ApiTurnstileWidget {
        ApiTurnstileWidget {
            sitekey: "0x4AAA-1".to_string(),
            name: "login".to_string(),
            domains: vec!["www.example.com".to_string(), "example.com".to_string()],
            mode: mode.to_string(),
            bot_fight_mode: false,
            region: Some("world".to_string()),
            created_on: None,
            modified_on: None,
        }
    }

    fn client(fake: &Arc<FakeCloudflare>) -> TurnstileClient {
        TurnstileClient::new(Arc::new(Profile::new(
            "default",
            fake.clone() as Arc<dyn CloudflareApis>,
            Some(FakeCloudflare::ACCOUNT_ID.to_string()),
        )))
    }

    #[test]
    fn test_domains_are_order_insensitive() {
        let observed = generate_observation(&remote("managed"));
        assert!(is_up_to_date(&params(Some("managed")), &observed).unwrap());

        let mut longer = params(None);
        longer.domains.push("api.example.com".to_string());
        assert!(!is_up_to_date(&longer, &observed).unwrap());
    }

    #[test]
    fn test_mode_drift() {
        let observed = generate_observation(&remote("managed"));
        assert!(!is_up_to_date(&params(Some("invisible")), &observed).unwrap());
        assert!(is_up_to_date(&params(None), &observed).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_mode_fails_before_any_remote_call() {
        let fake = FakeCloudflare::new();
        let err = client(&fake)
            .create(&params(Some("loud")))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Conversion(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_defaults_to_managed() {
        let fake = FakeCloudflare::new();
        let created = client(&fake).create(&params(None)).await.unwrap();
        assert_eq!(created.observation.mode, "managed");
        assert_eq!(created.external_name, created.observation.sitekey);
    }

    #[tokio::test]
    async fn test_update_without_mode_keeps_remote_mode() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let created = client.create(&params(Some("invisible"))).await.unwrap();

        let mut renamed = params(None);
        renamed.name = "signup".to_string();
        let observed = client.update(&created.external_name, &renamed).await.unwrap();
        assert_eq!(observed.name, "signup");
        assert_eq!(observed.mode, "invisible");
    }
}
