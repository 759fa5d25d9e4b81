//! Rulesets managed as a whole
//!
//! For single rules inside a phase entrypoint see the transform, cache and
//! rate-limit kinds, which share [`super::phase_rule`].

use crate::api::{ApiRule, ApiRuleset, RulesetApi, RulesetBody};
use crate::connector::Profile;
use crate::error::ResultExt;
use crate::resources::{ignore_not_found, json_subset};
use crate::scope::Scope;
use async_trait::async_trait;
use flaresync_cloud::{CloudError, Creation, ExternalClient, Field, ResourceKind, Result, ordered_eq};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub struct Ruleset;

impl ResourceKind for Ruleset {
    const KIND: &'static str = "Ruleset";
    type Params = RulesetParams;
    type Observation = RulesetObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesetParams {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub zone_id: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,

    /// Defaults to the phase entrypoint kind of the scope ("zone" or "root")
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub kind: Field<String>,

    pub phase: String,

    /// Evaluated in order
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub rules: Field<Vec<RuleParams>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleParams {
    pub action: String,
    pub expression: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub enabled: Field<bool>,

    /// Passed through to the API as-is
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub action_parameters: Field<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub ratelimit: Field<serde_json::Value>,

    #[serde(rename = "ref", default, skip_serializing_if = "Field::is_unset")]
    pub rule_ref: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesetObservation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: String,
    pub phase: String,
    pub version: String,
    #[serde(default)]
    pub rules: Vec<ApiRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

pub fn generate_observation(ruleset: &ApiRuleset) -> RulesetObservation {
    RulesetObservation {
        id: ruleset.id.clone(),
        name: ruleset.name.clone(),
        description: ruleset.description.clone(),
        kind: ruleset.kind.clone(),
        phase: ruleset.phase.clone(),
        version: ruleset.version.clone(),
        rules: ruleset.rules.clone(),
        last_updated: ruleset.last_updated.clone(),
    }
}

/// Desired rule against an observed one. Fields left out of the desired rule
/// are not compared; parameter objects only need to be contained in the
/// observed ones, since the API fills in defaults.
pub(crate) fn rule_matches(desired: &ApiRule, observed: &ApiRule) -> bool {
    desired.action == observed.action
        && desired.expression.trim() == observed.expression.trim()
        && desired
            .description
            .as_ref()
            .is_none_or(|d| observed.description.as_deref().unwrap_or_default() == d)
        && desired
            .enabled
            .is_none_or(|d| observed.enabled.unwrap_or(true) == d)
        && optional_subset(&desired.action_parameters, &observed.action_parameters)
        && optional_subset(&desired.ratelimit, &observed.ratelimit)
}

fn optional_subset(desired: &Option<serde_json::Value>, observed: &Option<serde_json::Value>) -> bool {
    match (desired, observed) {
        (None, _) => true,
        (Some(d), Some(o)) => json_subset(d, o),
        (Some(d), None) => d.as_object().is_some_and(|m| m.is_empty()),
    }
}

fn to_api_rule(rule: &RuleParams) -> Result<ApiRule> {
    for (name, value) in [
        ("actionParameters", &rule.action_parameters),
        ("ratelimit", &rule.ratelimit),
    ] {
        if let Field::Set(v) = value {
            if !v.is_object() {
                return Err(CloudError::Conversion(format!(
                    "{} of rule '{}' must be an object",
                    name, rule.expression
                )));
            }
        }
    }
    Ok(ApiRule {
        id: None,
        action: rule.action.clone(),
        expression: rule.expression.clone(),
        description: rule.description.get().cloned(),
        enabled: rule.enabled.get().copied(),
        action_parameters: rule.action_parameters.get().cloned(),
        ratelimit: rule.ratelimit.get().cloned(),
        rule_ref: rule.rule_ref.get().cloned(),
    })
}

fn to_api_rules(params: &RulesetParams) -> Result<Vec<ApiRule>> {
    params
        .rules
        .get()
        .map(|rules| rules.iter().map(to_api_rule).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

pub fn is_up_to_date(params: &RulesetParams, observed: &RulesetObservation) -> Result<bool> {
    if params.phase != observed.phase {
        return Err(CloudError::ImmutableField {
            field: "phase".to_string(),
            desired: params.phase.clone(),
            observed: observed.phase.clone(),
        });
    }
    if let Field::Set(kind) = &params.kind {
        if *kind != observed.kind {
            return Err(CloudError::ImmutableField {
                field: "kind".to_string(),
                desired: kind.clone(),
                observed: observed.kind.clone(),
            });
        }
    }
    let rules_match = match params.rules.get() {
        Some(_) => ordered_eq(&to_api_rules(params)?, &observed.rules, rule_matches),
        None => true,
    };
    Ok(params.name == observed.name
        && params.description.matches(&observed.description)
        && rules_match)
}

pub struct RulesetClient {
    profile: Arc<Profile>,
}

impl RulesetClient {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }

    /// Scope and request body, checked before any remote call
    fn prepare(&self, params: &RulesetParams) -> Result<(Scope, RulesetBody)> {
        let scope = Scope::from_refs(&params.zone_id, &params.account_id)?;
        let body = RulesetBody {
            name: params.name.clone(),
            description: params.description.get().cloned().unwrap_or_default(),
            kind: params
                .kind
                .get()
                .cloned()
                .unwrap_or_else(|| scope.entrypoint_kind().to_string()),
            phase: params.phase.clone(),
            rules: to_api_rules(params)?,
        };
        Ok((scope, body))
    }
}

#[async_trait]
impl ExternalClient<Ruleset> for RulesetClient {
    async fn observe(&self, external_name: &str, params: &RulesetParams) -> Result<RulesetObservation> {
        let (scope, _) = self.prepare(params)?;
        let ruleset = self
            .profile
            .api
            .get_ruleset(&scope, external_name)
            .await
            .context("cannot get ruleset")?;
        Ok(generate_observation(&ruleset))
    }

    async fn create(&self, params: &RulesetParams) -> Result<Creation<RulesetObservation>> {
        let (scope, body) = self.prepare(params)?;
        let ruleset = self
            .profile
            .api
            .create_ruleset(&scope, &body)
            .await
            .context("cannot create ruleset")?;
        Ok(Creation {
            external_name: ruleset.id.clone(),
            observation: generate_observation(&ruleset),
        })
    }

    async fn update(&self, external_name: &str, params: &RulesetParams) -> Result<RulesetObservation> {
        let (scope, mut body) = self.prepare(params)?;
        if params.rules.is_unset() {
            // a full replace would drop the rules we do not manage
            body.rules = self
                .profile
                .api
                .get_ruleset(&scope, external_name)
                .await
                .context("cannot get ruleset")?
                .rules;
        }
        let ruleset = self
            .profile
            .api
            .update_ruleset(&scope, external_name, &body)
            .await
            .context("cannot update ruleset")?;
        Ok(generate_observation(&ruleset))
    }

    async fn delete(&self, external_name: &str, params: &RulesetParams) -> Result<()> {
        let (scope, _) = self.prepare(params)?;
        ignore_not_found(
            self.profile
                .api
                .delete_ruleset(&scope, external_name)
                .await
                .context("cannot delete ruleset"),
        )
    }

    fn is_up_to_date(&self, params: &RulesetParams, observed: &RulesetObservation) -> Result<bool> {
        is_up_to_date(params, observed)
    }
}

connector!(Ruleset => RulesetClient);
