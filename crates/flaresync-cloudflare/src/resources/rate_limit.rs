//! Rate limiting rules (`http_ratelimit` phase)

use super::phase_rule::{PhaseRuleClient, PhaseRuleKind, PhaseRuleObservation};
use crate::api::ApiRule;
use crate::resources::ruleset::rule_matches;
use crate::scope::Scope;
use flaresync_cloud::{CloudError, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const PHASE: &str = "http_ratelimit";

/// Periods (seconds) the API accepts
pub const PERIODS: [u32; 6] = [10, 60, 120, 300, 600, 3600];

const ACTIONS: [&str; 5] = ["block", "challenge", "js_challenge", "managed_challenge", "log"];

pub struct RateLimitRule;

impl ResourceKind for RateLimitRule {
    const KIND: &'static str = "RateLimitRule";
    type Params = RateLimitParams;
    type Observation = PhaseRuleObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitParams {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub zone_id: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,

    pub expression: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub enabled: Field<bool>,

    pub action: String,

    /// Request properties the counter is keyed on, e.g. `ip.src`, `cf.colo.id`
    pub characteristics: Vec<String>,

    pub period: u32,

    pub requests_per_period: u32,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub mitigation_timeout: Field<u32>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub counting_expression: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub requests_to_origin: Field<bool>,
}

fn ratelimit(params: &RateLimitParams) -> Result<Value> {
    if !PERIODS.contains(&params.period) {
        return Err(CloudError::Conversion(format!(
            "period {} is not one of {:?}",
            params.period, PERIODS
        )));
    }
    if params.characteristics.is_empty() {
        return Err(CloudError::Conversion(
            "characteristics must not be empty".to_string(),
        ));
    }
    if params.requests_per_period == 0 {
        return Err(CloudError::Conversion(
            "requestsPerPeriod must be positive".to_string(),
        ));
    }

    let mut value = json!({
        "characteristics": params.characteristics,
        "period": params.period,
        "requests_per_period": params.requests_per_period,
    });
    if let Some(timeout) = params.mitigation_timeout.get() {
        value["mitigation_timeout"] = json!(timeout);
    }
    if let Some(counting) = params.counting_expression.get() {
        value["counting_expression"] = json!(counting);
    }
    if let Some(origin) = params.requests_to_origin.get() {
        value["requests_to_origin"] = json!(origin);
    }
    Ok(value)
}

/// Characteristics are a set; sort them so the containment check ignores order
fn sort_characteristics(rule: &mut ApiRule) {
    if let Some(Value::Array(items)) = rule
        .ratelimit
        .as_mut()
        .and_then(|r| r.get_mut("characteristics"))
    {
        items.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    }
}

impl PhaseRuleKind for RateLimitRule {
    const NOUN: &'static str = "rate limit rule";

    fn scope(params: &RateLimitParams) -> Result<Scope> {
        Scope::from_refs(&params.zone_id, &params.account_id)
    }

    fn phase(_: &RateLimitParams) -> Result<&'static str> {
        Ok(PHASE)
    }

    fn to_rule(params: &RateLimitParams) -> Result<ApiRule> {
        if !ACTIONS.contains(&params.action.as_str()) {
            return Err(CloudError::Conversion(format!(
                "action '{}' must be one of {}",
                params.action,
                ACTIONS.join(", ")
            )));
        }
        Ok(ApiRule {
            id: None,
            action: params.action.clone(),
            expression: params.expression.clone(),
            description: params.description.get().cloned(),
            enabled: params.enabled.get().copied(),
            action_parameters: None,
            ratelimit: Some(ratelimit(params)?),
            rule_ref: None,
        })
    }

    fn rule_matches(params: &RateLimitParams, observed: &PhaseRuleObservation) -> Result<bool> {
        let mut desired = Self::to_rule(params)?;
        let mut observed = observed.rule.clone();
        sort_characteristics(&mut desired);
        sort_characteristics(&mut observed);
        Ok(rule_matches(&desired, &observed))
    }
}

connector!(RateLimitRule => PhaseRuleClient<RateLimitRule>);
