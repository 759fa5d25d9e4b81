//! Cache rules (`http_request_cache_settings` phase)

use super::phase_rule::{PhaseRuleClient, PhaseRuleKind, PhaseRuleObservation};
use crate::api::ApiRule;
use crate::scope::Scope;
use flaresync_cloud::{CloudError, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const PHASE: &str = "http_request_cache_settings";

const EDGE_TTL_MODES: [&str; 3] = ["respect_origin", "bypass_by_default", "override_origin"];
const BROWSER_TTL_MODES: [&str; 3] = ["respect_origin", "bypass", "override_origin"];

pub struct CacheRule;

impl ResourceKind for CacheRule {
    const KIND: &'static str = "CacheRule";
    type Params = CacheRuleParams;
    type Observation = PhaseRuleObservation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRuleParams {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub zone_id: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,

    pub expression: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub enabled: Field<bool>,

    /// Eligible for cache; `false` bypasses the cache
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub cache: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub edge_ttl: Field<Ttl>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub browser_ttl: Field<Ttl>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub respect_strong_etags: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub origin_error_page_passthru: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub serve_stale: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub additional_cacheable_ports: Field<Vec<u16>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ttl {
    pub mode: String,

    /// Seconds; required with override_origin
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub default: Field<u64>,
}

fn ttl(name: &str, ttl: &Ttl, modes: &[&str]) -> Result<Value> {
    if !modes.contains(&ttl.mode.as_str()) {
        return Err(CloudError::Conversion(format!(
            "{} mode '{}' must be one of {}",
            name,
            ttl.mode,
            modes.join(", ")
        )));
    }
    match (ttl.mode.as_str(), ttl.default.get()) {
        ("override_origin", None) => Err(CloudError::Conversion(format!(
            "{} override_origin needs a default",
            name
        ))),
        (_, Some(default)) => Ok(json!({ "mode": ttl.mode, "default": default })),
        (_, None) => Ok(json!({ "mode": ttl.mode })),
    }
}

fn action_parameters(params: &CacheRuleParams) -> Result<Value> {
    let mut out = Map::new();
    if let Some(cache) = params.cache.get() {
        out.insert("cache".to_string(), json!(cache));
    }
    if let Some(edge) = params.edge_ttl.get() {
        out.insert("edge_ttl".to_string(), ttl("edgeTtl", edge, &EDGE_TTL_MODES)?);
    }
    if let Some(browser) = params.browser_ttl.get() {
        out.insert("browser_ttl".to_string(), ttl("browserTtl", browser, &BROWSER_TTL_MODES)?);
    }
    if let Some(etags) = params.respect_strong_etags.get() {
        out.insert("respect_strong_etags".to_string(), json!(etags));
    }
    if let Some(passthru) = params.origin_error_page_passthru.get() {
        out.insert("origin_error_page_passthru".to_string(), json!(passthru));
    }
    if let Some(serve_stale) = params.serve_stale.get() {
        out.insert(
            "serve_stale".to_string(),
            json!({ "disable_stale_while_updating": !serve_stale }),
        );
    }
    if let Some(ports) = params.additional_cacheable_ports.get() {
        out.insert("additional_cacheable_ports".to_string(), json!(ports));
    }
    if out.is_empty() {
        return Err(CloudError::Conversion(
            "cache rule sets no cache setting".to_string(),
        ));
    }
    Ok(Value::Object(out))
}

impl PhaseRuleKind for CacheRule {
    const NOUN: &'static str = "cache rule";

    fn scope(params: &CacheRuleParams) -> Result<Scope> {
        Scope::from_refs(&params.zone_id, &params.account_id)
    }

    fn phase(_: &CacheRuleParams) -> Result<&'static str> {
        Ok(PHASE)
    }

    fn to_rule(params: &CacheRuleParams) -> Result<ApiRule> {
        Ok(ApiRule {
            id: None,
            action: "set_cache_settings".to_string(),
            expression: params.expression.clone(),
            description: params.description.get().cloned(),
            enabled: params.enabled.get().copied(),
            action_parameters: Some(action_parameters(params)?),
            ratelimit: None,
            rule_ref: None,
        })
    }
}

connector!(CacheRule => PhaseRuleClient<CacheRule>);
