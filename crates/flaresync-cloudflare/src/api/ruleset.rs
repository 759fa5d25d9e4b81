//! Rulesets and phase entrypoints

use super::CloudflareApi;
use crate::error::Result;
use crate::scope::Scope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRuleset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub phase: String,
    /// Bumped by Cloudflare on every write
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub rules: Vec<ApiRule>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRule {
    /// Assigned by Cloudflare; omitted for new rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratelimit: Option<serde_json::Value>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub rule_ref: Option<String>,
}

/// Ruleset body for create and full replace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RulesetBody {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub kind: String,
    pub phase: String,
    pub rules: Vec<ApiRule>,
}

#[async_trait]
pub trait RulesetApi: Send + Sync {
    async fn get_ruleset(&self, scope: &Scope, ruleset_id: &str) -> Result<ApiRuleset>;

    /// Entrypoint ruleset of a phase; not-found when the phase has none yet
    async fn get_phase_entrypoint(&self, scope: &Scope, phase: &str) -> Result<ApiRuleset>;

    async fn create_ruleset(&self, scope: &Scope, ruleset: &RulesetBody) -> Result<ApiRuleset>;

    async fn update_ruleset(
        &self,
        scope: &Scope,
        ruleset_id: &str,
        ruleset: &RulesetBody,
    ) -> Result<ApiRuleset>;

    async fn delete_ruleset(&self, scope: &Scope, ruleset_id: &str) -> Result<()>;
}

#[async_trait]
impl RulesetApi for CloudflareApi {
    async fn get_ruleset(&self, scope: &Scope, ruleset_id: &str) -> Result<ApiRuleset> {
        self.get(&format!("{}/rulesets/{}", scope.path(), ruleset_id))
            .await
    }

    async fn get_phase_entrypoint(&self, scope: &Scope, phase: &str) -> Result<ApiRuleset> {
        self.get(&format!(
            "{}/rulesets/phases/{}/entrypoint",
            scope.path(),
            phase
        ))
        .await
    }

    async fn create_ruleset(&self, scope: &Scope, ruleset: &RulesetBody) -> Result<ApiRuleset> {
        self.post(&format!("{}/rulesets", scope.path()), ruleset)
            .await
    }

    async fn update_ruleset(
        &self,
        scope: &Scope,
        ruleset_id: &str,
        ruleset: &RulesetBody,
    ) -> Result<ApiRuleset> {
        self.put(
            &format!("{}/rulesets/{}", scope.path(), ruleset_id),
            ruleset,
        )
        .await
    }

    async fn delete_ruleset(&self, scope: &Scope, ruleset_id: &str) -> Result<()> {
        self.delete(&format!("{}/rulesets/{}", scope.path(), ruleset_id))
            .await
    }
}
