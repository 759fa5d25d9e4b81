//! Single rules inside a phase entrypoint ruleset
//!
//! Cloudflare only exposes the whole ruleset, so every write is
//! read-modify-write: find (or create) the entrypoint for (scope, phase),
//! splice our rule in or out, and put the ruleset back. Right before the put
//! the ruleset version is read again; if somebody else wrote in between the
//! write is abandoned with a retryable conflict.
//!
//! External names record where the rule lives as
//! `<zones|accounts>/<id>/<phase>/<rule id>`. A bare rule ID (an adopted
//! rule) is looked up at the desired scope and phase.

use crate::api::{ApiRule, ApiRuleset, RulesetApi, RulesetBody};
use crate::connector::Profile;
use crate::error::{CloudflareError, ResultExt};
use crate::resources::ruleset::rule_matches;
use crate::scope::Scope;
use async_trait::async_trait;
use flaresync_cloud::{CloudError, Creation, ErrorClass, ExternalClient, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

/// A kind stored as one rule of a phase entrypoint
pub trait PhaseRuleKind: ResourceKind<Observation = PhaseRuleObservation> {
    /// Used in error messages ("cannot create cache rule")
    const NOUN: &'static str;

    fn scope(params: &Self::Params) -> Result<Scope>;

    fn phase(params: &Self::Params) -> Result<&'static str>;

    /// Rule to write, without an ID
    fn to_rule(params: &Self::Params) -> Result<ApiRule>;

    fn rule_matches(params: &Self::Params, observed: &PhaseRuleObservation) -> Result<bool> {
        Ok(rule_matches(&Self::to_rule(params)?, &observed.rule))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRuleObservation {
    pub ruleset_id: String,
    pub ruleset_version: String,
    pub phase: String,
    pub rule: ApiRule,
}

pub fn generate_observation(ruleset: &ApiRuleset, rule: &ApiRule) -> PhaseRuleObservation {
    PhaseRuleObservation {
        ruleset_id: ruleset.id.clone(),
        ruleset_version: ruleset.version.clone(),
        phase: ruleset.phase.clone(),
        rule: rule.clone(),
    }
}

pub fn is_up_to_date<K: PhaseRuleKind>(
    params: &K::Params,
    observed: &PhaseRuleObservation,
) -> Result<bool> {
    let phase = K::phase(params)?;
    if phase != observed.phase {
        return Err(CloudError::ImmutableField {
            field: "phase".to_string(),
            desired: phase.to_string(),
            observed: observed.phase.clone(),
        });
    }
    K::rule_matches(params, observed)
}

/// Everything a verb needs, resolved before the first remote call
#[derive(Debug, Clone, PartialEq)]
struct Target {
    scope: Scope,
    phase: String,
}

impl Target {
    fn external_name(&self, rule_id: &str) -> String {
        format!("{}/{}/{}", self.scope.path(), self.phase, rule_id)
    }
}

/// Split an external name into the recorded location (if any) and rule ID
fn parse_external_name(external_name: &str) -> Result<(Option<Target>, &str)> {
    let parts: Vec<&str> = external_name.split('/').collect();
    match parts.as_slice() {
        [rule_id] => Ok((None, *rule_id)),
        [kind, id, phase, rule_id] if !id.is_empty() && !rule_id.is_empty() => {
            let scope = match *kind {
                "zones" => Scope::Zone(id.to_string()),
                "accounts" => Scope::Account(id.to_string()),
                _ => {
                    return Err(CloudError::Conversion(format!(
                        "external name {}: unknown scope {}",
                        external_name, kind
                    )));
                }
            };
            Ok((
                Some(Target {
                    scope,
                    phase: phase.to_string(),
                }),
                *rule_id,
            ))
        }
        _ => Err(CloudError::Conversion(format!(
            "external name {} is neither a rule ID nor <scope>/<id>/<phase>/<rule id>",
            external_name
        ))),
    }
}

/// The desired location must be the one the rule was created in
fn same_location(desired: &Target, recorded: &Target) -> Result<()> {
    if desired.phase != recorded.phase {
        return Err(CloudError::ImmutableField {
            field: "phase".to_string(),
            desired: desired.phase.clone(),
            observed: recorded.phase.clone(),
        });
    }
    if desired.scope != recorded.scope {
        let field = match &recorded.scope {
            Scope::Zone(_) => "zoneId",
            Scope::Account(_) => "accountId",
        };
        return Err(CloudError::ImmutableField {
            field: field.to_string(),
            desired: desired.scope.to_string(),
            observed: recorded.scope.to_string(),
        });
    }
    Ok(())
}

pub struct PhaseRuleClient<K> {
    profile: Arc<Profile>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: PhaseRuleKind> PhaseRuleClient<K> {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self {
            profile,
            _kind: PhantomData,
        }
    }

    fn context(verb: &str) -> String {
        format!("cannot {} {}", verb, K::NOUN)
    }

    fn not_found(verb: &str, message: String) -> CloudError {
        CloudError::remote(
            Self::context(verb),
            ErrorClass::NotFound,
            CloudflareError::not_found(message),
        )
    }

    fn target(params: &K::Params) -> Result<Target> {
        Ok(Target {
            scope: K::scope(params)?,
            phase: K::phase(params)?.to_string(),
        })
    }

    /// Desired target and rule ID, refusing a target that moved
    fn locate<'a>(external_name: &'a str, params: &K::Params) -> Result<(Target, &'a str)> {
        let desired = Self::target(params)?;
        let (recorded, rule_id) = parse_external_name(external_name)?;
        if let Some(recorded) = recorded {
            same_location(&desired, &recorded)?;
        }
        Ok((desired, rule_id))
    }

    /// Entrypoint of the phase, `None` when the phase has none yet
    async fn entrypoint(&self, target: &Target, verb: &str) -> Result<Option<ApiRuleset>> {
        match self
            .profile
            .api
            .get_phase_entrypoint(&target.scope, &target.phase)
            .await
            .context(&Self::context(verb))
        {
            Ok(ruleset) => Ok(Some(ruleset)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Put `rules` into `ruleset` unless its version moved since it was read
    async fn write(
        &self,
        target: &Target,
        ruleset: &ApiRuleset,
        rules: Vec<ApiRule>,
        verb: &str,
    ) -> Result<ApiRuleset> {
        let current = self
            .profile
            .api
            .get_ruleset(&target.scope, &ruleset.id)
            .await
            .context(&Self::context(verb))?;
        if current.version != ruleset.version {
            return Err(CloudError::Conflict(format!(
                "{} ruleset {} in {} changed from version {} to {} during {}",
                target.phase, ruleset.id, target.scope, ruleset.version, current.version, verb
            )));
        }

        let body = RulesetBody {
            name: current.name,
            description: current.description,
            kind: current.kind,
            phase: current.phase,
            rules,
        };
        self.profile
            .api
            .update_ruleset(&target.scope, &ruleset.id, &body)
            .await
            .context(&Self::context(verb))
    }
}

#[async_trait]
impl<K: PhaseRuleKind> ExternalClient<K> for PhaseRuleClient<K> {
    async fn observe(&self, external_name: &str, params: &K::Params) -> Result<PhaseRuleObservation> {
        let (target, rule_id) = Self::locate(external_name, params)?;
        K::to_rule(params)?;
        let ruleset = self
            .entrypoint(&target, "get")
            .await?
            .ok_or_else(|| Self::not_found("get", format!("no {} ruleset in {}", target.phase, target.scope)))?;
        let rule = ruleset
            .rules
            .iter()
            .find(|r| r.id.as_deref() == Some(rule_id))
            .ok_or_else(|| {
                Self::not_found("get", format!("rule {} not found in ruleset {}", rule_id, ruleset.id))
            })?;
        Ok(generate_observation(&ruleset, rule))
    }

    async fn create(&self, params: &K::Params) -> Result<Creation<PhaseRuleObservation>> {
        let target = Self::target(params)?;
        let rule = K::to_rule(params)?;

        let ruleset = match self.entrypoint(&target, "create").await? {
            Some(ruleset) => ruleset,
            None => {
                tracing::info!(phase = %target.phase, scope = %target.scope, "Creating phase entrypoint ruleset");
                let empty = RulesetBody {
                    name: "default".to_string(),
                    description: String::new(),
                    kind: target.scope.entrypoint_kind().to_string(),
                    phase: target.phase.clone(),
                    rules: Vec::new(),
                };
                self.profile
                    .api
                    .create_ruleset(&target.scope, &empty)
                    .await
                    .context(&Self::context("create"))?
            }
        };

        let prior: HashSet<String> = ruleset.rules.iter().filter_map(|r| r.id.clone()).collect();
        let mut rules = ruleset.rules.clone();
        rules.push(rule.clone());
        let written = self.write(&target, &ruleset, rules, "create").await?;

        let created = written
            .rules
            .iter()
            .find(|r| {
                r.expression == rule.expression
                    && r.action == rule.action
                    && r.id.as_ref().is_some_and(|id| !prior.contains(id))
            })
            .ok_or_else(|| {
                CloudError::Conflict(format!(
                    "created {} not found in ruleset {}",
                    K::NOUN,
                    written.id
                ))
            })?;
        let rule_id = created.id.clone().unwrap_or_default();
        Ok(Creation {
            external_name: target.external_name(&rule_id),
            observation: generate_observation(&written, created),
        })
    }

    async fn update(&self, external_name: &str, params: &K::Params) -> Result<PhaseRuleObservation> {
        let (target, rule_id) = Self::locate(external_name, params)?;
        let mut rule = K::to_rule(params)?;
        rule.id = Some(rule_id.to_string());

        let ruleset = self.entrypoint(&target, "update").await?.ok_or_else(|| {
            Self::not_found("update", format!("no {} ruleset in {}", target.phase, target.scope))
        })?;
        let mut rules = ruleset.rules.clone();
        let slot = rules
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(rule_id))
            .ok_or_else(|| {
                Self::not_found("update", format!("rule {} not found in ruleset {}", rule_id, ruleset.id))
            })?;
        *slot = rule;

        let written = self.write(&target, &ruleset, rules, "update").await?;
        let updated = written
            .rules
            .iter()
            .find(|r| r.id.as_deref() == Some(rule_id))
            .ok_or_else(|| {
                Self::not_found("update", format!("rule {} not found in ruleset {}", rule_id, written.id))
            })?;
        Ok(generate_observation(&written, updated))
    }

    async fn delete(&self, external_name: &str, params: &K::Params) -> Result<()> {
        // Deletion acts where the rule was created, even if the spec moved
        let (recorded, rule_id) = parse_external_name(external_name)?;
        let target = match recorded {
            Some(recorded) => recorded,
            None => Self::target(params)?,
        };
        let Some(ruleset) = self.entrypoint(&target, "delete").await? else {
            return Ok(());
        };
        let rules: Vec<ApiRule> = ruleset
            .rules
            .iter()
            .filter(|r| r.id.as_deref() != Some(rule_id))
            .cloned()
            .collect();
        if rules.len() == ruleset.rules.len() {
            return Ok(());
        }
        self.write(&target, &ruleset, rules, "delete").await?;
        Ok(())
    }

    fn is_up_to_date(&self, params: &K::Params, observed: &PhaseRuleObservation) -> Result<bool> {
        is_up_to_date::<K>(params, observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CloudflareApis;
    use crate::resources::cache_rule::{CacheRule, CacheRuleParams, PHASE};
    use crate::resources::transform_rule::{
        HeaderAction, TransformRule, TransformRuleParams, TransformType,
    };
    use std::collections::BTreeMap;
    use crate::testing::FakeCloudflare;
    use flaresync_cloud::Field;

    fn params(expression: &str) -> CacheRuleParams {
        CacheRuleParams {
            zone_id: Field::Set("zone-a".to_string()),
            account_id: Field::Unset,
            expression: expression.to_string(),
            description: Field::Unset,
            enabled: Field::Unset,
            cache: Field::Set(true),
            edge_ttl: Field::Unset,
            browser_ttl: Field::Unset,
            respect_strong_etags: Field::Unset,
            origin_error_page_passthru: Field::Unset,
            serve_stale: Field::Unset,
            additional_cacheable_ports: Field::Unset,
        }
    }

    fn client(fake: &Arc<FakeCloudflare>) -> PhaseRuleClient<CacheRule> {
        PhaseRuleClient::new(Arc::new(Profile::new(
            "default",
            fake.clone() as Arc<dyn CloudflareApis>,
            None,
        )))
    }

    fn zone() -> Scope {
        Scope::Zone("zone-a".to_string())
    }

    fn rule_id(external_name: &str) -> Option<&str> {
        external_name.rsplit('/').next()
    }

    #[tokio::test]
    async fn test_create_without_entrypoint_creates_empty_ruleset_first() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let desired = params("http.host eq \"static.example.com\"");

        let created = client.create(&desired).await.unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "get_phase_entrypoint",
                "create_ruleset",
                "get_ruleset",
                "update_ruleset"
            ]
        );
        let rules = fake.phase_rules(&zone(), PHASE);
        assert_eq!(rules.len(), 1);
        assert_eq!(
            created.external_name,
            format!("zones/zone-a/{}/{}", PHASE, rules[0].id.as_deref().unwrap())
        );
        assert_eq!(created.observation.phase, PHASE);
        assert!(client.is_up_to_date(&desired, &created.observation).unwrap());
    }

    #[tokio::test]
    async fn test_create_appends_and_matches_the_new_rule() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let first = client.create(&params("true")).await.unwrap();
        // same (expression, action) as an existing rule
        let second = client.create(&params("true")).await.unwrap();

        assert_ne!(first.external_name, second.external_name);
        let rules = fake.phase_rules(&zone(), PHASE);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].id.as_deref(), rule_id(&second.external_name));
        assert_eq!(fake.count("create_ruleset"), 1);
    }

    #[tokio::test]
    async fn test_observe_missing_rule_is_not_found() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);

        let err = client.observe("rule-9", &params("true")).await.unwrap_err();
        assert!(err.is_not_found());

        client.create(&params("true")).await.unwrap();
        let err = client.observe("rule-9", &params("true")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("cannot get cache rule"));
    }

    #[tokio::test]
    async fn test_update_replaces_rule_in_place() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let a = client.create(&params("a")).await.unwrap();
        let b = client.create(&params("b")).await.unwrap();

        let mut changed = params("a2");
        changed.cache = Field::Set(false);
        let observed = client.update(&a.external_name, &changed).await.unwrap();

        assert_eq!(observed.rule.id.as_deref(), rule_id(&a.external_name));
        assert!(client.is_up_to_date(&changed, &observed).unwrap());
        let rules = fake.phase_rules(&zone(), PHASE);
        assert_eq!(rules[0].expression, "a2");
        assert_eq!(rules[1].id.as_deref(), rule_id(&b.external_name));
    }

    #[tokio::test]
    async fn test_version_moved_before_write_is_a_conflict() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let created = client.create(&params("a")).await.unwrap();

        fake.race_next_ruleset_read();
        let err = client
            .update(&created.external_name, &params("b"))
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Conflict(_)));
        assert!(!err.requires_spec_change());
        assert_eq!(fake.phase_rules(&zone(), PHASE)[0].expression, "a");
    }

    #[tokio::test]
    async fn test_delete_removes_only_our_rule() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let a = client.create(&params("a")).await.unwrap();
        client.create(&params("b")).await.unwrap();

        client.delete(&a.external_name, &params("a")).await.unwrap();
        let rules = fake.phase_rules(&zone(), PHASE);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].expression, "b");

        fake.clear_calls();
        client.delete(&a.external_name, &params("a")).await.unwrap();
        assert_eq!(fake.count("update_ruleset"), 0);
    }

    #[tokio::test]
    async fn test_scope_violation_makes_no_remote_call() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let mut desired = params("a");
        desired.account_id = Field::Set("acc-1".to_string());

        assert!(matches!(
            client.create(&desired).await,
            Err(CloudError::ScopeConfiguration(_))
        ));
        assert!(matches!(
            client.delete("rule-1", &desired).await,
            Err(CloudError::ScopeConfiguration(_))
        ));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_adopted_rule_id_is_found_at_desired_location() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let created = client.create(&params("a")).await.unwrap();
        let bare = rule_id(&created.external_name).unwrap();

        let observed = client.observe(bare, &params("a")).await.unwrap();
        assert_eq!(observed.rule.id.as_deref(), Some(bare));
        assert!(client.observe("zones/zone-a", &params("a")).await.is_err());
    }

    fn transform(transform_type: TransformType) -> TransformRuleParams {
        let mut headers = BTreeMap::new();
        headers.insert(
            "X-Test".to_string(),
            HeaderAction {
                operation: "set".to_string(),
                value: Field::Set("1".to_string()),
                expression: Field::Unset,
            },
        );
        TransformRuleParams {
            zone_id: Field::Set("zone-a".to_string()),
            account_id: Field::Unset,
            transform_type,
            expression: "true".to_string(),
            description: Field::Unset,
            enabled: Field::Unset,
            uri: Field::Unset,
            headers: Field::Set(headers),
        }
    }

    #[tokio::test]
    async fn test_transform_type_change_is_rejected_before_lookup() {
        let fake = FakeCloudflare::new();
        let client: PhaseRuleClient<TransformRule> = PhaseRuleClient::new(Arc::new(Profile::new(
            "default",
            fake.clone() as Arc<dyn CloudflareApis>,
            None,
        )));
        let created = client
            .create(&transform(TransformType::RequestHeaders))
            .await
            .unwrap();
        fake.clear_calls();

        let moved = transform(TransformType::ResponseHeaders);
        let err = client.observe(&created.external_name, &moved).await.unwrap_err();
        assert!(
            matches!(err, CloudError::ImmutableField { ref field, .. } if field == "phase"),
            "{:?}",
            err
        );
        assert!(err.requires_spec_change());
        assert!(client.update(&created.external_name, &moved).await.is_err());
        assert!(fake.calls().is_empty(), "unexpected calls: {:?}", fake.calls());
        assert!(fake.phase_rules(&zone(), TransformType::ResponseHeaders.phase()).is_empty());

        // deleting still removes the rule from the phase it was created in
        client.delete(&created.external_name, &moved).await.unwrap();
        assert!(fake.phase_rules(&zone(), TransformType::RequestHeaders.phase()).is_empty());
    }

    #[tokio::test]
    async fn test_zone_change_is_rejected_before_lookup() {
        let fake = FakeCloudflare::new();
        let client = client(&fake);
        let created = client.create(&params("a")).await.unwrap();
        fake.clear_calls();

        let mut moved = params("a");
        moved.zone_id = Field::Set("zone-b".to_string());
        let err = client.observe(&created.external_name, &moved).await.unwrap_err();
        match err {
            CloudError::ImmutableField { field, desired, observed } => {
                assert_eq!(field, "zoneId");
                assert_eq!(desired, "zone zone-b");
                assert_eq!(observed, "zone zone-a");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let mut account = params("a");
        account.zone_id = Field::Unset;
        account.account_id = Field::Set("acc-1".to_string());
        assert!(matches!(
            client.observe(&created.external_name, &account).await,
            Err(CloudError::ImmutableField { .. })
        ));
        assert!(fake.calls().is_empty(), "unexpected calls: {:?}", fake.calls());

        client.delete(&created.external_name, &moved).await.unwrap();
        assert!(fake.phase_rules(&zone(), PHASE).is_empty());
    }
}
