//! In-memory Cloudflare used by adapter and end-to-end tests

use crate::api::*;
use crate::error::{CloudflareError, Result};
use crate::scope::Scope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FakeState {
    pub zones: HashMap<String, ApiZone>,
    pub dns_records: HashMap<(String, String), ApiDnsRecord>,
    pub buckets: HashMap<(String, String), ApiR2Bucket>,
    pub widgets: HashMap<(String, String), ApiTurnstileWidget>,
    pub bot_management: HashMap<String, ApiBotManagement>,
    /// keyed by (scope path, ruleset id)
    pub rulesets: HashMap<(String, String), ApiRuleset>,
}

#[derive(Default)]
pub struct FakeCloudflare {
    pub state: Mutex<FakeState>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicU32,
    fail_next: Mutex<Option<(u16, Option<i64>, String)>>,
    /// Bump the ruleset version on the next `get_ruleset`, as if somebody
    /// else wrote it in between
    race_next_ruleset_read: Mutex<bool>,
}

impl FakeCloudflare {
    pub const ACCOUNT_ID: &'static str = "acc-1";

    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_next(&self, status: u16, code: Option<i64>, message: &str) {
        *self.fail_next.lock().unwrap() = Some((status, code, message.to_string()));
    }

    pub fn race_next_ruleset_read(&self) {
        *self.race_next_ruleset_read.lock().unwrap() = true;
    }

    fn enter(&self, call: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call.to_string());
        match self.fail_next.lock().unwrap().take() {
            Some((status, code, message)) => Err(CloudflareError::api(status, code, message)),
            None => Ok(()),
        }
    }

    fn id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn insert_zone(&self, zone: ApiZone) {
        self.state.lock().unwrap().zones.insert(zone.id.clone(), zone);
    }

    pub fn zone(id: &str, name: &str) -> ApiZone {
        ApiZone {
            id: id.to_string(),
            name: name.to_string(),
            status: "active".to_string(),
            paused: false,
            zone_type: "full".to_string(),
            name_servers: vec!["ada.ns.cloudflare.com".into(), "bob.ns.cloudflare.com".into()],
            vanity_name_servers: Vec::new(),
            account: Some(zone::ZoneAccount {
                id: Self::ACCOUNT_ID.to_string(),
                name: "Test".to_string(),
            }),
        }
    }

    /// All rules of the entrypoint ruleset for (scope, phase)
    pub fn phase_rules(&self, scope: &Scope, phase: &str) -> Vec<ApiRule> {
        self.find_entrypoint(scope, phase)
            .map(|r| r.rules)
            .unwrap_or_default()
    }

    fn find_entrypoint(&self, scope: &Scope, phase: &str) -> Option<ApiRuleset> {
        let path = scope.path();
        self.state
            .lock()
            .unwrap()
            .rulesets
            .iter()
            .find(|((p, _), r)| {
                *p == path && r.phase == phase && r.kind == scope.entrypoint_kind()
            })
            .map(|(_, r)| r.clone())
    }

    fn assign_rule_ids(&self, rules: &[ApiRule]) -> Vec<ApiRule> {
        rules
            .iter()
            .cloned()
            .map(|mut rule| {
                if rule.id.is_none() {
                    rule.id = Some(self.id("rule"));
                }
                rule
            })
            .collect()
    }
}

fn not_found(what: &str) -> CloudflareError {
    CloudflareError::not_found(format!("{} not found", what))
}

#[async_trait]
impl AccountApi for FakeCloudflare {
    async fn list_accounts(&self) -> Result<Vec<ApiAccount>> {
        self.enter("list_accounts")?;
        Ok(vec![ApiAccount {
            id: Self::ACCOUNT_ID.to_string(),
            name: "Test".to_string(),
        }])
    }
}

#[async_trait]
impl ZoneApi for FakeCloudflare {
    async fn get_zone(&self, zone_id: &str) -> Result<ApiZone> {
        self.enter("get_zone")?;
        self.state
            .lock()
            .unwrap()
            .zones
            .get(zone_id)
            .cloned()
            .ok_or_else(|| CloudflareError::api(400, Some(7003), "Could not route to /zones"))
    }

    async fn create_zone(&self, zone: &ZoneCreate) -> Result<ApiZone> {
        self.enter("create_zone")?;
        let mut created = Self::zone(&self.id("zone"), &zone.name);
        created.status = "pending".to_string();
        if let Some(zone_type) = &zone.zone_type {
            created.zone_type = zone_type.clone();
        }
        if let Some(account) = created.account.as_mut() {
            account.id = zone.account.id.clone();
        }
        self.insert_zone(created.clone());
        Ok(created)
    }

    async fn edit_zone(&self, zone_id: &str, edit: &ZoneEdit) -> Result<ApiZone> {
        self.enter("edit_zone")?;
        let mut state = self.state.lock().unwrap();
        let zone = state.zones.get_mut(zone_id).ok_or_else(|| not_found("zone"))?;
        if let Some(paused) = edit.paused {
            zone.paused = paused;
        }
        if let Some(zone_type) = &edit.zone_type {
            zone.zone_type = zone_type.clone();
        }
        if let Some(ns) = &edit.vanity_name_servers {
            zone.vanity_name_servers = ns.clone();
        }
        Ok(zone.clone())
    }

    async fn delete_zone(&self, zone_id: &str) -> Result<()> {
        self.enter("delete_zone")?;
        self.state
            .lock()
            .unwrap()
            .zones
            .remove(zone_id)
            .map(|_| ())
            .ok_or_else(|| not_found("zone"))
    }
}

#[async_trait]
impl DnsRecordApi for FakeCloudflare {
    async fn get_dns_record(&self, zone_id: &str, record_id: &str) -> Result<ApiDnsRecord> {
        self.enter("get_dns_record")?;
        self.state
            .lock()
            .unwrap()
            .dns_records
            .get(&(zone_id.to_string(), record_id.to_string()))
            .cloned()
            .ok_or_else(|| CloudflareError::api(404, Some(81044), "Record does not exist."))
    }

    async fn create_dns_record(
        &self,
        zone_id: &str,
        record: &DnsRecordBody,
    ) -> Result<ApiDnsRecord> {
        self.enter("create_dns_record")?;
        let zone_name = self
            .state
            .lock()
            .unwrap()
            .zones
            .get(zone_id)
            .map(|z| z.name.clone())
            .unwrap_or_else(|| "example.com".to_string());
        let created = ApiDnsRecord {
            id: self.id("rec"),
            name: qualify(&record.name, &zone_name),
            r#type: record.r#type.clone(),
            content: record.content.clone(),
            ttl: record.ttl.unwrap_or(1),
            proxied: Some(record.proxied.unwrap_or(false)),
            priority: record.priority,
            comment: record.comment.clone(),
            tags: record.tags.clone().unwrap_or_default(),
            zone_name: Some(zone_name),
        };
        self.state
            .lock()
            .unwrap()
            .dns_records
            .insert((zone_id.to_string(), created.id.clone()), created.clone());
        Ok(created)
    }

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecordBody,
    ) -> Result<ApiDnsRecord> {
        self.enter("update_dns_record")?;
        let mut state = self.state.lock().unwrap();
        let zone_name = state
            .zones
            .get(zone_id)
            .map(|z| z.name.clone())
            .unwrap_or_else(|| "example.com".to_string());
        let existing = state
            .dns_records
            .get_mut(&(zone_id.to_string(), record_id.to_string()))
            .ok_or_else(|| CloudflareError::api(404, Some(81044), "Record does not exist."))?;
        existing.name = qualify(&record.name, &zone_name);
        existing.r#type = record.r#type.clone();
        existing.content = record.content.clone();
        if let Some(ttl) = record.ttl {
            existing.ttl = ttl;
        }
        if let Some(proxied) = record.proxied {
            existing.proxied = Some(proxied);
        }
        if let Some(priority) = record.priority {
            existing.priority = Some(priority);
        }
        if let Some(comment) = &record.comment {
            existing.comment = Some(comment.clone());
        }
        if let Some(tags) = &record.tags {
            existing.tags = tags.clone();
        }
        Ok(existing.clone())
    }

    async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        self.enter("delete_dns_record")?;
        self.state
            .lock()
            .unwrap()
            .dns_records
            .remove(&(zone_id.to_string(), record_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| CloudflareError::api(404, Some(81044), "Record does not exist."))
    }
}

fn qualify(name: &str, zone: &str) -> String {
    if name == "@" || name == zone {
        zone.to_string()
    } else if name.ends_with(&format!(".{}", zone)) {
        name.to_string()
    } else {
        format!("{}.{}", name, zone)
    }
}

#[async_trait]
impl R2Api for FakeCloudflare {
    async fn get_bucket(&self, account_id: &str, name: &str) -> Result<ApiR2Bucket> {
        self.enter("get_bucket")?;
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(&(account_id.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                CloudflareError::api(404, Some(10006), "The specified bucket does not exist.")
            })
    }

    async fn create_bucket(
        &self,
        account_id: &str,
        bucket: &R2BucketCreate,
    ) -> Result<ApiR2Bucket> {
        self.enter("create_bucket")?;
        let created = ApiR2Bucket {
            name: bucket.name.clone(),
            creation_date: Some("2024-01-01T00:00:00.000Z".to_string()),
            location: bucket.location_hint.as_ref().map(|l| l.to_uppercase()),
            storage_class: Some(
                bucket
                    .storage_class
                    .clone()
                    .unwrap_or_else(|| "Standard".to_string()),
            ),
        };
        self.state
            .lock()
            .unwrap()
            .buckets
            .insert((account_id.to_string(), bucket.name.clone()), created.clone());
        Ok(created)
    }

    async fn set_bucket_storage_class(
        &self,
        account_id: &str,
        name: &str,
        storage_class: &str,
    ) -> Result<ApiR2Bucket> {
        self.enter("set_bucket_storage_class")?;
        let mut state = self.state.lock().unwrap();
        let bucket = state
            .buckets
            .get_mut(&(account_id.to_string(), name.to_string()))
            .ok_or_else(|| not_found("bucket"))?;
        bucket.storage_class = Some(storage_class.to_string());
        Ok(bucket.clone())
    }

    async fn delete_bucket(&self, account_id: &str, name: &str) -> Result<()> {
        self.enter("delete_bucket")?;
        self.state
            .lock()
            .unwrap()
            .buckets
            .remove(&(account_id.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                CloudflareError::api(404, Some(10006), "The specified bucket does not exist.")
            })
    }
}

#[async_trait]
impl TurnstileApi for FakeCloudflare {
    async fn get_widget(&self, account_id: &str, sitekey: &str) -> Result<ApiTurnstileWidget> {
        self.enter("get_widget")?;
        self.state
            .lock()
            .unwrap()
            .widgets
            .get(&(account_id.to_string(), sitekey.to_string()))
            .cloned()
            .ok_or_else(|| not_found("widget"))
    }

    async fn create_widget(
        &self,
        account_id: &str,
        widget: &TurnstileWidgetBody,
    ) -> Result<ApiTurnstileWidget> {
        self.enter("create_widget")?;
        let created = ApiTurnstileWidget {
            sitekey: self.id("0x4AAA"),
            name: widget.name.clone(),
            domains: widget.domains.clone(),
            mode: widget.mode.clone(),
            bot_fight_mode: widget.bot_fight_mode.unwrap_or(false),
            region: Some(widget.region.clone().unwrap_or_else(|| "world".to_string())),
            created_on: Some("2024-01-01T00:00:00Z".to_string()),
            modified_on: Some("2024-01-01T00:00:00Z".to_string()),
        };
        self.state
            .lock()
            .unwrap()
            .widgets
            .insert((account_id.to_string(), created.sitekey.clone()), created.clone());
        Ok(created)
    }

    async fn update_widget(
        &self,
        account_id: &str,
        sitekey: &str,
        widget: &TurnstileWidgetBody,
    ) -> Result<ApiTurnstileWidget> {
        self.enter("update_widget")?;
        let mut state = self.state.lock().unwrap();
        let existing = state
            .widgets
            .get_mut(&(account_id.to_string(), sitekey.to_string()))
            .ok_or_else(|| not_found("widget"))?;
        existing.name = widget.name.clone();
        existing.domains = widget.domains.clone();
        existing.mode = widget.mode.clone();
        if let Some(bfm) = widget.bot_fight_mode {
            existing.bot_fight_mode = bfm;
        }
        if let Some(region) = &widget.region {
            existing.region = Some(region.clone());
        }
        Ok(existing.clone())
    }

    async fn delete_widget(&self, account_id: &str, sitekey: &str) -> Result<()> {
        self.enter("delete_widget")?;
        self.state
            .lock()
            .unwrap()
            .widgets
            .remove(&(account_id.to_string(), sitekey.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("widget"))
    }
}

#[async_trait]
impl BotManagementApi for FakeCloudflare {
    async fn get_bot_management(&self, zone_id: &str) -> Result<ApiBotManagement> {
        self.enter("get_bot_management")?;
        let state = self.state.lock().unwrap();
        if !state.zones.contains_key(zone_id) {
            return Err(CloudflareError::api(400, Some(7003), "Could not route to /zones"));
        }
        Ok(state
            .bot_management
            .get(zone_id)
            .cloned()
            .unwrap_or(ApiBotManagement {
                enable_js: Some(false),
                fight_mode: Some(false),
                using_latest_model: Some(true),
                ..Default::default()
            }))
    }

    async fn update_bot_management(
        &self,
        zone_id: &str,
        settings: &ApiBotManagement,
    ) -> Result<ApiBotManagement> {
        self.enter("update_bot_management")?;
        let mut state = self.state.lock().unwrap();
        if !state.zones.contains_key(zone_id) {
            return Err(CloudflareError::api(400, Some(7003), "Could not route to /zones"));
        }
        let current = state.bot_management.entry(zone_id.to_string()).or_default();
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if settings.$field.is_some() {
                    current.$field = settings.$field.clone();
                })*
            };
        }
        merge!(
            enable_js,
            fight_mode,
            ai_bots_protection,
            sbfm_definitely_automated,
            sbfm_likely_automated,
            sbfm_verified_bots,
            sbfm_static_resource_protection,
            optimize_wordpress
        );
        current.using_latest_model = Some(true);
        Ok(current.clone())
    }
}

#[async_trait]
impl RulesetApi for FakeCloudflare {
    async fn get_ruleset(&self, scope: &Scope, ruleset_id: &str) -> Result<ApiRuleset> {
        self.enter("get_ruleset")?;
        let race = std::mem::take(&mut *self.race_next_ruleset_read.lock().unwrap());
        let mut state = self.state.lock().unwrap();
        let ruleset = state
            .rulesets
            .get_mut(&(scope.path(), ruleset_id.to_string()))
            .ok_or_else(|| not_found("ruleset"))?;
        if race {
            ruleset.version = bump(&ruleset.version);
        }
        Ok(ruleset.clone())
    }

    async fn get_phase_entrypoint(&self, scope: &Scope, phase: &str) -> Result<ApiRuleset> {
        self.enter("get_phase_entrypoint")?;
        self.find_entrypoint(scope, phase)
            .ok_or_else(|| CloudflareError::api(404, Some(10007), "could not find entrypoint ruleset"))
    }

    async fn create_ruleset(&self, scope: &Scope, ruleset: &RulesetBody) -> Result<ApiRuleset> {
        self.enter("create_ruleset")?;
        let created = ApiRuleset {
            id: self.id("rs"),
            name: ruleset.name.clone(),
            description: ruleset.description.clone(),
            kind: ruleset.kind.clone(),
            phase: ruleset.phase.clone(),
            version: "1".to_string(),
            rules: self.assign_rule_ids(&ruleset.rules),
            last_updated: None,
        };
        self.state
            .lock()
            .unwrap()
            .rulesets
            .insert((scope.path(), created.id.clone()), created.clone());
        Ok(created)
    }

    async fn update_ruleset(
        &self,
        scope: &Scope,
        ruleset_id: &str,
        ruleset: &RulesetBody,
    ) -> Result<ApiRuleset> {
        self.enter("update_ruleset")?;
        let rules = self.assign_rule_ids(&ruleset.rules);
        let mut state = self.state.lock().unwrap();
        let existing = state
            .rulesets
            .get_mut(&(scope.path(), ruleset_id.to_string()))
            .ok_or_else(|| not_found("ruleset"))?;
        existing.name = ruleset.name.clone();
        existing.description = ruleset.description.clone();
        existing.rules = rules;
        existing.version = bump(&existing.version);
        Ok(existing.clone())
    }

    async fn delete_ruleset(&self, scope: &Scope, ruleset_id: &str) -> Result<()> {
        self.enter("delete_ruleset")?;
        self.state
            .lock()
            .unwrap()
            .rulesets
            .remove(&(scope.path(), ruleset_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("ruleset"))
    }
}

fn bump(version: &str) -> String {
    (version.parse::<u64>().unwrap_or(0) + 1).to_string()
}
