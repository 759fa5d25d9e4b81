//! Controller wiring for every Cloudflare kind

use crate::connector::{CloudflareConnector, Connection};
use crate::resources::{
    BotManagement, CacheRule, DnsRecord, R2Bucket, RateLimitRule, Ruleset, TransformRule,
    TurnstileWidget, Zone,
};
use flaresync_cloud::{
    Connector, Controller, ControllerOptions, ControllerRegistry, FileStore, Reconciler,
    ResourceKind, ResourceStore, RetryConfig,
};
use flaresync_config::ControllerSettings;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Kinds served by this crate, in registration order
pub const KINDS: [&str; 9] = [
    Zone::KIND,
    DnsRecord::KIND,
    R2Bucket::KIND,
    TurnstileWidget::KIND,
    BotManagement::KIND,
    Ruleset::KIND,
    TransformRule::KIND,
    CacheRule::KIND,
    RateLimitRule::KIND,
];

pub fn controller_options(settings: &ControllerSettings) -> ControllerOptions {
    ControllerOptions {
        max_concurrent_reconciles: settings.max_concurrent_reconciles,
        poll_interval: settings.poll_interval(),
        resync_interval: settings.resync_interval(),
        reconcile_timeout: settings.reconcile_timeout(),
        retry: RetryConfig {
            initial_delay: Duration::from_secs(settings.backoff.initial_secs),
            max_delay: Duration::from_secs(settings.backoff.max_secs),
            backoff_multiplier: settings.backoff.multiplier,
        },
    }
}

fn controller<K>(
    project_root: &Path,
    connection: &Arc<Connection>,
    options: &ControllerOptions,
) -> Controller<K>
where
    K: ResourceKind,
    CloudflareConnector<K>: Connector<K>,
{
    let store: Arc<dyn ResourceStore<K>> = Arc::new(FileStore::<K>::new(project_root));
    let connector: Arc<dyn Connector<K>> =
        Arc::new(CloudflareConnector::<K>::new(connection.clone()));
    let reconciler = Reconciler::new(connector, store.clone(), options.poll_interval);
    Controller::new(reconciler, store, options.clone())
}

/// One controller per kind, all backed by the state files under `project_root`
pub fn build_registry(
    project_root: &Path,
    connection: Arc<Connection>,
    options: &ControllerOptions,
) -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry
        .register(controller::<Zone>(project_root, &connection, options))
        .register(controller::<DnsRecord>(project_root, &connection, options))
        .register(controller::<R2Bucket>(project_root, &connection, options))
        .register(controller::<TurnstileWidget>(project_root, &connection, options))
        .register(controller::<BotManagement>(project_root, &connection, options))
        .register(controller::<Ruleset>(project_root, &connection, options))
        .register(controller::<TransformRule>(project_root, &connection, options))
        .register(controller::<CacheRule>(project_root, &connection, options))
        .register(controller::<RateLimitRule>(project_root, &connection, options));
    registry
}
