//! Provider profile resolution
//!
//! A [`Connection`] owns one API client per provider profile and is shared by
//! every kind's connector, so HTTP connection pools and the account ID memo
//! outlive individual reconciles.

use crate::api::{AccountApi, CloudflareApi, CloudflareApis};
use crate::error::ResultExt;
use flaresync_cloud::{CloudError, Field, Managed, ResourceKind, Result};
use flaresync_config::{DEFAULT_PROFILE, ProviderConfig, Settings};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock};

/// Builds an API client for a resolved profile
pub type ApiFactory = Arc<dyn Fn(&ProviderConfig) -> Arc<dyn CloudflareApis> + Send + Sync>;

/// API client plus per-profile caches
pub struct Profile {
    pub name: String,
    pub api: Arc<dyn CloudflareApis>,
    configured_account: Option<String>,
    account_id: OnceLock<String>,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        api: Arc<dyn CloudflareApis>,
        configured_account: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api,
            configured_account: configured_account.filter(|a| !a.is_empty()),
            account_id: OnceLock::new(),
        }
    }

    /// Account to act on. Uses the configured account, otherwise looks up the
    /// first account the token can see and remembers it. Concurrent first
    /// lookups may both hit the API; the first stored value wins.
    pub async fn account_id(&self) -> Result<String> {
        if let Some(account) = &self.configured_account {
            return Ok(account.clone());
        }
        if let Some(account) = self.account_id.get() {
            return Ok(account.clone());
        }

        let accounts = self
            .api
            .list_accounts()
            .await
            .context("cannot list accounts")?;
        let first = accounts.into_iter().next().ok_or_else(|| {
            CloudError::InvalidConfig(format!(
                "profile '{}' has no accountId and its token cannot see any account",
                self.name
            ))
        })?;

        tracing::debug!(profile = %self.name, account_id = %first.id, "Resolved account ID");
        Ok(self.account_id.get_or_init(|| first.id).clone())
    }

    /// Explicit account from params, falling back to the profile's account
    pub async fn resolve_account(&self, explicit: &Field<String>) -> Result<String> {
        match explicit.get().filter(|a| !a.is_empty()) {
            Some(account) => Ok(account.clone()),
            None => self.account_id().await,
        }
    }
}

pub struct Connection {
    settings: Settings,
    factory: ApiFactory,
    profiles: Mutex<HashMap<String, Arc<Profile>>>,
}

impl Connection {
    pub fn new(settings: Settings) -> Self {
        Self::with_factory(
            settings,
            Arc::new(|config: &ProviderConfig| {
                let token = config.api_token().unwrap_or_default();
                Arc::new(CloudflareApi::new(token, config.api_base.as_deref()))
                    as Arc<dyn CloudflareApis>
            }),
        )
    }

    pub fn with_factory(settings: Settings, factory: ApiFactory) -> Self {
        Self {
            settings,
            factory,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Client for a named profile (`None` is the default profile)
    pub fn profile(&self, name: Option<&str>) -> Result<Arc<Profile>> {
        let key = name.unwrap_or(DEFAULT_PROFILE);
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|_| CloudError::StateError("profile cache poisoned".to_string()))?;
        if let Some(profile) = profiles.get(key) {
            return Ok(profile.clone());
        }

        let config = self
            .settings
            .profile(name)
            .map_err(|e| CloudError::InvalidConfig(e.to_string()))?;
        let profile = Arc::new(Profile::new(
            key,
            (self.factory)(config),
            config.account_id.clone(),
        ));
        profiles.insert(key.to_string(), profile.clone());
        Ok(profile)
    }

    /// Profile referenced by a managed resource
    pub fn profile_for<K: ResourceKind>(&self, resource: &Managed<K>) -> Result<Arc<Profile>> {
        self.profile(resource.spec.provider_config_ref.as_deref())
    }
}

/// Per-kind connector; the `Connector` impls live next to each kind
pub struct CloudflareConnector<K> {
    pub(crate) connection: Arc<Connection>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> CloudflareConnector<K> {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            _kind: PhantomData,
        }
    }
}
