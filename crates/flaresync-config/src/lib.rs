pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "FLARESYNC_CONFIG";
pub const API_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";
pub const ACCOUNT_ID_ENV: &str = "CLOUDFLARE_ACCOUNT_ID";
pub const API_BASE_ENV: &str = "CLOUDFLARE_API_BASE";

/// デフォルトプロファイル名
pub const DEFAULT_PROFILE: &str = "default";

/// Cloudflare の接続設定 (1プロファイル分)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// API トークンを読む環境変数名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token_env: Option<String>,

    /// 省略時はトークンから参照できる最初のアカウントを使う
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    /// API トークンを解決する (apiToken → apiTokenEnv の順)
    pub fn api_token(&self) -> Option<String> {
        self.api_token
            .clone()
            .or_else(|| {
                self.api_token_env
                    .as_ref()
                    .and_then(|var| std::env::var(var).ok())
            })
            .filter(|t| !t.is_empty())
    }
}

/// リトライ時のバックオフ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffSettings {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

impl BackoffSettings {
    /// 倍率は 1 以上の有限値のみ (NaN や負数は遅延を壊す)
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "controller.backoff.multiplier は 1.0 以上の数値が必要です (指定値: {})",
                self.multiplier
            ));
        }
        if self.max_secs < self.initial_secs {
            return Err(format!(
                "controller.backoff.maxSecs ({}) は initialSecs ({}) 以上が必要です",
                self.max_secs, self.initial_secs
            ));
        }
        Ok(())
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_secs: default_initial_backoff_secs(),
            max_secs: default_max_backoff_secs(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

/// コントローラーの実行設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,
    #[serde(default)]
    pub backoff: BackoffSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            resync_interval_secs: default_resync_interval_secs(),
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
            backoff: BackoffSettings::default(),
        }
    }
}

impl ControllerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_resync_interval_secs() -> u64 {
    5
}

fn default_max_concurrent_reconciles() -> usize {
    5
}

fn default_reconcile_timeout_secs() -> u64 {
    60
}

fn default_initial_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// flaresync.yaml の内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// デフォルトプロファイル
    #[serde(default)]
    pub provider: ProviderConfig,

    /// 名前付きプロファイル (spec.providerConfigRef で参照)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub controller: ControllerSettings,
}

impl Settings {
    /// 設定ファイルを読み込み、環境変数で上書きする。
    /// 設定ファイルがない場合はデフォルト値 + 環境変数。
    pub fn load() -> Result<Self> {
        let mut settings = match find_config_file() {
            Ok(path) => Self::from_file(&path)?,
            Err(ConfigError::ConfigFileNotFound) => Self::default(),
            Err(e) => return Err(e),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        settings
            .controller
            .backoff
            .validate()
            .map_err(|message| ConfigError::Invalid {
                path: origin.to_string(),
                message,
            })?;
        Ok(settings)
    }

    /// CLOUDFLARE_* 環境変数でデフォルトプロファイルを上書き
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            self.provider.api_token = Some(token);
        }
        if let Ok(account_id) = std::env::var(ACCOUNT_ID_ENV) {
            self.provider.account_id = Some(account_id);
        }
        if let Ok(api_base) = std::env::var(API_BASE_ENV) {
            self.provider.api_base = Some(api_base);
        }
    }

    /// プロファイル名からプロバイダー設定を取得 (None はデフォルト)
    pub fn profile(&self, name: Option<&str>) -> Result<&ProviderConfig> {
        let (name, config) = match name {
            None | Some(DEFAULT_PROFILE) => (DEFAULT_PROFILE, &self.provider),
            Some(name) => (
                name,
                self.profiles
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?,
            ),
        };
        if config.api_token().is_none() {
            return Err(ConfigError::MissingApiToken(name.to_string()));
        }
        Ok(config)
    }
}

/// FlareSyncのグローバル設定ディレクトリ (~/.config/flaresync)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("flaresync"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 FLARESYNC_CONFIG (直接パス指定)
/// 2. カレントディレクトリ: flaresync.yaml, flaresync.yml
/// 3. ./.flaresync/config.yaml
/// 4. ~/.config/flaresync/config.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in ["flaresync.yaml", "flaresync.yml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.flaresync/ ディレクトリで検索
    let local = current_dir.join(".flaresync").join("config.yaml");
    if local.exists() {
        return Ok(local);
    }

    // 4. グローバル設定ファイル
    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}
