pub mod apply;
pub mod delete;
pub mod reconcile;
pub mod run;
pub mod status;

use flaresync_cloud::ControllerRegistry;
use flaresync_cloudflare::{Connection, build_registry, controller_options};
use flaresync_config::Settings;
use std::path::Path;
use std::sync::Arc;

/// 設定を読み込み、全種別のコントローラーを組み立てる
pub fn load_registry(project_root: &Path, config: Option<&Path>) -> anyhow::Result<ControllerRegistry> {
    let settings = match config {
        Some(path) => {
            let mut settings = Settings::from_file(path)?;
            settings.apply_env();
            settings
        }
        None => Settings::load()?,
    };
    tracing::debug!(profiles = settings.profiles.len(), "Loaded settings");

    let options = controller_options(&settings.controller);
    let connection = Arc::new(Connection::new(settings));
    Ok(build_registry(project_root, connection, &options))
}
