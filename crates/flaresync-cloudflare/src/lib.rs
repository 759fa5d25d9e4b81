//! Cloudflare provider for FlareSync
//!
//! Resource kinds reconciled against the Cloudflare v4 API:
//!
//! - Zone, DnsRecord, BotManagement
//! - R2Bucket, TurnstileWidget (account scoped)
//! - Ruleset, and single TransformRule / CacheRule / RateLimitRule entries of
//!   a phase entrypoint ruleset (zone or account scoped)
//!
//! # Example
//!
//! ```ignore
//! use flaresync_cloudflare::{Connection, build_registry, controller_options};
//! use flaresync_config::Settings;
//!
//! let settings = Settings::load()?;
//! let options = controller_options(&settings.controller);
//! let connection = Arc::new(Connection::new(settings));
//! let registry = build_registry(&project_root, connection, &options);
//!
//! let summary = registry.reconcile_all().await?;
//! println!("{}", summary);
//! ```

pub mod api;
pub mod connector;
pub mod error;
pub mod manifest;
pub mod resources;
pub mod scope;
pub mod setup;

#[cfg(test)]
mod testing;

pub use api::{CLOUDFLARE_API_BASE, CloudflareApi, CloudflareApis};
pub use connector::{ApiFactory, CloudflareConnector, Connection, Profile};
pub use error::{CloudflareError, Result, ResultExt};
pub use manifest::{Applied, StatusRow, apply_manifests, request_deletion, status};
pub use scope::Scope;
pub use setup::{KINDS, build_registry, controller_options};
