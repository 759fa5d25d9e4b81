//! Resource kinds
//!
//! Each module defines the kind marker, its desired-state params, the
//! observation projected from the API response, the `ExternalClient` and the
//! connector hook-up.

use flaresync_cloud::Result;

/// `impl Connector<$kind> for CloudflareConnector<$kind>` building `$client`
macro_rules! connector {
    ($kind:ty => $client:ty) => {
        #[async_trait::async_trait]
        impl flaresync_cloud::Connector<$kind> for crate::connector::CloudflareConnector<$kind> {
            async fn connect(
                &self,
                resource: &flaresync_cloud::Managed<$kind>,
            ) -> flaresync_cloud::Result<Box<dyn flaresync_cloud::ExternalClient<$kind>>> {
                let profile = self.connection.profile_for::<$kind>(resource)?;
                Ok(Box::new(<$client>::new(profile)))
            }
        }
    };
}

pub mod bot_management;
pub mod cache_rule;
pub mod dns_record;
pub mod phase_rule;
pub mod r2_bucket;
pub mod rate_limit;
pub mod ruleset;
pub mod transform_rule;
pub mod turnstile;
pub mod zone;

pub use bot_management::BotManagement;
pub use cache_rule::CacheRule;
pub use dns_record::DnsRecord;
pub use r2_bucket::R2Bucket;
pub use rate_limit::RateLimitRule;
pub use ruleset::Ruleset;
pub use transform_rule::TransformRule;
pub use turnstile::TurnstileWidget;
pub use zone::Zone;

/// Delete is idempotent: an already missing remote entity is success
pub(crate) fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// `true` when every key of `desired` is present in `observed` with a
/// matching value. Arrays must match element by element.
pub(crate) fn json_subset(desired: &serde_json::Value, observed: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (desired, observed) {
        (Value::Object(d), Value::Object(o)) => d
            .iter()
            .all(|(k, dv)| o.get(k).is_some_and(|ov| json_subset(dv, ov))),
        (Value::Array(d), Value::Array(o)) => {
            d.len() == o.len() && d.iter().zip(o).all(|(dv, ov)| json_subset(dv, ov))
        }
        (Value::Number(d), Value::Number(o)) => d.as_f64() == o.as_f64(),
        (d, o) => d == o,
    }
}
