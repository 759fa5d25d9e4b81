//! Zone / account addressing for kinds that accept either

use flaresync_cloud::{CloudError, Field};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Zone(String),
    Account(String),
}

impl Scope {
    /// Exactly one of the two references must be set
    pub fn from_refs(zone_id: &Field<String>, account_id: &Field<String>) -> Result<Self, CloudError> {
        let zone = zone_id.get().filter(|v| !v.is_empty());
        let account = account_id.get().filter(|v| !v.is_empty());
        match (zone, account) {
            (Some(zone), None) => Ok(Scope::Zone(zone.clone())),
            (None, Some(account)) => Ok(Scope::Account(account.clone())),
            (Some(_), Some(_)) => Err(CloudError::ScopeConfiguration(
                "zoneId and accountId are mutually exclusive".to_string(),
            )),
            (None, None) => Err(CloudError::ScopeConfiguration(
                "one of zoneId or accountId is required".to_string(),
            )),
        }
    }

    /// URL path prefix (`zones/<id>` or `accounts/<id>`)
    pub fn path(&self) -> String {
        match self {
            Scope::Zone(id) => format!("zones/{}", id),
            Scope::Account(id) => format!("accounts/{}", id),
        }
    }

    /// Ruleset kind of the phase entrypoint at this scope
    pub fn entrypoint_kind(&self) -> &'static str {
        match self {
            Scope::Zone(_) => "zone",
            Scope::Account(_) => "root",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Zone(id) => write!(f, "zone {}", id),
            Scope::Account(id) => write!(f, "account {}", id),
        }
    }
}
