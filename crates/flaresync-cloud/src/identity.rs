//! External identity tracking
//!
//! The remote identifier of a managed resource lives in the
//! `flaresync.io/external-name` annotation. Its absence is the only signal
//! that the remote entity was never created.
//!
//! Creation bookkeeping uses three more annotations. `pending` is written
//! before the create call; exactly one of `succeeded` / `failed` is written
//! after it returns. A pending mark newer than both means the process died
//! mid-create and the outcome is unknown.

use crate::managed::ObjectMeta;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

pub const ANNOTATION_EXTERNAL_NAME: &str = "flaresync.io/external-name";
pub const ANNOTATION_CREATE_PENDING: &str = "flaresync.io/external-create-pending";
pub const ANNOTATION_CREATE_SUCCEEDED: &str = "flaresync.io/external-create-succeeded";
pub const ANNOTATION_CREATE_FAILED: &str = "flaresync.io/external-create-failed";

/// Current external identifier. Empty values count as absent.
pub fn external_name(meta: &ObjectMeta) -> Option<&str> {
    meta.annotation(ANNOTATION_EXTERNAL_NAME)
        .filter(|v| !v.is_empty())
}

pub fn set_external_name(annotations: &mut BTreeMap<String, String>, name: impl Into<String>) {
    annotations.insert(ANNOTATION_EXTERNAL_NAME.to_string(), name.into());
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(meta: &ObjectMeta, key: &str) -> Option<DateTime<Utc>> {
    meta.annotation(key)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub fn mark_create_pending(annotations: &mut BTreeMap<String, String>, now: DateTime<Utc>) {
    annotations.insert(ANNOTATION_CREATE_PENDING.to_string(), timestamp(now));
}

pub fn mark_create_succeeded(annotations: &mut BTreeMap<String, String>, now: DateTime<Utc>) {
    annotations.insert(ANNOTATION_CREATE_SUCCEEDED.to_string(), timestamp(now));
}

pub fn mark_create_failed(annotations: &mut BTreeMap<String, String>, now: DateTime<Utc>) {
    annotations.insert(ANNOTATION_CREATE_FAILED.to_string(), timestamp(now));
}

/// A create was started but neither success nor failure was recorded after it
pub fn create_incomplete(meta: &ObjectMeta) -> bool {
    let Some(pending) = parse_timestamp(meta, ANNOTATION_CREATE_PENDING) else {
        return false;
    };
    let settled = [ANNOTATION_CREATE_SUCCEEDED, ANNOTATION_CREATE_FAILED]
        .iter()
        .filter_map(|key| parse_timestamp(meta, key))
        .any(|t| t >= pending);
    !settled
}
