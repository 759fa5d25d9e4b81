//! Transform rules: URL rewrites and request/response header modification

use super::phase_rule::{PhaseRuleClient, PhaseRuleKind, PhaseRuleObservation};
use crate::api::ApiRule;
use crate::scope::Scope;
use flaresync_cloud::{CloudError, Field, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub struct TransformRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformType {
    UrlRewrite,
    RequestHeaders,
    ResponseHeaders,
}

impl TransformType {
    pub fn phase(self) -> &'static str {
        match self {
            TransformType::UrlRewrite => "http_request_transform",
            TransformType::RequestHeaders => "http_request_late_transform",
            TransformType::ResponseHeaders => "http_response_headers_transform",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRuleParams {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub zone_id: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub account_id: Field<String>,

    #[serde(rename = "type")]
    pub transform_type: TransformType,

    pub expression: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub enabled: Field<bool>,

    /// urlRewrite only
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub uri: Field<UriRewrite>,

    /// requestHeaders / responseHeaders only
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub headers: Field<BTreeMap<String, HeaderAction>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UriRewrite {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub path: Field<RewriteValue>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub query: Field<RewriteValue>,
}

/// Either a static value or an expression evaluated per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteValue {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub value: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub expression: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderAction {
    /// set, add or remove
    pub operation: String,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub value: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub expression: Field<String>,
}

impl ResourceKind for TransformRule {
    const KIND: &'static str = "TransformRule";
    type Params = TransformRuleParams;
    type Observation = PhaseRuleObservation;
}

fn conversion(message: String) -> CloudError {
    CloudError::Conversion(message)
}

fn rewrite_value(part: &str, rewrite: &RewriteValue) -> Result<Value> {
    match (rewrite.value.get(), rewrite.expression.get()) {
        (Some(value), None) => Ok(json!({ "value": value })),
        (None, Some(expression)) => Ok(json!({ "expression": expression })),
        _ => Err(conversion(format!(
            "uri {} rewrite needs exactly one of value or expression",
            part
        ))),
    }
}

fn uri_parameters(uri: &UriRewrite) -> Result<Value> {
    let mut rewrite = Map::new();
    if let Some(path) = uri.path.get() {
        rewrite.insert("path".to_string(), rewrite_value("path", path)?);
    }
    if let Some(query) = uri.query.get() {
        rewrite.insert("query".to_string(), rewrite_value("query", query)?);
    }
    if rewrite.is_empty() {
        return Err(conversion("uri rewrite needs a path or a query".to_string()));
    }
    Ok(json!({ "uri": rewrite }))
}

fn header_parameters(headers: &BTreeMap<String, HeaderAction>) -> Result<Value> {
    if headers.is_empty() {
        return Err(conversion("headers must not be empty".to_string()));
    }
    let mut out = Map::new();
    for (name, action) in headers {
        let entry = match (action.operation.as_str(), action.value.get(), action.expression.get()) {
            ("remove", None, None) => json!({ "operation": "remove" }),
            ("remove", _, _) => {
                return Err(conversion(format!(
                    "header '{}': remove takes no value or expression",
                    name
                )));
            }
            (op @ ("set" | "add"), Some(value), None) => json!({ "operation": op, "value": value }),
            (op @ ("set" | "add"), None, Some(expression)) => {
                json!({ "operation": op, "expression": expression })
            }
            ("set" | "add", _, _) => {
                return Err(conversion(format!(
                    "header '{}': needs exactly one of value or expression",
                    name
                )));
            }
            (op, _, _) => {
                return Err(conversion(format!(
                    "header '{}': unknown operation '{}'",
                    name, op
                )));
            }
        };
        out.insert(name.clone(), entry);
    }
    Ok(json!({ "headers": out }))
}

impl PhaseRuleKind for TransformRule {
    const NOUN: &'static str = "transform rule";

    fn scope(params: &TransformRuleParams) -> Result<Scope> {
        Scope::from_refs(&params.zone_id, &params.account_id)
    }

    fn phase(params: &TransformRuleParams) -> Result<&'static str> {
        Ok(params.transform_type.phase())
    }

    fn to_rule(params: &TransformRuleParams) -> Result<ApiRule> {
        let action_parameters = match (params.transform_type, params.uri.get(), params.headers.get()) {
            (TransformType::UrlRewrite, Some(uri), None) => uri_parameters(uri)?,
            (TransformType::UrlRewrite, _, _) => {
                return Err(conversion("urlRewrite takes uri and no headers".to_string()));
            }
            (_, None, Some(headers)) => header_parameters(headers)?,
            (_, _, _) => {
                return Err(conversion(
                    "header transforms take headers and no uri".to_string(),
                ));
            }
        };
        Ok(ApiRule {
            id: None,
            action: "rewrite".to_string(),
            expression: params.expression.clone(),
            description: params.description.get().cloned(),
            enabled: params.enabled.get().copied(),
            action_parameters: Some(action_parameters),
            ratelimit: None,
            rule_ref: None,
        })
    }
}

connector!(TransformRule => PhaseRuleClient<TransformRule>);
