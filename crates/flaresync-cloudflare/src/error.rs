//! Cloudflare API error types

use flaresync_cloud::{CloudError, ErrorClass};
use thiserror::Error;

/// Cloudflare error codes that mean "the addressed object does not exist"
const NOT_FOUND_CODES: &[i64] = &[
    7003,  // could not route to the object identifier
    10006, // R2: the specified bucket does not exist
    10007, // rulesets: could not find entrypoint ruleset
    81044, // DNS: record does not exist
];

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with `success: false` or a non-2xx status
    #[error("Cloudflare API error (status {status}{}): {message}", code_suffix(.code))]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Unexpected response from Cloudflare API: {0}")]
    Decode(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CloudflareError {
    pub fn api(status: u16, code: Option<i64>, message: impl Into<String>) -> Self {
        CloudflareError::Api {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::api(404, None, message)
    }

    /// Classify by HTTP status, then (below 500) Cloudflare error code, then message
    pub fn class(&self) -> ErrorClass {
        match self {
            CloudflareError::Http(e) => match e.status() {
                Some(status) if status.as_u16() == 404 => ErrorClass::NotFound,
                Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                    ErrorClass::Permanent
                }
                _ => ErrorClass::Transient,
            },
            CloudflareError::Api {
                status,
                code,
                message,
            } => {
                // Codes and messages only refine client-side answers; a 5xx or
                // 429 is retried whatever its body says
                if *status == 404 {
                    ErrorClass::NotFound
                } else if *status == 429 || *status >= 500 {
                    ErrorClass::Transient
                } else if code.is_some_and(|c| NOT_FOUND_CODES.contains(&c))
                    || message.to_lowercase().contains("not found")
                    || message.to_lowercase().contains("does not exist")
                {
                    ErrorClass::NotFound
                } else {
                    ErrorClass::Permanent
                }
            }
            CloudflareError::Decode(_) | CloudflareError::JsonError(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(", code {}", c)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, CloudflareError>;

/// Lifts API errors into reconciler errors with a verb-specific prefix
pub trait ResultExt<T> {
    fn context(self, context: &str) -> flaresync_cloud::Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &str) -> flaresync_cloud::Result<T> {
        self.map_err(|e| {
            let class = e.class();
            CloudError::remote(context, class, e)
        })
    }
}
