//! Reconciler error types

use thiserror::Error;

/// How a remote failure should be treated by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The remote entity does not exist
    NotFound,
    /// Network failure, 5xx, rate limiting. Worth retrying as-is.
    Transient,
    /// The remote API rejected the request (bad expression, invalid plan, ...)
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::NotFound => write!(f, "not-found"),
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// Errors surfaced by the reconciliation core
#[derive(Error, Debug)]
pub enum CloudError {
    /// A remote call failed. `context` is a verb-specific prefix such as
    /// "cannot create ruleset"; the cause is kept as the error source.
    #[error("{context}: {source}")]
    Remote {
        context: String,
        class: ErrorClass,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Scope configuration error: {0}")]
    ScopeConfiguration(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Field '{field}' cannot be changed after creation (desired {desired}, observed {observed})")]
    ImmutableField {
        field: String,
        desired: String,
        observed: String,
    },

    #[error(
        "Cannot determine creation result for {0}: a previous create did not report success or failure. \
         Remove the external-create-pending annotation once the remote state has been checked"
    )]
    CreationIncomplete(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not found in store: {0}")]
    ResourceNotFound(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Wrap a remote failure with a lifecycle-specific message prefix
    pub fn remote<E>(context: impl Into<String>, class: ErrorClass, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CloudError::Remote {
            context: context.into(),
            class,
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CloudError::Remote {
                class: ErrorClass::NotFound,
                ..
            }
        )
    }

    /// Errors that only go away when somebody edits the spec (or clears an
    /// annotation). Re-polling alone will not fix them.
    pub fn requires_spec_change(&self) -> bool {
        matches!(
            self,
            CloudError::ScopeConfiguration(_)
                | CloudError::Conversion(_)
                | CloudError::ImmutableField { .. }
                | CloudError::CreationIncomplete(_)
        )
    }

    /// Short machine-readable reason used for status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            CloudError::Remote { .. } => "RemoteError",
            CloudError::ScopeConfiguration(_) => "ScopeConfigurationError",
            CloudError::Conversion(_) => "ConversionError",
            CloudError::ImmutableField { .. } => "ImmutableField",
            CloudError::CreationIncomplete(_) => "CreationIncomplete",
            CloudError::Conflict(_) => "Conflict",
            CloudError::Timeout(_) => "Timeout",
            CloudError::InvalidConfig(_) => "InvalidConfig",
            CloudError::ResourceNotFound(_) => "NotFound",
            CloudError::StateError(_)
            | CloudError::LockError(_)
            | CloudError::Io(_)
            | CloudError::Json(_) => "StoreError",
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
