//! FlareSync reconciliation core
//!
//! Provider-independent machinery for keeping remote resources in line with
//! declared managed resources: the resource model, the observe / create /
//! update / delete state machine, the per-kind controller runtime and the
//! managed resource stores.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 flaresync CLI                    │
//! │          (run / reconcile / apply / delete)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               flaresync-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   ControllerRegistry ─► Controller<K>     │   │
//! │  │                  └──► Reconciler<K>       │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐     │
//! │  │ ResourceStore│  │ trait ExternalClient │     │
//! │  │ (file / mem) │  │ trait Connector      │     │
//! │  └──────────────┘  └──────────┬───────────┘     │
//! └───────────────────────────────┼─────────────────┘
//!                                 │
//!                      ┌──────────▼──────────┐
//!                      │ flaresync-cloudflare │
//!                      └─────────────────────┘
//! ```

pub mod action;
pub mod condition;
pub mod controller;
pub mod error;
pub mod external;
pub mod field;
pub mod identity;
pub mod managed;
pub mod reconciler;
pub mod registry;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

// Re-exports
pub use action::{ActionType, PassSummary, ReconcileOutcome};
pub use condition::{Condition, ConditionStatus, ConditionType};
pub use controller::{Controller, ControllerOptions, RetryConfig};
pub use error::{CloudError, ErrorClass, Result};
pub use external::{Connector, Creation, ExternalClient, ExternalObservation, Managed, ResourceKind};
pub use field::{Field, ordered_eq, unordered_eq};
pub use managed::{DeletionPolicy, ManagedResource, ObjectMeta, ResourceSpec, ResourceStatus};
pub use reconciler::Reconciler;
pub use registry::{ControllerRegistry, KindController};
pub use state::{FileStore, StateLock, acquire_lock};
pub use store::{MemoryStore, ResourceStore, SpecWriter};
