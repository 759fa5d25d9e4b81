//! Generic reconciliation state machine
//!
//! One pass over one managed resource:
//!
//! ```text
//!   no external name ──────────────► Absent ──► Creating ──► (requeue)
//!   external name ──► observe ──┬─ not found ─► Absent
//!                               ├─ up to date ─► Synced (no remote mutation)
//!                               └─ drifted ───► Updating ──► (requeue)
//!   deletion requested ──► observe ──► Deleting ──► removed from store
//! ```
//!
//! Observe always precedes any mutation within a pass. Nothing is retried
//! here: errors are recorded on the status and returned so the controller
//! can requeue with backoff.

use crate::action::{ActionType, ReconcileOutcome};
use crate::condition::{Condition, set_condition};
use crate::error::{CloudError, Result};
use crate::external::{Connector, ExternalClient, ExternalObservation, Managed, ResourceKind};
use crate::identity;
use crate::managed::{DeletionPolicy, ResourceStatus};
use crate::store::ResourceStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Requeue delay right after a create or update, to confirm convergence
const CONFIRM_INTERVAL: Duration = Duration::from_secs(10);

pub struct Reconciler<K: ResourceKind> {
    connector: Arc<dyn Connector<K>>,
    store: Arc<dyn ResourceStore<K>>,
    poll_interval: Duration,
}

impl<K: ResourceKind> Reconciler<K> {
    pub fn new(
        connector: Arc<dyn Connector<K>>,
        store: Arc<dyn ResourceStore<K>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            connector,
            store,
            poll_interval,
        }
    }

    pub fn kind(&self) -> &'static str {
        K::KIND
    }

    /// Reconcile the managed resource called `name` once
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome> {
        let Some(resource) = self.store.get(name).await? else {
            tracing::debug!(kind = K::KIND, name, "Managed resource is gone, nothing to do");
            return Ok(ReconcileOutcome::removed(ActionType::NoOp));
        };

        tracing::debug!(
            kind = K::KIND,
            name,
            generation = resource.metadata.generation,
            "Reconciling"
        );

        if resource.metadata.is_being_deleted()
            && resource.spec.deletion_policy == DeletionPolicy::Orphan
        {
            tracing::info!(kind = K::KIND, name, "Orphaning remote resource");
            self.store.remove(name).await?;
            return Ok(ReconcileOutcome::removed(ActionType::Delete));
        }

        match self.converge(&resource).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.record_failure(&resource, &e).await;
                Err(e)
            }
        }
    }

    async fn converge(&self, resource: &Managed<K>) -> Result<ReconcileOutcome> {
        let client = self.connector.connect(resource).await?;
        let observed = self.observe(client.as_ref(), resource).await?;

        if resource.metadata.is_being_deleted() {
            return self.delete(client.as_ref(), resource, &observed).await;
        }

        if !observed.resource_exists {
            return self.create(client.as_ref(), resource).await;
        }

        match observed.observation {
            Some(observation) if observed.resource_up_to_date => {
                self.synced(resource, observation).await
            }
            _ => self.update(client.as_ref(), resource).await,
        }
    }

    /// Observe step: existence and drift, without mutating anything.
    ///
    /// Without an external name the remote entity was never created and no
    /// remote call is made. A not-found answer is folded into
    /// `resource_exists = false`. An immutable-field error on a resource
    /// being deleted counts as present; every other error propagates.
    pub async fn observe(
        &self,
        client: &dyn ExternalClient<K>,
        resource: &Managed<K>,
    ) -> Result<ExternalObservation<K::Observation>> {
        let Some(external_name) = identity::external_name(&resource.metadata) else {
            return Ok(ExternalObservation::absent());
        };

        match client.observe(external_name, resource.params()).await {
            Ok(observation) => {
                let up_to_date = client.is_up_to_date(resource.params(), &observation)?;
                Ok(ExternalObservation::present(observation, up_to_date))
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    kind = K::KIND,
                    name = resource.name(),
                    external_name,
                    "Remote resource not found"
                );
                Ok(ExternalObservation::absent())
            }
            // The remote entity still sits where the external name says;
            // deletion goes there instead of waiting for the spec to revert
            Err(e @ CloudError::ImmutableField { .. }) if resource.metadata.is_being_deleted() => {
                tracing::warn!(
                    kind = K::KIND,
                    name = resource.name(),
                    external_name,
                    error = %e,
                    "Deleting at the recorded location"
                );
                Ok(ExternalObservation {
                    resource_exists: true,
                    resource_up_to_date: false,
                    observation: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        client: &dyn ExternalClient<K>,
        resource: &Managed<K>,
    ) -> Result<ReconcileOutcome> {
        let name = resource.name();

        if !K::IDEMPOTENT_CREATE && identity::create_incomplete(&resource.metadata) {
            return Err(CloudError::CreationIncomplete(format!("{}/{}", K::KIND, name)));
        }

        // Record intent before the call so a crash mid-flight is visible
        let mut status = resource.status.clone();
        set_condition(&mut status.conditions, Condition::creating());
        self.store.update_status(name, status.clone()).await?;

        let mut pending = BTreeMap::new();
        identity::mark_create_pending(&mut pending, Utc::now());
        self.store.set_annotations(name, pending).await?;

        tracing::info!(kind = K::KIND, name, "Creating remote resource");
        let creation = match client.create(resource.params()).await {
            Ok(creation) => creation,
            Err(e) => {
                let mut failed = BTreeMap::new();
                identity::mark_create_failed(&mut failed, Utc::now());
                if let Err(store_err) = self.store.set_annotations(name, failed).await {
                    tracing::warn!(kind = K::KIND, name, error = %store_err, "Cannot record failed create");
                }
                return Err(e);
            }
        };

        let mut annotations = BTreeMap::new();
        identity::set_external_name(&mut annotations, creation.external_name.clone());
        identity::mark_create_succeeded(&mut annotations, Utc::now());
        self.store.set_annotations(name, annotations).await?;

        tracing::info!(
            kind = K::KIND,
            name,
            external_name = %creation.external_name,
            "Created remote resource"
        );

        let ready = client.is_up_to_date(resource.params(), &creation.observation)?;
        let requeue = self
            .finish(resource, status, creation.observation, ready, Condition::creating())
            .await?;
        Ok(ReconcileOutcome::requeue(ActionType::Create, requeue))
    }

    async fn update(
        &self,
        client: &dyn ExternalClient<K>,
        resource: &Managed<K>,
    ) -> Result<ReconcileOutcome> {
        let name = resource.name();
        let external_name = identity::external_name(&resource.metadata).ok_or_else(|| {
            CloudError::StateError(format!("{}/{} has no external name", K::KIND, name))
        })?;

        tracing::info!(kind = K::KIND, name, external_name, "Updating drifted remote resource");
        let observation = client.update(external_name, resource.params()).await?;

        let ready = client.is_up_to_date(resource.params(), &observation)?;
        let requeue = self
            .finish(
                resource,
                resource.status.clone(),
                observation,
                ready,
                Condition::unavailable(),
            )
            .await?;
        Ok(ReconcileOutcome::requeue(ActionType::Update, requeue))
    }

    async fn synced(
        &self,
        resource: &Managed<K>,
        observation: K::Observation,
    ) -> Result<ReconcileOutcome> {
        tracing::debug!(kind = K::KIND, name = resource.name(), "Remote resource is up to date");
        let requeue = self
            .finish(
                resource,
                resource.status.clone(),
                observation,
                true,
                Condition::available(),
            )
            .await?;
        Ok(ReconcileOutcome::requeue(ActionType::NoOp, requeue))
    }

    async fn delete(
        &self,
        client: &dyn ExternalClient<K>,
        resource: &Managed<K>,
        observed: &ExternalObservation<K::Observation>,
    ) -> Result<ReconcileOutcome> {
        let name = resource.name();

        match identity::external_name(&resource.metadata) {
            Some(external_name) if observed.resource_exists => {
                let mut status = resource.status.clone();
                set_condition(&mut status.conditions, Condition::deleting());
                self.store.update_status(name, status).await?;

                tracing::info!(kind = K::KIND, name, external_name, "Deleting remote resource");
                client.delete(external_name, resource.params()).await?;
            }
            _ => tracing::info!(kind = K::KIND, name, "Remote resource already absent"),
        }

        self.store.remove(name).await?;
        Ok(ReconcileOutcome::removed(ActionType::Delete))
    }

    /// Store the observation and conditions of a successful pass and pick
    /// the next requeue delay.
    async fn finish(
        &self,
        resource: &Managed<K>,
        mut status: ResourceStatus<K::Observation>,
        observation: K::Observation,
        ready: bool,
        not_ready: Condition,
    ) -> Result<Duration> {
        status.at_provider = Some(observation);
        status.observed_generation = Some(resource.metadata.generation);
        set_condition(
            &mut status.conditions,
            if ready { Condition::available() } else { not_ready },
        );
        set_condition(&mut status.conditions, Condition::reconcile_success());
        self.store.update_status(resource.name(), status).await?;

        Ok(if ready {
            self.poll_interval
        } else {
            CONFIRM_INTERVAL.min(self.poll_interval)
        })
    }

    /// Surface a failed pass on the `Synced` condition. Best effort: the
    /// original error is what gets returned either way.
    pub async fn record_failure(&self, resource: &Managed<K>, error: &CloudError) {
        let name = resource.name();
        tracing::warn!(kind = K::KIND, name, error = %error, "Reconcile failed");

        let mut status = match self.store.get(name).await {
            Ok(Some(current)) => current.status,
            Ok(None) => return,
            Err(_) => resource.status.clone(),
        };
        set_condition(
            &mut status.conditions,
            Condition::reconcile_error(error.reason(), error.to_string()),
        );
        if let Err(e) = self.store.update_status(name, status).await {
            tracing::warn!(kind = K::KIND, name, error = %e, "Cannot record reconcile error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionStatus, ConditionType};
    use crate::error::ErrorClass;
    use crate::store::{MemoryStore, SpecWriter};
    use crate::testing::{FakeConnector, FakeRemote, Widget, WidgetObservation, widget};

    struct Fixture {
        remote: Arc<FakeRemote>,
        store: Arc<MemoryStore<Widget>>,
        reconciler: Reconciler<Widget>,
    }

    fn fixture() -> Fixture {
        let remote = FakeRemote::new();
        let store = Arc::new(MemoryStore::<Widget>::new());
        let reconciler = Reconciler::new(
            Arc::new(FakeConnector {
                remote: remote.clone(),
            }),
            store.clone(),
            Duration::from_secs(300),
        );
        Fixture {
            remote,
            store,
            reconciler,
        }
    }

    async fn stored(f: &Fixture, name: &str) -> Managed<Widget> {
        f.store.get(name).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_observe_without_external_name_makes_no_remote_call() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();

        let client = FakeConnector {
            remote: f.remote.clone(),
        }
        .connect(&stored(&f, "w").await)
        .await
        .unwrap();
        let observed = f
            .reconciler
            .observe(client.as_ref(), &stored(&f, "w").await)
            .await
            .unwrap();

        assert!(!observed.resource_exists);
        assert!(f.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_sets_external_name_and_observation() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();

        let outcome = f.reconciler.reconcile("w").await.unwrap();
        assert_eq!(outcome.action, ActionType::Create);
        assert_eq!(f.remote.calls(), vec!["create"]);

        let mr = stored(&f, "w").await;
        assert_eq!(identity::external_name(&mr.metadata), Some("w-1"));
        assert!(!identity::create_incomplete(&mr.metadata));
        assert_eq!(mr.status.at_provider.as_ref().unwrap().color, "blue");
        assert_eq!(mr.status.observed_generation, Some(1));
        let ready = mr.status.condition(ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        let outcome = f.reconciler.reconcile("w").await.unwrap();
        assert_eq!(outcome.action, ActionType::NoOp);
        assert_eq!(outcome.requeue_after, Some(Duration::from_secs(300)));
        assert_eq!(f.remote.calls(), vec!["create", "observe"]);
    }

    #[tokio::test]
    async fn test_drift_triggers_exactly_one_update() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        f.store.apply(widget("w", "red")).await.unwrap();
        let outcome = f.reconciler.reconcile("w").await.unwrap();
        assert_eq!(outcome.action, ActionType::Update);
        assert_eq!(f.remote.count("update"), 1);

        let mr = stored(&f, "w").await;
        assert_eq!(identity::external_name(&mr.metadata), Some("w-1"));
        assert_eq!(mr.status.at_provider.unwrap().color, "red");
        assert_eq!(mr.status.observed_generation, Some(2));

        let outcome = f.reconciler.reconcile("w").await.unwrap();
        assert_eq!(outcome.action, ActionType::NoOp);
        assert_eq!(f.remote.count("update"), 1);
    }

    #[tokio::test]
    async fn test_externally_deleted_resource_is_recreated() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        f.remote.widgets.lock().unwrap().clear();
        let outcome = f.reconciler.reconcile("w").await.unwrap();

        assert_eq!(outcome.action, ActionType::Create);
        assert_eq!(f.remote.calls(), vec!["create", "observe", "create"]);
        let mr = stored(&f, "w").await;
        assert_eq!(identity::external_name(&mr.metadata), Some("w-2"));
    }

    #[tokio::test]
    async fn test_transient_observe_error_is_not_swallowed() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        f.remote.fail_next(ErrorClass::Transient);
        let err = f.reconciler.reconcile("w").await.unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(f.remote.count("create"), 1);

        let synced = stored(&f, "w")
            .await
            .status
            .condition(ConditionType::Synced)
            .cloned()
            .unwrap();
        assert_eq!(synced.status, ConditionStatus::False);
        assert_eq!(synced.reason, "RemoteError");
    }

    #[tokio::test]
    async fn test_failed_create_is_recorded_and_may_retry() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();

        f.remote.fail_next(ErrorClass::Permanent);
        assert!(f.reconciler.reconcile("w").await.is_err());
        let mr = stored(&f, "w").await;
        assert_eq!(identity::external_name(&mr.metadata), None);
        assert!(!identity::create_incomplete(&mr.metadata));
        assert_eq!(
            mr.status.condition(ConditionType::Ready).unwrap().reason,
            "Creating"
        );

        let outcome = f.reconciler.reconcile("w").await.unwrap();
        assert_eq!(outcome.action, ActionType::Create);
    }

    #[tokio::test]
    async fn test_interrupted_create_blocks_second_create() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        let mut pending = BTreeMap::new();
        identity::mark_create_pending(&mut pending, Utc::now());
        f.store.set_annotations("w", pending).await.unwrap();

        let err = f.reconciler.reconcile("w").await.unwrap_err();
        assert!(matches!(err, CloudError::CreationIncomplete(_)));
        assert!(err.requires_spec_change());
        assert!(f.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_remote_and_object() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        f.store.request_deletion("w").await.unwrap();
        let outcome = f.reconciler.reconcile("w").await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::removed(ActionType::Delete));
        assert_eq!(f.remote.calls(), vec!["create", "observe", "delete"]);
        assert!(f.remote.widgets.lock().unwrap().is_empty());
        assert!(f.store.get("w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_of_already_absent_remote() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();
        f.remote.widgets.lock().unwrap().clear();

        f.store.request_deletion("w").await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        assert_eq!(f.remote.count("delete"), 0);
        assert!(f.store.get("w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_of_never_created_resource() {
        let f = fixture();
        f.store.apply(widget("w", "blue")).await.unwrap();
        f.store.request_deletion("w").await.unwrap();

        f.reconciler.reconcile("w").await.unwrap();
        assert!(f.remote.calls().is_empty());
        assert!(f.store.get("w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_orphan_policy_skips_remote_delete() {
        let f = fixture();
        let mut mr = widget("w", "blue");
        mr.spec.deletion_policy = DeletionPolicy::Orphan;
        f.store.apply(mr).await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        f.store.request_deletion("w").await.unwrap();
        f.reconciler.reconcile("w").await.unwrap();

        assert_eq!(f.remote.count("delete"), 0);
        assert_eq!(f.remote.widgets.lock().unwrap().len(), 1);
        assert!(f.store.get("w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_adopts_existing_remote_resource_by_external_name() {
        let f = fixture();
        f.remote.insert(WidgetObservation {
            id: "existing".to_string(),
            name: "w".to_string(),
            color: "blue".to_string(),
        });
        let mut mr = widget("w", "blue");
        identity::set_external_name(&mut mr.metadata.annotations, "existing");
        f.store.apply(mr).await.unwrap();

        let outcome = f.reconciler.reconcile("w").await.unwrap();
        assert_eq!(outcome.action, ActionType::NoOp);
        assert_eq!(f.remote.calls(), vec!["observe"]);
    }
}
