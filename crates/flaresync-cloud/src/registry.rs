//! Runs one controller per registered kind

use crate::action::PassSummary;
use crate::controller::Controller;
use crate::error::Result;
use crate::external::ResourceKind;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Kind-erased view of a [`Controller`]
#[async_trait]
pub trait KindController: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn run(&self, shutdown: watch::Receiver<bool>);

    async fn reconcile_all(&self) -> Result<PassSummary>;
}

#[async_trait]
impl<K: ResourceKind> KindController for Controller<K> {
    fn kind(&self) -> &'static str {
        K::KIND
    }

    async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.clone().run(shutdown).await
    }

    async fn reconcile_all(&self) -> Result<PassSummary> {
        Controller::reconcile_all(self).await
    }
}

#[derive(Default)]
pub struct ControllerRegistry {
    controllers: Vec<std::sync::Arc<dyn KindController>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<K: ResourceKind>(&mut self, controller: Controller<K>) -> &mut Self {
        tracing::debug!(kind = K::KIND, "Registered controller");
        self.controllers.push(std::sync::Arc::new(controller));
        self
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.controllers.iter().map(|c| c.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Run every controller until shutdown is signalled
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        for controller in &self.controllers {
            let controller = controller.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { controller.run(shutdown).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Controller task failed");
            }
        }
    }

    /// Reconcile every object of every kind once
    pub async fn reconcile_all(&self) -> Result<PassSummary> {
        let mut summary = PassSummary::new();
        for controller in &self.controllers {
            let kind_summary = controller.reconcile_all().await?;
            tracing::info!(kind = controller.kind(), summary = %kind_summary, "Reconciled");
            summary.merge(kind_summary);
        }
        Ok(summary)
    }
}
