//! Test fixtures: a toy "widget" kind backed by an in-memory remote

use crate::error::{CloudError, ErrorClass, Result};
use crate::external::{Connector, Creation, ExternalClient, Managed, ResourceKind};
use crate::field::Field;
use crate::managed::ManagedResource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct Widget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub color: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetObservation {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl ResourceKind for Widget {
    const KIND: &'static str = "Widget";
    type Params = WidgetParams;
    type Observation = WidgetObservation;
}

pub fn widget(name: &str, color: &str) -> Managed<Widget> {
    ManagedResource::new(
        name,
        WidgetParams {
            name: name.to_string(),
            color: Field::Set(color.to_string()),
        },
    )
}

#[derive(Debug)]
pub struct RemoteFailure(pub String);

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RemoteFailure {}

/// Remote side of the widget API with a call log
#[derive(Default)]
pub struct FakeRemote {
    pub widgets: Mutex<HashMap<String, WidgetObservation>>,
    pub calls: Mutex<Vec<String>>,
    next_id: AtomicU32,
    fail_next: Mutex<Option<ErrorClass>>,
    pub delay: Mutex<Option<std::time::Duration>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == verb).count()
    }

    pub fn fail_next(&self, class: ErrorClass) {
        *self.fail_next.lock().unwrap() = Some(class);
    }

    pub fn insert(&self, obs: WidgetObservation) {
        self.widgets.lock().unwrap().insert(obs.id.clone(), obs);
    }

    async fn enter(&self, verb: &str) -> Result<()> {
        self.calls.lock().unwrap().push(verb.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(class) = self.fail_next.lock().unwrap().take() {
            return Err(CloudError::remote(
                format!("cannot {} widget", verb),
                class,
                RemoteFailure("injected failure".to_string()),
            ));
        }
        Ok(())
    }

    fn not_found(verb: &str, id: &str) -> CloudError {
        CloudError::remote(
            format!("cannot {} widget", verb),
            ErrorClass::NotFound,
            RemoteFailure(format!("widget {} not found", id)),
        )
    }
}

pub struct FakeClient {
    remote: Arc<FakeRemote>,
}

#[async_trait]
impl ExternalClient<Widget> for FakeClient {
    async fn observe(&self, external_name: &str, _params: &WidgetParams) -> Result<WidgetObservation> {
        self.remote.enter("observe").await?;
        self.remote
            .widgets
            .lock()
            .unwrap()
            .get(external_name)
            .cloned()
            .ok_or_else(|| FakeRemote::not_found("observe", external_name))
    }

    async fn create(&self, params: &WidgetParams) -> Result<Creation<WidgetObservation>> {
        self.remote.enter("create").await?;
        let id = format!("w-{}", self.remote.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let obs = WidgetObservation {
            id: id.clone(),
            name: params.name.clone(),
            color: params.color.get().cloned().unwrap_or_else(|| "grey".to_string()),
        };
        self.remote.insert(obs.clone());
        Ok(Creation {
            external_name: id,
            observation: obs,
        })
    }

    async fn update(&self, external_name: &str, params: &WidgetParams) -> Result<WidgetObservation> {
        self.remote.enter("update").await?;
        let mut widgets = self.remote.widgets.lock().unwrap();
        let obs = widgets
            .get_mut(external_name)
            .ok_or_else(|| FakeRemote::not_found("update", external_name))?;
        if let Field::Set(color) = &params.color {
            obs.color = color.clone();
        }
        Ok(obs.clone())
    }

    async fn delete(&self, external_name: &str, _params: &WidgetParams) -> Result<()> {
        self.remote.enter("delete").await?;
        self.remote.widgets.lock().unwrap().remove(external_name);
        Ok(())
    }

    fn is_up_to_date(&self, params: &WidgetParams, observed: &WidgetObservation) -> Result<bool> {
        Ok(params.color.matches(&observed.color))
    }
}

pub struct FakeConnector {
    pub remote: Arc<FakeRemote>,
}

#[async_trait]
impl Connector<Widget> for FakeConnector {
    async fn connect(&self, _resource: &Managed<Widget>) -> Result<Box<dyn ExternalClient<Widget>>> {
        Ok(Box::new(FakeClient {
            remote: self.remote.clone(),
        }))
    }
}
