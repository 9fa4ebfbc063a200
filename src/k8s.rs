use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt, future};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher::{self, Event, watcher};
use kube::{Api, Client, Config, ResourceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{ApplyError, BoxError};
use crate::selector::selector_query;
use crate::watch::PodEvent;

const EPHEMERAL_CONTAINERS: &str = "ephemeralcontainers";

/// The pod operations a debug session needs from the cluster.
pub trait PodBackend {
    fn list_pod_names(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Vec<String>, BoxError>> + Send;

    fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<Pod>, BoxError>> + Send;

    /// Submits a strategic-merge patch against `pods/<name>/ephemeralcontainers`.
    fn patch_ephemeral_containers(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> impl Future<Output = Result<Pod, ApplyError>> + Send;

    fn watch_pod(&self, namespace: &str, name: &str)
    -> BoxStream<'static, Result<PodEvent, BoxError>>;
}

/// Which kubeconfig and context to connect with.
#[derive(Debug, Clone, Default)]
pub struct KubeSelection {
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
}

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    default_namespace: String,
}

impl KubeGateway {
    pub async fn connect(selection: &KubeSelection) -> Result<Self> {
        let kubeconfig = match &selection.kubeconfig {
            Some(path) => Some(
                Kubeconfig::read_from(path)
                    .with_context(|| format!("failed to read kubeconfig {}", path.display()))?,
            ),
            None => Kubeconfig::read().ok(),
        };

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            let options = KubeConfigOptions {
                context: selection.context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig_value, &options)
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            if selection.context.is_some() {
                anyhow::bail!("kubeconfig not found; --context is unavailable in this environment");
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        let context = selection
            .context
            .clone()
            .or_else(|| {
                kubeconfig
                    .as_ref()
                    .and_then(|cfg| cfg.current_context.clone())
            })
            .unwrap_or_else(|| "in-cluster".to_string());
        debug!(context, default_namespace, "connected to cluster");

        Ok(Self {
            client,
            context,
            default_namespace,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Namespace of the active kubeconfig context, `default` when unset.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl PodBackend for KubeGateway {
    async fn list_pod_names(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, BoxError> {
        let params = ListParams::default().labels(&selector_query(labels));
        let pods = self.pods(namespace).list(&params).await?;
        Ok(pods.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, BoxError> {
        Ok(self.pods(namespace).get_opt(name).await?)
    }

    async fn patch_ephemeral_containers(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Pod, ApplyError> {
        let api = self.pods(namespace);
        let error = match api
            .patch_subresource(
                EPHEMERAL_CONTAINERS,
                name,
                &PatchParams::default(),
                &Patch::Strategic(patch),
            )
            .await
        {
            Ok(pod) => return Ok(pod),
            Err(error) => error,
        };

        if !is_not_found(&error) {
            return Err(ApplyError::Rejected(Box::new(error)));
        }

        // A 404 for a pod that exists means the API server lacks the sub-resource.
        match api.get_opt(name).await {
            Ok(Some(_)) => Err(ApplyError::FeatureDisabled {
                message: error.to_string(),
            }),
            Ok(None) => Err(ApplyError::PodNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(_) => Err(ApplyError::Rejected(Box::new(error))),
        }
    }

    fn watch_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> BoxStream<'static, Result<PodEvent, BoxError>> {
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let events = watcher(self.pods(namespace), config).map_err(|error| Box::new(error) as BoxError);
        snapshot_events(events).boxed()
    }
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

/// Folds the watcher's paged initial list into a single `Listed` event.
///
/// The pod only counts as present once the whole list has been seen, so a
/// re-list that no longer contains it reads as `Listed(None)`.
pub fn snapshot_events<S>(events: S) -> impl Stream<Item = Result<PodEvent, BoxError>>
where
    S: Stream<Item = Result<Event<Pod>, BoxError>>,
{
    events
        .scan(None::<Pod>, |listed, event| {
            let emitted = match event {
                Err(error) => Some(Err(error)),
                Ok(Event::Init) => {
                    *listed = None;
                    None
                }
                Ok(Event::InitApply(pod)) => {
                    *listed = Some(pod);
                    None
                }
                Ok(Event::InitDone) => Some(Ok(PodEvent::Listed(listed.take()))),
                Ok(Event::Apply(pod)) => Some(Ok(PodEvent::Applied(pod))),
                Ok(Event::Delete(_)) => Some(Ok(PodEvent::Deleted)),
            };
            future::ready(Some(emitted))
        })
        .filter_map(future::ready)
}

#[cfg(test)]
mod tests {
    use super::snapshot_events;
    use crate::error::BoxError;
    use crate::watch::PodEvent;
    use futures::{StreamExt, stream};
    use k8s_openapi::api::core::v1::Pod;
    use kube::runtime::watcher::Event;
    use serde_json::json;

    fn pod(name: &str) -> Pod {
        serde_json::from_value(json!({"metadata": {"name": name, "namespace": "default"}}))
            .expect("valid pod")
    }

    #[tokio::test]
    async fn initial_pages_surface_as_one_listed_event() {
        let events: Vec<Result<Event<Pod>, BoxError>> = vec![
            Ok(Event::Init),
            Ok(Event::InitApply(pod("web-1"))),
            Ok(Event::InitDone),
            Ok(Event::Apply(pod("web-1"))),
            Ok(Event::Delete(pod("web-1"))),
        ];

        let folded = snapshot_events(stream::iter(events))
            .map(|event| event.expect("no stream errors"))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(folded.len(), 3);
        assert!(
            matches!(&folded[0], PodEvent::Listed(Some(pod)) if pod.metadata.name.as_deref() == Some("web-1"))
        );
        assert!(matches!(folded[1], PodEvent::Applied(_)));
        assert!(matches!(folded[2], PodEvent::Deleted));
    }

    #[tokio::test]
    async fn empty_relist_means_pod_is_gone() {
        let events: Vec<Result<Event<Pod>, BoxError>> = vec![
            Ok(Event::Init),
            Ok(Event::InitApply(pod("web-1"))),
            Ok(Event::InitDone),
            Ok(Event::Init),
            Ok(Event::InitDone),
            Err("watch failed".into()),
        ];

        let folded = snapshot_events(stream::iter(events)).collect::<Vec<_>>().await;

        assert_eq!(folded.len(), 3);
        assert!(matches!(folded[0], Ok(PodEvent::Listed(Some(_)))));
        assert!(matches!(folded[1], Ok(PodEvent::Listed(None))));
        assert!(folded[2].is_err());
    }
}
