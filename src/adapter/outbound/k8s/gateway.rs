//! Kubernetes implementation of [`ClusterGateway`].
//!
//! Workloads are reconciled with server-side apply. Config documents are
//! ConfigMaps whose `resourceVersion` backs [`Precondition`]s: a versioned
//! write is a `replace` carrying the observed version, and the API server
//! answers 409 when it no longer matches.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::io::AsyncBufReadExt;
use futures_util::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, PodSpec, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::wait::await_condition;
use kube::{Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::manifest::{make_deployment, make_service};
use crate::domain::workload::{Manifest, CONTAINER_NAME, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::error::{ClusterError, Error, Result};
use crate::port::{
    ClusterGateway, ClusterObject, ConfigDocument, LogStream, PodCondition, Precondition,
    ResourceKind,
};

/// Field manager recorded on server-side applied objects.
const FIELD_MANAGER: &str = "uc-deploy";

/// Buffered log lines between the API stream and the consumer.
const LOG_BUFFER: usize = 256;

/// Gateway to one namespace of a Kubernetes cluster.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    namespace: String,
}

impl KubeGateway {
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Connect using a kubeconfig context, or the inferred configuration
    /// (in-cluster or current context) when none is given.
    pub async fn connect(context: Option<&str>, namespace: &str) -> Result<Self> {
        let config = match context {
            Some(context) => {
                let kubeconfig = Kubeconfig::read().map_err(api_error)?;
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(api_error)?
            }
            None => Config::infer().await.map_err(api_error)?,
        };
        let client = Client::try_from(config).map_err(api_error)?;
        info!(context = context.unwrap_or("inferred"), namespace, "Connected to cluster");
        Ok(Self::new(client, namespace))
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn list_objects<K, F>(
        &self,
        kind: ResourceKind,
        selector: &str,
        images: F,
    ) -> Result<Vec<ClusterObject>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
        F: Fn(&K) -> Vec<String>,
    {
        let params = ListParams::default().labels(selector);
        let objects = self
            .api::<K>()
            .list(&params)
            .await
            .map_err(|e| cluster_error(e, kind, selector))?;
        Ok(objects
            .items
            .into_iter()
            .map(|object| ClusterObject {
                kind,
                name: object.name_any(),
                labels: object.labels().clone(),
                images: images(&object),
            })
            .collect())
    }

    async fn delete_object<K>(&self, kind: ResourceKind, name: &str) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        match self.api::<K>().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(kind = %kind, name, "Deleted object");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(cluster_error(e, kind, name).into()),
        }
    }

    fn config_map(name: &str, data: BTreeMap<String, String>, version: Option<String>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGED_BY_VALUE.to_string(),
                )])),
                resource_version: version,
                ..ObjectMeta::default()
            },
            data: Some(data),
            ..ConfigMap::default()
        }
    }

    async fn create_document(&self, name: &str, data: BTreeMap<String, String>) -> Result<()> {
        self.api::<ConfigMap>()
            .create(&PostParams::default(), &Self::config_map(name, data, None))
            .await
            .map_err(|e| cluster_error(e, ResourceKind::ConfigMap, name))?;
        Ok(())
    }

    async fn replace_document(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
        version: Option<String>,
    ) -> Result<()> {
        self.api::<ConfigMap>()
            .replace(name, &PostParams::default(), &Self::config_map(name, data, version))
            .await
            .map_err(|e| cluster_error(e, ResourceKind::ConfigMap, name))?;
        Ok(())
    }
}

/// Map a kube error for `kind`/`name` onto the gateway's error vocabulary.
fn cluster_error(err: kube::Error, kind: ResourceKind, name: &str) -> ClusterError {
    match &err {
        kube::Error::Api(response) if response.code == 404 => ClusterError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => ClusterError::Conflict {
            name: name.to_string(),
        },
        _ => ClusterError::Api(err.to_string()),
    }
}

fn api_error(err: impl std::fmt::Display) -> Error {
    ClusterError::Api(err.to_string()).into()
}

fn container_images(spec: Option<&PodSpec>) -> Vec<String> {
    spec.map(|spec| {
        spec.containers
            .iter()
            .filter_map(|container| container.image.clone())
            .collect()
    })
    .unwrap_or_default()
}

fn is_pod_ready(pod: Option<&Pod>) -> bool {
    pod.and_then(|p| p.status.as_ref())
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn list(&self, kind: ResourceKind, selector: &str) -> Result<Vec<ClusterObject>> {
        match kind {
            ResourceKind::Pod => {
                self.list_objects(kind, selector, |pod: &Pod| container_images(pod.spec.as_ref()))
                    .await
            }
            ResourceKind::Deployment => {
                self.list_objects(kind, selector, |deployment: &Deployment| {
                    container_images(
                        deployment
                            .spec
                            .as_ref()
                            .and_then(|spec| spec.template.spec.as_ref()),
                    )
                })
                .await
            }
            ResourceKind::Service => {
                self.list_objects(kind, selector, |_: &Service| Vec::new()).await
            }
            ResourceKind::ConfigMap => {
                self.list_objects(kind, selector, |_: &ConfigMap| Vec::new()).await
            }
        }
    }

    async fn apply(&self, manifest: &Manifest) -> Result<()> {
        let name = manifest.name().to_string();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        match manifest {
            Manifest::Deployment(spec) => {
                self.api::<Deployment>()
                    .patch(&name, &params, &Patch::Apply(&make_deployment(spec)))
                    .await
                    .map_err(|e| cluster_error(e, ResourceKind::Deployment, &name))?;
            }
            Manifest::Service(spec) => {
                self.api::<Service>()
                    .patch(&name, &params, &Patch::Apply(&make_service(spec)))
                    .await
                    .map_err(|e| cluster_error(e, ResourceKind::Service, &name))?;
            }
        }
        debug!(name = %name, "Applied manifest");
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        match kind {
            ResourceKind::Pod => self.delete_object::<Pod>(kind, name).await,
            ResourceKind::Deployment => self.delete_object::<Deployment>(kind, name).await,
            ResourceKind::Service => self.delete_object::<Service>(kind, name).await,
            ResourceKind::ConfigMap => self.delete_object::<ConfigMap>(kind, name).await,
        }
    }

    async fn read_document(&self, name: &str) -> Result<Option<ConfigDocument>> {
        let config_map = self
            .api::<ConfigMap>()
            .get_opt(name)
            .await
            .map_err(|e| cluster_error(e, ResourceKind::ConfigMap, name))?;
        Ok(config_map.map(|cm| ConfigDocument {
            version: cm.metadata.resource_version.clone(),
            data: cm.data.unwrap_or_default(),
        }))
    }

    async fn write_document(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
        precondition: Precondition,
    ) -> Result<()> {
        match precondition {
            Precondition::Absent => self.create_document(name, data).await,
            // A vanished document is a conflict too.
            Precondition::Version(version) => match self
                .replace_document(name, data, Some(version))
                .await
            {
                Err(Error::Cluster(ClusterError::NotFound { .. })) => {
                    Err(ClusterError::Conflict {
                        name: name.to_string(),
                    }
                    .into())
                }
                other => other,
            },
            Precondition::Any => {
                let exists = self
                    .api::<ConfigMap>()
                    .get_opt(name)
                    .await
                    .map_err(|e| cluster_error(e, ResourceKind::ConfigMap, name))?
                    .is_some();
                if exists {
                    self.replace_document(name, data, None).await
                } else {
                    self.create_document(name, data).await
                }
            }
        }
    }

    async fn stream_logs(&self, pod: &str) -> Result<LogStream> {
        let api = self.api::<Pod>();
        let pod = pod.to_string();
        let params = LogParams {
            follow: true,
            container: Some(CONTAINER_NAME.to_string()),
            ..LogParams::default()
        };
        let (tx, rx) = mpsc::channel::<Result<String>>(LOG_BUFFER);

        // The follower ends when the consumer drops the stream.
        tokio::spawn(async move {
            match api.log_stream(&pod, &params).await {
                Ok(reader) => {
                    let mut lines = std::pin::pin!(reader.lines());
                    while let Some(line) = lines.next().await {
                        if tx.send(line.map_err(Error::from)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(pod = %pod, error = %e, "Log stream request failed");
                    let _ = tx
                        .send(Err(cluster_error(e, ResourceKind::Pod, &pod).into()))
                        .await;
                }
            }
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|line| (line, rx))
        })
        .boxed())
    }

    async fn wait_for(&self, pod: &str, condition: PodCondition, timeout: Duration) -> Result<()> {
        let PodCondition::Ready = condition;
        let wait = await_condition(self.api::<Pod>(), pod, is_pod_ready);
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ClusterError::Api(e.to_string()).into()),
            Err(_) => Err(ClusterError::Timeout {
                what: format!("pod {pod} {condition}"),
                seconds: timeout.as_secs(),
            }
            .into()),
        }
    }
}
