//! Typed Kubernetes objects for a [`WorkloadSpec`].

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar as KubeEnvVar, EnvVarSource, PodSpec, PodTemplateSpec,
    ResourceRequirements as KubeResources, SecretKeySelector, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::domain::record::{EnvSource, EnvVar, ResourceRequirements};
use crate::domain::workload::{WorkloadSpec, CONTAINER_NAME, DEPLOYMENT_LABEL};

fn metadata(spec: &WorkloadSpec) -> ObjectMeta {
    ObjectMeta {
        name: Some(spec.name.to_string()),
        labels: Some(spec.labels.clone()),
        ..ObjectMeta::default()
    }
}

fn selector(spec: &WorkloadSpec) -> BTreeMap<String, String> {
    BTreeMap::from([(DEPLOYMENT_LABEL.to_string(), spec.name.to_string())])
}

fn quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect(),
    )
}

fn resources(resources: &ResourceRequirements) -> KubeResources {
    KubeResources {
        requests: quantities(&resources.requests),
        limits: quantities(&resources.limits),
        ..KubeResources::default()
    }
}

fn env_var(var: &EnvVar) -> KubeEnvVar {
    match &var.source {
        EnvSource::Value(value) => KubeEnvVar {
            name: var.name.clone(),
            value: Some(value.clone()),
            ..KubeEnvVar::default()
        },
        EnvSource::SecretRef(secret) => KubeEnvVar {
            name: var.name.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret.name.clone(),
                    key: secret.key.clone(),
                    optional: None,
                }),
                ..EnvVarSource::default()
            }),
            ..KubeEnvVar::default()
        },
    }
}

/// One-replica deployment running the code server.
pub fn make_deployment(spec: &WorkloadSpec) -> Deployment {
    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        args: Some(spec.args.clone()),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(spec.port),
            name: Some("grpc".to_string()),
            ..ContainerPort::default()
        }]),
        env: Some(spec.env.iter().map(env_var).collect()),
        resources: Some(resources(&spec.resources)),
        ..Container::default()
    };

    Deployment {
        metadata: metadata(spec),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector(spec)),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(spec.labels.clone()),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    node_selector: (!spec.node_selector.is_empty())
                        .then(|| spec.node_selector.clone()),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// ClusterIP service named after the deployment, so the deployment name is
/// also the code server's host name.
pub fn make_service(spec: &WorkloadSpec) -> Service {
    Service {
        metadata: metadata(spec),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector(spec)),
            ports: Some(vec![ServicePort {
                name: Some("grpc".to_string()),
                port: i32::from(spec.port),
                target_port: Some(IntOrString::Int(i32::from(spec.port))),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workload::WorkloadSettings;
    use crate::testkit::domain::record;

    fn spec() -> WorkloadSpec {
        WorkloadSpec::from_record(&record("feature-x", "abc123"), &WorkloadSettings::default())
    }

    #[test]
    fn deployment_runs_user_code_container() {
        let deployment = make_deployment(&spec());
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        let container = &pod.containers[0];

        assert_eq!(container.name, CONTAINER_NAME);
        assert_eq!(
            container.image.as_deref(),
            Some("registry.example.com/dagster/feature-x:abc123")
        );
        assert_eq!(pod.node_selector.unwrap()["kubernetes.io/hostname"], "userpool");
    }

    #[test]
    fn secret_env_is_a_reference() {
        let deployment = make_deployment(&spec());
        let env = deployment.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        let secret = env.iter().find(|e| e.name == "DB_PASSWORD").unwrap();
        assert!(secret.value.is_none());
        let selector = secret.value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap();
        assert_eq!(selector.key, "password");
    }

    #[test]
    fn service_selects_deployment_pods() {
        let service = make_service(&spec());
        assert_eq!(service.metadata.name.as_deref(), Some("feature-x"));
        let spec = service.spec.unwrap();
        assert_eq!(spec.selector.unwrap()[DEPLOYMENT_LABEL], "feature-x");
        assert_eq!(spec.ports.unwrap()[0].port, 3030);
    }
}
