//! Architecture contract tests.

mod support;

use support::architecture::production_lines_containing;

#[test]
fn domain_has_no_framework_or_outer_layer_imports() {
    let hits = production_lines_containing(
        "src/domain",
        &[
            "crate::adapter",
            "crate::infrastructure",
            "crate::application",
            "crate::port",
            "tokio::",
            "kube::",
            "k8s_openapi::",
        ],
    );

    assert!(
        hits.is_empty(),
        "found forbidden imports in domain layer: {hits:#?}"
    );
}

#[test]
fn ports_depend_only_on_domain() {
    let hits = production_lines_containing(
        "src/port",
        &[
            "crate::adapter",
            "crate::infrastructure",
            "crate::application",
            "kube::",
        ],
    );

    assert!(hits.is_empty(), "found outer-layer imports in ports: {hits:#?}");
}

#[test]
fn application_has_no_adapter_or_infrastructure_imports() {
    let hits = production_lines_containing(
        "src/application",
        &[
            "crate::adapter",
            "crate::infrastructure",
            "kube::",
            "k8s_openapi::",
            "tokio::process",
        ],
    );

    assert!(
        hits.is_empty(),
        "found adapter imports in application layer: {hits:#?}"
    );
}

#[test]
fn only_the_kubernetes_adapter_talks_to_the_api() {
    let hits: Vec<_> = production_lines_containing("src", &["use kube::", "use k8s_openapi::"])
        .into_iter()
        .filter(|line| !line.path.starts_with("src/adapter/outbound/k8s/"))
        .collect();

    assert!(
        hits.is_empty(),
        "found Kubernetes client imports outside the k8s adapter: {hits:#?}"
    );
}
