use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// A complete two-environment config file.
pub const CONFIG_YAML: &str = r#"
dev:
  environment: dev
  namespace: dagster
  kubernetes_context: dev-cluster
  container_registry: myregistry.azurecr.io
  image_prefix: dagster
  scheduler_version: 1.9.3
  node: userpool
  requests:
    cpu: "1"
    memory: 1Gi
  limits:
    cpu: "2"
    memory: 2Gi
  env:
    - name: DAGSTER_ENV
      value: dev
    - name: DB_PASSWORD
      secretRef:
        name: db-credentials
        key: password
  gui_url: https://dagster.dev.example.com
  lock_max_attempts: 30
prd:
  environment: prd
  namespace: dagster-prd
  container_registry: myregistry.azurecr.io
  scheduler_version: 1.9.3
  cicd: true
  use_az_login: true
  logging:
    level: warn
    format: json
"#;

/// Write `contents` to a config file inside a fresh temp dir. Keep the
/// returned dir alive for as long as the file is used.
pub fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("uc.yaml");
    fs::write(&path, contents).expect("write temp config");
    (dir, path)
}
