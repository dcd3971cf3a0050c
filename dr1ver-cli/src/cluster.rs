//! Cluster reconciliation and health gating
//!
//! Create-if-absent, replace-then-apply if present. The update path pulls
//! the live spec, layers the migration feature gates and the node policy
//! additions onto it, replaces the stored copy, then applies it.

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::exec::CommandRunner;
use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    Absent,
    PresentOutdated,
    PresentCurrent,
    Healthy,
}

#[derive(Debug, Clone)]
pub struct DesiredSpec {
    pub zones: Vec<String>,
    pub node_count: u32,
    pub node_size: String,
    pub kubernetes_version: String,
    pub ssh_public_key: String,
}

#[derive(Debug, Clone)]
pub struct ClusterDescriptor {
    pub name: String,
    pub spec: DesiredSpec,
    pub observed: ObservedState,
}

impl ClusterDescriptor {
    pub fn from_config(cfg: &RunConfig, ctx: &RunContext) -> Self {
        Self {
            name: ctx.cluster_name.clone(),
            spec: DesiredSpec {
                zones: cfg.zones.clone(),
                node_count: cfg.node_count,
                node_size: cfg.instance_type.clone(),
                kubernetes_version: cfg.kubernetes_version.clone(),
                ssh_public_key: cfg.ssh_public_key_path().display().to_string(),
            },
            observed: ObservedState::Absent,
        }
    }
}

/// Feature gates flipped on across kubelet and controller-manager.
const MIGRATION_FEATURE_GATES: &[&str] = &["CSIMigration", "CSIMigrationGCE"];

/// Policy additions worker nodes need for the driver's disk operations.
const NODE_POLICY_ADDITIONS: &str = r#"[{"Effect":"Allow","Action":["compute.disks.create","compute.disks.createSnapshot","compute.disks.delete","compute.disks.get","compute.disks.resize","compute.instances.attachDisk","compute.instances.detachDisk"],"Resource":["*"]}]"#;

pub struct ClusterManager<'a> {
    runner: &'a dyn CommandRunner,
    provisioner: String,
    state_store: String,
    workdir: PathBuf,
}

impl<'a> ClusterManager<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        provisioner: &Path,
        state_store: &str,
        workdir: &Path,
    ) -> Self {
        Self {
            runner,
            provisioner: provisioner.display().to_string(),
            state_store: state_store.to_string(),
            workdir: workdir.to_path_buf(),
        }
    }

    /// Absent → exactly one create; present → replace + apply. Never both.
    pub fn reconcile(&self, descriptor: &mut ClusterDescriptor) -> Result<()> {
        match self.observe(&descriptor.name)? {
            None => {
                descriptor.observed = ObservedState::Absent;
                println!("  ✨ creating cluster {}", descriptor.name);
                self.create(descriptor)?;
            }
            Some(live_spec) => {
                descriptor.observed = ObservedState::PresentOutdated;
                println!("  🔁 updating cluster {}", descriptor.name);
                self.update(descriptor, &live_spec)?;
            }
        }
        descriptor.observed = ObservedState::PresentCurrent;
        Ok(())
    }

    /// Polls validation until success or the deadline; the caller treats a
    /// false return as fatal.
    pub async fn wait_until_healthy(
        &self,
        name: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let out = self
                .runner
                .output(&self.provisioner, &self.args(&["validate", "cluster", "--name", name]))?;
            if out.success {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tracing::debug!(cluster = name, "validation not ready yet");
            tokio::time::sleep(interval).await;
        }
    }

    fn observe(&self, name: &str) -> Result<Option<String>> {
        let out = self.runner.output(
            &self.provisioner,
            &self.args(&["get", "cluster", "--name", name, "-o", "yaml"]),
        )?;
        Ok(out.success.then_some(out.stdout))
    }

    fn create(&self, descriptor: &ClusterDescriptor) -> Result<()> {
        let spec = &descriptor.spec;
        let args = self.args(&[
            "create",
            "cluster",
            "--name",
            &descriptor.name,
            "--zones",
            &spec.zones.join(","),
            "--node-count",
            &spec.node_count.to_string(),
            "--node-size",
            &spec.node_size,
            "--kubernetes-version",
            &spec.kubernetes_version,
            "--ssh-public-key",
            &spec.ssh_public_key,
            "--yes",
        ]);
        self.runner
            .stream_checked(&self.provisioner, &args)
            .map(|_| ())
    }

    fn update(&self, descriptor: &ClusterDescriptor, live_spec: &str) -> Result<()> {
        let mut doc: Value =
            serde_yaml::from_str(live_spec).context("failed to parse live cluster spec")?;
        apply_migration_overlays(&mut doc)?;

        let spec_file = self.workdir.join(format!("{}.yaml", descriptor.name));
        let rendered = serde_yaml::to_string(&doc).context("failed to render cluster spec")?;
        std::fs::write(&spec_file, rendered)
            .with_context(|| format!("failed to write {}", spec_file.display()))?;

        self.runner.output_checked(
            &self.provisioner,
            &self.args(&["replace", "-f", &spec_file.display().to_string()]),
        )?;
        self.runner.stream_checked(
            &self.provisioner,
            &self.args(&["update", "cluster", "--name", &descriptor.name, "--yes"]),
        )?;
        Ok(())
    }

    fn args(&self, parts: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = parts.iter().map(|s| (*s).to_string()).collect();
        args.push("--state".to_string());
        args.push(self.state_store.clone());
        args
    }
}

/// Layer the fixed migration overlays onto a live cluster spec document.
pub fn apply_migration_overlays(doc: &mut Value) -> Result<()> {
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| anyhow::anyhow!("cluster spec is not a mapping"))?;
    let spec = ensure_map(root, "spec");

    for section in ["kubelet", "kubeControllerManager"] {
        let gates = ensure_map(ensure_map(spec, section), "featureGates");
        for gate in MIGRATION_FEATURE_GATES {
            gates.insert(
                Value::String((*gate).to_string()),
                Value::String("true".to_string()),
            );
        }
    }

    let policies = ensure_map(spec, "additionalPolicies");
    policies.insert(
        Value::String("node".to_string()),
        Value::String(NODE_POLICY_ADDITIONS.to_string()),
    );
    Ok(())
}

fn ensure_map<'a>(map: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    let key = Value::String(key.to_string());
    if !matches!(map.get(&key), Some(Value::Mapping(_))) {
        map.insert(key.clone(), Value::Mapping(Mapping::new()));
    }
    match map.get_mut(&key) {
        Some(Value::Mapping(inner)) => inner,
        _ => unreachable!("inserted above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::exec::CommandOutput;

    const LIVE_SPEC: &str = "apiVersion: kops.k8s.io/v1alpha2\nkind: Cluster\nmetadata:\n  name: run-a.k8s.local\nspec:\n  kubernetesVersion: 1.30.2\n";

    fn descriptor() -> ClusterDescriptor {
        ClusterDescriptor {
            name: "run-a.k8s.local".to_string(),
            spec: DesiredSpec {
                zones: vec!["us-central1-b".to_string()],
                node_count: 3,
                node_size: "n1-standard-2".to_string(),
                kubernetes_version: "1.30.2".to_string(),
                ssh_public_key: "/tmp/key.pub".to_string(),
            },
            observed: ObservedState::Absent,
        }
    }

    #[test]
    fn absent_cluster_gets_exactly_one_create() {
        let workdir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().rule("get cluster", CommandOutput::err("not found"));
        let manager = ClusterManager::new(&runner, Path::new("kops"), "gs://store", workdir.path());

        let mut desc = descriptor();
        manager.reconcile(&mut desc).unwrap();

        assert_eq!(runner.count("create cluster"), 1);
        assert_eq!(runner.count("replace"), 0);
        assert_eq!(runner.count("update cluster"), 0);
        assert_eq!(desc.observed, ObservedState::PresentCurrent);
    }

    #[test]
    fn present_cluster_gets_replace_and_apply_only() {
        let workdir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().rule("get cluster", CommandOutput::ok(LIVE_SPEC));
        let manager = ClusterManager::new(&runner, Path::new("kops"), "gs://store", workdir.path());

        let mut desc = descriptor();
        manager.reconcile(&mut desc).unwrap();

        assert_eq!(runner.count("create cluster"), 0);
        assert_eq!(runner.count("replace"), 1);
        assert_eq!(runner.count("update cluster"), 1);

        // The replaced spec carries the migration overlays.
        let written =
            std::fs::read_to_string(workdir.path().join("run-a.k8s.local.yaml")).unwrap();
        assert!(written.contains("CSIMigration"));
        assert!(written.contains("additionalPolicies"));
    }

    #[test]
    fn overlays_preserve_existing_spec_fields() {
        let mut doc: Value = serde_yaml::from_str(LIVE_SPEC).unwrap();
        apply_migration_overlays(&mut doc).unwrap();
        let rendered = serde_yaml::to_string(&doc).unwrap();
        assert!(rendered.contains("kubernetesVersion: 1.30.2"));
        assert!(rendered.contains("CSIMigrationGCE"));
        assert!(rendered.contains("compute.disks.create"));
    }

    #[test]
    fn node_policy_is_a_valid_policy_document() {
        let parsed: serde_json::Value = serde_json::from_str(NODE_POLICY_ADDITIONS).unwrap();
        let statements = parsed.as_array().unwrap();
        assert!(!statements.is_empty());
        assert_eq!(statements[0]["Effect"], "Allow");
    }

    #[test]
    fn overlays_reject_non_mapping_spec() {
        let mut doc: Value = serde_yaml::from_str("- just\n- a\n- list\n").unwrap();
        assert!(apply_migration_overlays(&mut doc).is_err());
    }

    #[tokio::test]
    async fn validation_success_reports_healthy() {
        let workdir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let manager = ClusterManager::new(&runner, Path::new("kops"), "gs://store", workdir.path());

        let healthy = manager
            .wait_until_healthy(
                "run-a.k8s.local",
                Duration::from_secs(5),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert!(healthy);
        assert_eq!(runner.count("validate cluster"), 1);
    }

    #[tokio::test]
    async fn validation_timeout_reports_unhealthy() {
        let workdir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().rule("validate cluster", CommandOutput::err("not ready"));
        let manager = ClusterManager::new(&runner, Path::new("kops"), "gs://store", workdir.path());

        let healthy = manager
            .wait_until_healthy("run-a.k8s.local", Duration::ZERO, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(!healthy);
    }
}
