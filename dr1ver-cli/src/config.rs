//! Run configuration
//!
//! One explicit struct constructed at entry and passed into every phase;
//! phases never read process environment directly. Every knob has a default
//! and a `DR1VER_*` environment override.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
pub struct RunConfig {
    /// Run identifier scoping every resource this invocation creates.
    /// Generated when absent.
    #[clap(long, env = "DR1VER_RUN_ID")]
    pub run_id: Option<String>,

    #[clap(long, env = "DR1VER_REGION", default_value = "us-central1")]
    pub region: String,

    /// Ordered zone list for the cluster.
    #[clap(
        long,
        env = "DR1VER_ZONES",
        value_delimiter = ',',
        default_value = "us-central1-b"
    )]
    pub zones: Vec<String>,

    #[clap(long, env = "DR1VER_INSTANCE_TYPE", default_value = "n1-standard-2")]
    pub instance_type: String,

    #[clap(long, env = "DR1VER_NODE_COUNT", default_value_t = 3)]
    pub node_count: u32,

    /// Target platform version for the provisioned cluster.
    #[clap(long, env = "DR1VER_KUBERNETES_VERSION", default_value = "1.30.2")]
    pub kubernetes_version: String,

    /// Remote state store for the cluster provisioner.
    #[clap(
        long,
        env = "DR1VER_STATE_STORE",
        default_value = "gs://dr1ver-state-store"
    )]
    pub state_store: String,

    #[clap(long, env = "DR1VER_SSH_PUBLIC_KEY", default_value = "~/.ssh/id_rsa.pub")]
    pub ssh_public_key: String,

    #[clap(long, env = "DR1VER_KUBECONFIG", default_value = "~/.kube/config")]
    pub kubeconfig: String,

    /// Where pinned tool binaries are installed.
    #[clap(long, env = "DR1VER_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Parent of per-run working directories.
    #[clap(long, env = "DR1VER_WORK_ROOT", default_value = "/tmp/dr1ver")]
    pub work_root: PathBuf,

    /// Overrides `<workdir>/artifacts`.
    #[clap(long, env = "DR1VER_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Pinned-tool manifest; built-in pins are used when absent.
    #[clap(long, env = "DR1VER_TOOLS_MANIFEST")]
    pub tools_manifest: Option<PathBuf>,

    /// Driver image repository; the run id becomes the tag.
    #[clap(
        long,
        env = "DR1VER_IMAGE_REPO",
        default_value = "gcr.io/dr1ver-staging/csi-driver"
    )]
    pub image_repo: String,

    /// Container build context for the driver image.
    #[clap(long, env = "DR1VER_BUILD_CONTEXT", default_value = ".")]
    pub build_context: PathBuf,

    #[clap(long, env = "DR1VER_RELEASE_NAME", default_value = "csi-driver")]
    pub release_name: String,

    #[clap(long, env = "DR1VER_NAMESPACE", default_value = "csi-driver")]
    pub namespace: String,

    #[clap(long, env = "DR1VER_CHART", default_value = "deploy/chart")]
    pub chart: String,

    #[clap(
        long,
        env = "DR1VER_TEST_FOCUS",
        default_value = r"\[sig-storage\].*csi-migration"
    )]
    pub focus: String,

    #[clap(
        long,
        env = "DR1VER_TEST_SKIP",
        default_value = r"\[Disruptive\]|\[Serial\]"
    )]
    pub skip: String,

    #[clap(long, env = "DR1VER_TEST_PARALLELISM", default_value_t = 4)]
    pub parallelism: u32,

    /// Label selector for the node hosting controller metrics.
    #[clap(
        long,
        env = "DR1VER_NODE_SELECTOR",
        default_value = "node-role.kubernetes.io/control-plane"
    )]
    pub node_selector: String,

    /// Controller pod name is `<prefix>-<node>` in the metrics namespace.
    #[clap(
        long,
        env = "DR1VER_METRICS_POD_PREFIX",
        default_value = "kube-controller-manager"
    )]
    pub metrics_pod_prefix: String,

    #[clap(long, env = "DR1VER_METRICS_NAMESPACE", default_value = "kube-system")]
    pub metrics_namespace: String,

    #[clap(long, env = "DR1VER_METRICS_PORT", default_value_t = 10252)]
    pub metrics_port: u16,

    #[clap(long, env = "DR1VER_LOCAL_PORT", default_value_t = 10252)]
    pub local_port: u16,

    /// Seconds between tunnel-readiness probes.
    #[clap(long, env = "DR1VER_POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval_secs: u64,

    /// Tunnel readiness deadline in seconds; expiry is fatal.
    #[clap(long, env = "DR1VER_TUNNEL_TIMEOUT", default_value_t = 60)]
    pub tunnel_timeout_secs: u64,

    /// Cluster validation deadline in seconds.
    #[clap(long, env = "DR1VER_VALIDATE_TIMEOUT", default_value_t = 600)]
    pub validate_timeout_secs: u64,

    /// Counter-bucket pattern proving the new driver handled provisioning.
    #[clap(
        long,
        env = "DR1VER_CSI_METRIC_PATTERN",
        default_value = r#"csi_sidecar_operations_seconds_bucket\{.*method_name="/csi\.v1\.Controller/CreateVolume""#
    )]
    pub csi_metric_pattern: String,

    /// Counter-bucket pattern betraying the legacy in-tree path.
    #[clap(
        long,
        env = "DR1VER_LEGACY_METRIC_PATTERN",
        default_value = r#"storage_operation_duration_seconds_bucket\{.*volume_plugin="kubernetes\.io/gce-pd""#
    )]
    pub legacy_metric_pattern: String,

    /// Skip the controller-metrics migration check.
    #[clap(long, env = "DR1VER_SKIP_MIGRATION_CHECK")]
    pub skip_migration_check: bool,

    /// Leave the cluster and working directory behind.
    #[clap(long, env = "DR1VER_SKIP_CLEANUP")]
    pub skip_cleanup: bool,
}

pub fn default_install_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dr1ver")
        .join("bin")
}

impl RunConfig {
    pub fn install_dir(&self) -> PathBuf {
        self.install_dir.clone().unwrap_or_else(default_install_dir)
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.kubeconfig).into_owned())
    }

    pub fn ssh_public_key_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.ssh_public_key).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> RunConfig {
        RunConfig::parse_from(["dr1ver-cli"])
    }

    #[test]
    fn defaults_parse() {
        let cfg = defaults();
        assert_eq!(cfg.zones, vec!["us-central1-b".to_string()]);
        assert_eq!(cfg.node_count, 3);
        assert!(!cfg.skip_cleanup);
        assert!(!cfg.skip_migration_check);
    }

    #[test]
    fn zones_are_comma_delimited() {
        let cfg = RunConfig::parse_from(["dr1ver-cli", "--zones", "us-east1-b,us-east1-c"]);
        assert_eq!(cfg.zones, vec!["us-east1-b", "us-east1-c"]);
    }

    #[test]
    fn tilde_paths_expand() {
        let cfg = defaults();
        assert!(!cfg.kubeconfig_path().to_string_lossy().contains('~'));
        assert!(!cfg.ssh_public_key_path().to_string_lossy().contains('~'));
    }

    #[test]
    fn default_metric_patterns_compile() {
        let cfg = defaults();
        assert!(regex::Regex::new(&cfg.csi_metric_pattern).is_ok());
        assert!(regex::Regex::new(&cfg.legacy_metric_pattern).is_ok());
    }
}
