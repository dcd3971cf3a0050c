//! Best-effort teardown
//!
//! Each sub-step runs regardless of the others' outcomes; failures are
//! logged and never escalate into the run verdict.

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::exec::CommandRunner;
use std::path::Path;

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub release_uninstalled: bool,
    pub cluster_deleted: bool,
    pub workdir_removed: bool,
}

/// Uninstall the release, delete the cluster, remove the working directory.
/// Tool paths are optional because an early fatal failure can leave the
/// toolchain unprepared; whatever can still be attempted, is.
pub fn run(
    cfg: &RunConfig,
    ctx: &RunContext,
    deployer: Option<&Path>,
    provisioner: Option<&Path>,
    runner: &dyn CommandRunner,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    if let Some(deployer) = deployer {
        let args = vec![
            "uninstall".to_string(),
            cfg.release_name.clone(),
            "--namespace".to_string(),
            cfg.namespace.clone(),
            "--kubeconfig".to_string(),
            cfg.kubeconfig_path().display().to_string(),
        ];
        match runner.output(&deployer.display().to_string(), &args) {
            Ok(out) if out.success => report.release_uninstalled = true,
            Ok(out) => tracing::warn!(
                release = %cfg.release_name,
                stderr = %out.stderr.trim(),
                "release uninstall failed"
            ),
            Err(err) => tracing::warn!(%err, "release uninstall failed"),
        }
    }

    if let Some(provisioner) = provisioner {
        let args = vec![
            "delete".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            ctx.cluster_name.clone(),
            "--state".to_string(),
            cfg.state_store.clone(),
            "--yes".to_string(),
        ];
        match runner.output(&provisioner.display().to_string(), &args) {
            Ok(out) if out.success => report.cluster_deleted = true,
            Ok(out) => tracing::warn!(
                cluster = %ctx.cluster_name,
                stderr = %out.stderr.trim(),
                "cluster delete failed"
            ),
            Err(err) => tracing::warn!(%err, "cluster delete failed"),
        }
    }

    match std::fs::remove_dir_all(&ctx.workdir) {
        Ok(()) => report.workdir_removed = true,
        Err(err) => {
            tracing::warn!(workdir = %ctx.workdir.display(), %err, "workdir removal failed");
        }
    }

    report
}
