//! Driver package deployment
//!
//! Install-or-upgrade upsert. The deployer tool is idempotent here, so no
//! explicit create/update branching is needed, unlike cluster
//! reconciliation.

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::exec::CommandRunner;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub release: String,
    pub namespace: String,
    pub options: BTreeMap<String, String>,
    pub image_ref: String,
}

/// Fixed profile: scheduling, resizing, and snapshot support on, plus the
/// image under test.
fn option_set(image_ref: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("controller.image".to_string(), image_ref.to_string()),
        ("enableVolumeScheduling".to_string(), "true".to_string()),
        ("enableVolumeResizing".to_string(), "true".to_string()),
        ("enableVolumeSnapshot".to_string(), "true".to_string()),
    ])
}

pub fn deploy(
    cfg: &RunConfig,
    ctx: &RunContext,
    deployer: &Path,
    runner: &dyn CommandRunner,
) -> Result<DeploymentRecord> {
    let options = option_set(&ctx.image_ref);

    let mut args: Vec<String> = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        cfg.release_name.clone(),
        cfg.chart.clone(),
        "--namespace".to_string(),
        cfg.namespace.clone(),
        "--create-namespace".to_string(),
        "--kubeconfig".to_string(),
        cfg.kubeconfig_path().display().to_string(),
        "--wait".to_string(),
    ];
    for (key, value) in &options {
        args.push("--set".to_string());
        args.push(format!("{key}={value}"));
    }

    runner.stream_checked(&deployer.display().to_string(), &args)?;

    Ok(DeploymentRecord {
        release: cfg.release_name.clone(),
        namespace: cfg.namespace.clone(),
        options,
        image_ref: ctx.image_ref.clone(),
    })
}
