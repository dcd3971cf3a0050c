//! `cleanup` - teardown-only invocation for a previous run

use crate::cleanup;
use crate::config::RunConfig;
use crate::context::RunContext;
use crate::exec::ProcessRunner;
use crate::toolchain::{ensure_tool, ToolManifest};
use anyhow::Result;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct CleanupArgs {
    #[clap(flatten)]
    pub config: RunConfig,
}

pub async fn handle(args: CleanupArgs) -> Result<i32> {
    let cfg = args.config;
    let run_id = cfg
        .run_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--run-id is required for cleanup"))?;
    let ctx = RunContext::derive(&cfg, run_id);

    let manifest = ToolManifest::load(cfg.tools_manifest.as_deref())?;
    let install_dir = cfg.install_dir();
    let runner = ProcessRunner;
    let deployer = ensure_tool("helm", manifest.get("helm")?, &install_dir, &runner)?;
    let provisioner = ensure_tool("kops", manifest.get("kops")?, &install_dir, &runner)?;

    println!("🧹 tearing down run {}", ctx.run_id);
    let report = cleanup::run(&cfg, &ctx, Some(&deployer), Some(&provisioner), &runner);
    println!(
        "  release uninstalled: {}, cluster deleted: {}, workdir removed: {}",
        report.release_uninstalled, report.cluster_deleted, report.workdir_removed
    );
    Ok(0)
}
