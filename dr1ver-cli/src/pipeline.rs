//! Phase sequencing and final verdict
//!
//! Phases run strictly in order; the first fatal error aborts the rest,
//! cleanup still runs when enabled, and soft failures fold into the
//! verdict at the very end.

use crate::cleanup;
use crate::cluster::{ClusterDescriptor, ClusterManager, ObservedState};
use crate::config::RunConfig;
use crate::context::RunContext;
use crate::deploy;
use crate::exec::CommandRunner;
use crate::image;
use crate::suite;
use crate::toolchain::{ensure_tool, ToolManifest};
use crate::verify::{self, MigrationSignal};
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the final banner needs.
#[derive(Debug, Clone, Copy)]
pub struct Verdict {
    pub tests_passed: bool,
    pub migration: Option<MigrationSignal>,
}

impl Verdict {
    /// Suite green, new path exercised, legacy path silent.
    pub fn passed(&self) -> bool {
        self.tests_passed
            && self
                .migration
                .is_none_or(|signal| signal.csi_path_invoked && !signal.legacy_path_invoked)
    }
}

#[derive(Debug, Clone)]
struct Tools {
    provisioner: PathBuf,
    deployer: PathBuf,
    ginkgo: PathBuf,
    suite_binary: PathBuf,
}

/// Run the whole pipeline and map the outcome to an exit code.
pub async fn execute(cfg: &RunConfig, runner: &dyn CommandRunner) -> Result<i32> {
    let ctx = RunContext::new(cfg)?;
    println!("🚀 run {} → cluster {}", ctx.run_id, ctx.cluster_name);

    let mut tools: Option<Tools> = None;
    let outcome = run_phases(cfg, &ctx, runner, &mut tools).await;

    if let Ok(verdict) = &outcome {
        write_summary(&ctx, verdict);
    }

    if !cfg.skip_cleanup {
        println!("🧹 cleaning up");
        let report = cleanup::run(
            cfg,
            &ctx,
            tools.as_ref().map(|t| t.deployer.as_path()),
            tools.as_ref().map(|t| t.provisioner.as_path()),
            runner,
        );
        tracing::debug!(?report, "cleanup finished");
    }

    match outcome {
        Ok(verdict) => {
            print_verdict(&verdict);
            Ok(i32::from(!verdict.passed()))
        }
        Err(err) => {
            eprintln!("❌ run failed: {err:#}");
            Ok(1)
        }
    }
}

async fn run_phases(
    cfg: &RunConfig,
    ctx: &RunContext,
    runner: &dyn CommandRunner,
    tools_out: &mut Option<Tools>,
) -> Result<Verdict> {
    println!("📋 phase 1/6: toolchain");
    let manifest = ToolManifest::load(cfg.tools_manifest.as_deref())?;
    let install_dir = cfg.install_dir();
    let tools = Tools {
        provisioner: ensure_tool("kops", manifest.get("kops")?, &install_dir, runner)?,
        deployer: ensure_tool("helm", manifest.get("helm")?, &install_dir, runner)?,
        ginkgo: ensure_tool("ginkgo", manifest.get("ginkgo")?, &install_dir, runner)?,
        suite_binary: ensure_tool("e2e-test", manifest.get("e2e-test")?, &install_dir, runner)?,
    };
    *tools_out = Some(tools.clone());

    println!("📦 phase 2/6: driver image");
    image::ensure_image(cfg, ctx, runner)?;

    println!("☸️  phase 3/6: cluster");
    let manager = ClusterManager::new(runner, &tools.provisioner, &cfg.state_store, &ctx.workdir);
    let mut descriptor = ClusterDescriptor::from_config(cfg, ctx);
    manager.reconcile(&mut descriptor)?;
    let healthy = manager
        .wait_until_healthy(
            &descriptor.name,
            Duration::from_secs(cfg.validate_timeout_secs),
            Duration::from_secs(10),
        )
        .await?;
    if !healthy {
        anyhow::bail!(
            "cluster {} failed validation within {}s",
            descriptor.name,
            cfg.validate_timeout_secs
        );
    }
    descriptor.observed = ObservedState::Healthy;

    println!("📦 phase 4/6: deploy driver");
    let record = deploy::deploy(cfg, ctx, &tools.deployer, runner)?;
    tracing::debug!(release = %record.release, image = %record.image_ref, "deployed");

    println!("🧪 phase 5/6: conformance suite");
    let outcome = suite::run_suite(cfg, ctx, &tools.ginkgo, &tools.suite_binary, runner)?;
    println!(
        "  {}",
        if outcome.passed {
            "✅ suite passed"
        } else {
            "❌ suite failed"
        }
    );

    let migration = if cfg.skip_migration_check {
        println!("⏭️  phase 6/6: migration check skipped");
        None
    } else {
        println!("🔎 phase 6/6: migration check");
        Some(verify::verify(cfg).await?)
    };

    Ok(Verdict {
        tests_passed: outcome.passed,
        migration,
    })
}

fn print_verdict(verdict: &Verdict) {
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("suite passed:        {}", verdict.tests_passed);
    if let Some(signal) = verdict.migration {
        println!("csi path invoked:    {}", signal.csi_path_invoked);
        println!("legacy path invoked: {}", signal.legacy_path_invoked);
    }
    println!("{}", if verdict.passed() { "✅ PASS" } else { "❌ FAIL" });
}

fn write_summary(ctx: &RunContext, verdict: &Verdict) {
    let mut summary = String::new();
    summary.push_str(&format!("run_id = \"{}\"\n", ctx.run_id));
    summary.push_str(&format!(
        "finished = \"{}\"\n",
        chrono::Utc::now().to_rfc3339()
    ));
    summary.push_str(&format!("tests_passed = {}\n", verdict.tests_passed));
    if let Some(signal) = verdict.migration {
        summary.push_str(&format!("csi_path_invoked = {}\n", signal.csi_path_invoked));
        summary.push_str(&format!(
            "legacy_path_invoked = {}\n",
            signal.legacy_path_invoked
        ));
    }
    summary.push_str(&format!(
        "verdict = \"{}\"\n",
        if verdict.passed() { "PASS" } else { "FAIL" }
    ));

    if let Err(err) = std::fs::write(ctx.artifact_dir.join("summary.toml"), summary) {
        tracing::warn!(%err, "failed to write run summary");
    }
}
