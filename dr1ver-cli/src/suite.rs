//! Conformance suite execution
//!
//! The runner is a black box: focus/skip/parallelism in, exit status and an
//! artifact directory out. A failing suite is recorded as data, not raised;
//! only a runner that cannot be spawned is fatal.

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::exec::CommandRunner;
use anyhow::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub focus: String,
    pub skip: String,
    pub parallelism: u32,
    pub passed: bool,
    pub artifact_path: PathBuf,
}

pub fn run_suite(
    cfg: &RunConfig,
    ctx: &RunContext,
    ginkgo: &Path,
    suite_binary: &Path,
    runner: &dyn CommandRunner,
) -> Result<TestOutcome> {
    let mut args = vec![
        format!("--focus={}", cfg.focus),
        format!("--skip={}", cfg.skip),
        format!("--procs={}", cfg.parallelism),
        suite_binary.display().to_string(),
        "--".to_string(),
        format!("--kubeconfig={}", cfg.kubeconfig_path().display()),
        format!("--report-dir={}", ctx.artifact_dir.display()),
        "--provider=gce".to_string(),
        format!("--gce-region={}", cfg.region),
    ];
    if let Some(zone) = cfg.zones.first() {
        args.push(format!("--gce-zone={zone}"));
    }

    let out = runner.stream(&ginkgo.display().to_string(), &args)?;

    Ok(TestOutcome {
        focus: cfg.focus.clone(),
        skip: cfg.skip.clone(),
        parallelism: cfg.parallelism,
        passed: out.success,
        artifact_path: ctx.artifact_dir.clone(),
    })
}
