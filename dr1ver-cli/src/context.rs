//! Run-scoped identity
//!
//! Everything an invocation creates (cluster, image tag, working directory)
//! is derived from one run identifier, so concurrent runs cannot observe or
//! mutate each other's resources.

use crate::config::RunConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub cluster_name: String,
    pub image_ref: String,
    pub workdir: PathBuf,
    pub artifact_dir: PathBuf,
}

impl RunContext {
    /// Derive all run-scoped names and create the working directory tree.
    pub fn new(cfg: &RunConfig) -> Result<Self> {
        let run_id = cfg.run_id.clone().unwrap_or_else(generate_run_id);
        let ctx = Self::derive(cfg, run_id);
        fs::create_dir_all(&ctx.workdir)
            .with_context(|| format!("failed to create workdir {}", ctx.workdir.display()))?;
        fs::create_dir_all(&ctx.artifact_dir).with_context(|| {
            format!(
                "failed to create artifact dir {}",
                ctx.artifact_dir.display()
            )
        })?;
        Ok(ctx)
    }

    /// Pure derivation, shared with teardown-only invocations.
    pub fn derive(cfg: &RunConfig, run_id: String) -> Self {
        let cluster_name = format!("{run_id}.k8s.local");
        let image_ref = format!("{}:{run_id}", cfg.image_repo);
        let workdir = cfg.work_root.join(&run_id);
        let artifact_dir = cfg
            .artifact_dir
            .clone()
            .unwrap_or_else(|| workdir.join("artifacts"));
        Self {
            run_id,
            cluster_name,
            image_ref,
            workdir,
            artifact_dir,
        }
    }
}

fn generate_run_id() -> String {
    // Cluster names must be DNS labels; keep it short and lowercase.
    format!("e2e-{}", &Uuid::new_v4().simple().to_string()[..8])
}
