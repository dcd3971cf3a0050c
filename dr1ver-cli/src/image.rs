//! Driver image publishing
//!
//! A pre-existing tag is trusted as-is and reused without content
//! verification; otherwise the image is built from the source tree and
//! pushed.

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::exec::CommandRunner;
use anyhow::Result;

/// Returns true when the image was built and pushed, false when reused.
pub fn ensure_image(
    cfg: &RunConfig,
    ctx: &RunContext,
    runner: &dyn CommandRunner,
) -> Result<bool> {
    if image_exists(runner, &ctx.image_ref)? {
        println!("  ♻️  reusing image {}", ctx.image_ref);
        return Ok(false);
    }

    if let Some(registry) = registry_host(&ctx.image_ref) {
        runner.output_checked("docker", &["login".to_string(), registry.to_string()])?;
    }

    println!("  🔨 building {}", ctx.image_ref);
    runner.stream_checked(
        "docker",
        &[
            "build".to_string(),
            "-t".to_string(),
            ctx.image_ref.clone(),
            cfg.build_context.display().to_string(),
        ],
    )?;
    runner.stream_checked("docker", &["push".to_string(), ctx.image_ref.clone()])?;
    Ok(true)
}

fn image_exists(runner: &dyn CommandRunner, image_ref: &str) -> Result<bool> {
    // Local presence first, then the registry manifest.
    let local = runner.output(
        "docker",
        &[
            "image".to_string(),
            "inspect".to_string(),
            image_ref.to_string(),
        ],
    )?;
    if local.success {
        return Ok(true);
    }
    let remote = runner.output(
        "docker",
        &[
            "manifest".to_string(),
            "inspect".to_string(),
            image_ref.to_string(),
        ],
    )?;
    Ok(remote.success)
}

/// Registry host is the first path segment when it looks like a hostname.
fn registry_host(image_ref: &str) -> Option<&str> {
    let first = image_ref.split('/').next()?;
    (first.contains('.') || first.contains(':')).then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::exec::CommandOutput;
    use clap::Parser;

    fn fixtures() -> (RunConfig, RunContext) {
        let cfg = RunConfig::parse_from(["dr1ver-cli"]);
        let ctx = RunContext::derive(&cfg, "run-img".to_string());
        (cfg, ctx)
    }

    #[test]
    fn registry_host_detection() {
        assert_eq!(registry_host("gcr.io/proj/driver:v1"), Some("gcr.io"));
        assert_eq!(registry_host("localhost:5000/driver:v1"), Some("localhost:5000"));
        assert_eq!(registry_host("library/driver:v1"), None);
    }

    #[test]
    fn existing_tag_is_reused_without_building() {
        let (cfg, ctx) = fixtures();
        let runner = ScriptedRunner::new().rule("image inspect", CommandOutput::ok("[{}]"));

        let published = ensure_image(&cfg, &ctx, &runner).unwrap();
        assert!(!published);
        assert_eq!(runner.count("build"), 0);
        assert_eq!(runner.count("push"), 0);
    }

    #[test]
    fn missing_tag_is_built_and_pushed() {
        let (cfg, ctx) = fixtures();
        let runner = ScriptedRunner::new()
            .rule("image inspect", CommandOutput::err("no such image"))
            .rule("manifest inspect", CommandOutput::err("not found"));

        let published = ensure_image(&cfg, &ctx, &runner).unwrap();
        assert!(published);
        assert_eq!(runner.count("login"), 1);
        assert_eq!(runner.count("build"), 1);
        assert_eq!(runner.count("push"), 1);
    }

    #[test]
    fn failed_push_is_fatal() {
        let (cfg, ctx) = fixtures();
        let runner = ScriptedRunner::new()
            .rule("image inspect", CommandOutput::err("no such image"))
            .rule("manifest inspect", CommandOutput::err("not found"))
            .rule("push", CommandOutput::err("denied"));

        assert!(ensure_image(&cfg, &ctx, &runner).is_err());
    }
}
