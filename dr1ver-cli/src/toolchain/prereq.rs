//! Environment prereq report
//!
//! Resolves the ambient binaries the pipeline shells out to and the pinned
//! tools from the manifest, extracting versions where the tools admit it.

use super::installer::tool_path;
use super::manifest::ToolManifest;
use crate::exec::CommandRunner;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Ambient binaries with minimum versions where one matters.
const AMBIENT_BINS: &[(&str, Option<&str>)] = &[
    ("docker", Some(">=20.10.0")),
    ("kubectl", Some(">=1.27.0")),
    ("curl", None),
    ("tar", None),
];

#[derive(Debug)]
pub struct BinaryCheck {
    pub name: String,
    pub found: bool,
    pub installed_version: Option<String>,
    pub required_version: Option<String>,
    pub meets_requirement: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct EnvReport {
    pub ambient: Vec<BinaryCheck>,
    pub pinned: Vec<BinaryCheck>,
    pub all_present: bool,
}

pub fn check_environment(
    manifest: &ToolManifest,
    install_dir: &Path,
    runner: &dyn CommandRunner,
) -> Result<EnvReport> {
    let mut ambient = Vec::new();
    for (name, requirement) in AMBIENT_BINS {
        let path = find_binary(runner, name);
        let found = path.is_some();
        let installed_version = found.then(|| probe_version(runner, name)).flatten();
        let meets_requirement = match (requirement, &installed_version) {
            (Some(req), Some(version)) => version_meets(version, req).unwrap_or(false),
            // Binary found but version unknown - assume OK.
            _ => found,
        };
        ambient.push(BinaryCheck {
            name: (*name).to_string(),
            found,
            installed_version,
            required_version: requirement.map(str::to_string),
            meets_requirement,
            path,
        });
    }

    let mut pinned = Vec::new();
    for (name, spec) in &manifest.tools {
        let dest = tool_path(install_dir, name, &spec.version);
        let found = dest.exists();
        pinned.push(BinaryCheck {
            name: name.clone(),
            found,
            installed_version: found.then(|| spec.version.clone()),
            required_version: Some(format!("={}", spec.version)),
            meets_requirement: found,
            path: found.then_some(dest),
        });
    }

    let all_present = ambient.iter().all(|b| b.found && b.meets_requirement);
    Ok(EnvReport {
        ambient,
        pinned,
        all_present,
    })
}

fn find_binary(runner: &dyn CommandRunner, name: &str) -> Option<PathBuf> {
    let out = runner.output("which", &[name.to_string()]).ok()?;
    out.success.then(|| PathBuf::from(out.stdout.trim()))
}

fn probe_version(runner: &dyn CommandRunner, name: &str) -> Option<String> {
    let out = runner.output(name, &["--version".to_string()]).ok()?;
    out.success.then(|| extract_version(&out.stdout)).flatten()
}

/// Pull "X.Y.Z" out of arbitrary `--version` chatter.
pub fn extract_version(output: &str) -> Option<String> {
    let re = regex::Regex::new(r"v?(\d+\.\d+\.\d+)").ok()?;
    re.captures(output)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// ">=X.Y.Z"-style requirement gate.
pub fn version_meets(installed: &str, requirement: &str) -> Result<bool> {
    let installed = semver::Version::parse(installed.trim())
        .with_context(|| format!("unparseable version: {installed}"))?;
    let req = semver::VersionReq::parse(requirement.trim())
        .with_context(|| format!("unparseable requirement: {requirement}"))?;
    Ok(req.matches(&installed))
}
