//! Idempotent pinned-tool installer
//!
//! Target paths embed the pinned version, so presence implies the right
//! binary and repeat calls are side-effect free after the first install.

use super::manifest::ToolSpec;
use crate::exec::CommandRunner;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Version-keyed install target for a tool.
pub fn tool_path(install_dir: &Path, name: &str, version: &str) -> PathBuf {
    install_dir.join(format!("{name}-{version}"))
}

/// Ensure `name` exists at its pinned version under `install_dir` and
/// return the binary path.
pub fn ensure_tool(
    name: &str,
    spec: &ToolSpec,
    install_dir: &Path,
    runner: &dyn CommandRunner,
) -> Result<PathBuf> {
    let dest = tool_path(install_dir, name, &spec.version);
    if dest.exists() {
        tracing::debug!(tool = name, path = %dest.display(), "already installed");
        return Ok(dest);
    }

    fs::create_dir_all(install_dir)
        .with_context(|| format!("failed to create {}", install_dir.display()))?;

    println!("  📦 installing {name} {}", spec.version);
    let url = spec.download_url();
    match &spec.archive_path {
        None => download(runner, &url, &dest)?,
        Some(member) => extract(runner, &url, member, &dest)?,
    }

    make_executable(&dest)?;
    Ok(dest)
}

fn download(runner: &dyn CommandRunner, url: &str, dest: &Path) -> Result<()> {
    let args = vec![
        "-sSfL".to_string(),
        "-o".to_string(),
        dest.display().to_string(),
        url.to_string(),
    ];
    runner.output_checked("curl", &args).map(|_| ())
}

fn extract(runner: &dyn CommandRunner, url: &str, member: &str, dest: &Path) -> Result<()> {
    let stem = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tool")
        .to_string();
    let archive = dest.with_file_name(format!("{stem}.tar.gz"));
    let unpack_dir = dest.with_file_name(format!("{stem}.unpack"));

    download(runner, url, &archive)?;
    fs::create_dir_all(&unpack_dir)
        .with_context(|| format!("failed to create {}", unpack_dir.display()))?;
    runner.output_checked(
        "tar",
        &[
            "-xzf".to_string(),
            archive.display().to_string(),
            "-C".to_string(),
            unpack_dir.display().to_string(),
        ],
    )?;
    fs::rename(unpack_dir.join(member), dest)
        .with_context(|| format!("archive member {member} missing from {}", archive.display()))?;

    let _ = fs::remove_file(&archive);
    let _ = fs::remove_dir_all(&unpack_dir);
    Ok(())
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .with_context(|| format!("installed binary missing: {}", path.display()))?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)
            .with_context(|| format!("failed to chmod {}", path.display()))?;
    }
    Ok(())
}
