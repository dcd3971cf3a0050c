//! `check` - environment prereq report

use crate::config::default_install_dir;
use crate::exec::ProcessRunner;
use crate::toolchain::prereq::{check_environment, BinaryCheck};
use crate::toolchain::ToolManifest;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Pinned-tool manifest; built-in pins are used when absent.
    #[clap(long, env = "DR1VER_TOOLS_MANIFEST")]
    pub tools_manifest: Option<PathBuf>,

    /// Where pinned tool binaries are installed.
    #[clap(long, env = "DR1VER_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,
}

pub fn handle(args: CheckArgs) -> Result<i32> {
    let manifest = ToolManifest::load(args.tools_manifest.as_deref())?;
    let install_dir = args.install_dir.unwrap_or_else(default_install_dir);

    let report = check_environment(&manifest, &install_dir, &ProcessRunner)?;

    println!("📋 environment report");
    println!();
    println!("ambient binaries:");
    for check in &report.ambient {
        print_check(check);
    }
    println!();
    println!("pinned tools ({}):", install_dir.display());
    for check in &report.pinned {
        print_check(check);
    }

    println!();
    if report.all_present {
        println!("✅ environment ready");
        Ok(0)
    } else {
        println!("⚠️  required binaries missing or too old");
        Ok(1)
    }
}

fn print_check(check: &BinaryCheck) {
    let status = if check.found && check.meets_requirement {
        "✅"
    } else if check.found {
        "⚠️"
    } else {
        "❌"
    };
    print!("  {status} {}", check.name);
    match (&check.installed_version, &check.required_version) {
        (Some(installed), Some(required)) => println!(" (installed: {installed}, requires: {required})"),
        (Some(installed), None) => println!(" (installed: {installed})"),
        (None, Some(required)) => println!(" (not installed, requires: {required})"),
        (None, None) => println!(" (not installed)"),
    }
}
