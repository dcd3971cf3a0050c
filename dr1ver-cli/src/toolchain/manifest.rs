//! Tool pinning manifest
//!
//! TOML mapping of tool name to pinned version and download location.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Built-in pins, override-able with `--tools-manifest`.
const DEFAULT_MANIFEST: &str = include_str!("../../tools.toml");

#[derive(Debug, Deserialize)]
pub struct ToolManifest {
    pub tools: BTreeMap<String, ToolSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolSpec {
    pub version: String,
    /// Download URL; `{version}` expands to the pinned version.
    pub url: String,
    /// When set, the URL is a tarball and this member is the binary.
    #[serde(default)]
    pub archive_path: Option<String>,
}

impl ToolManifest {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                toml::from_str(&content).with_context(|| format!("failed to parse {}", p.display()))
            }
            None => toml::from_str(DEFAULT_MANIFEST).context("built-in tool manifest is invalid"),
        }
    }

    pub fn get(&self, name: &str) -> Result<&ToolSpec> {
        self.tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("tool not pinned in manifest: {name}"))
    }
}

impl ToolSpec {
    pub fn download_url(&self) -> String {
        self.url.replace("{version}", &self.version)
    }
}
