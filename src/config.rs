//! Project configuration.
//!
//! This module defines the structure of the optional `nitro-proxy.toml` file
//! in the project root. Every field is optional; command-line flags take
//! precedence over the file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// File name looked up in the project root.
pub const CONFIG_FILE: &str = "nitro-proxy.toml";

/// Top-level configuration structure corresponding to `nitro-proxy.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Front-end output directory, relative to the project root (default: "dist").
    pub out_dir: Option<String>,
    /// Runtime whose processes are scanned for title markers (default: "node").
    pub runtime: Option<String>,
    /// Title marker given to launched servers (default: "nitro-proxy").
    pub title: Option<String>,
    /// Server engine build preset (default: "node-cluster").
    pub preset: Option<String>,
    /// Whether the server bundle is minified (default: true).
    pub minify: Option<bool>,
    /// Port the built server listens on (default: 3000).
    pub port: Option<u16>,
    /// Reject proxy prefixes that compile to the same route (default: false).
    pub strict_routes: Option<bool>,
    /// Front-end build tool.
    #[serde(rename = "type")]
    pub frontend: Option<FrontendKind>,
    /// Server engine settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Path prefix to proxy target, in file order.
    #[serde(default)]
    pub proxy: toml::Table,
}

/// Settings for the external server-build collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Command that builds the server from the generated options file.
    pub build_command: Option<String>,
}

/// Front-end build tools whose output can be served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FrontendKind {
    #[default]
    Vite,
    VueCli,
}

impl FrontendKind {
    /// Executable of the build tool.
    pub fn binary(&self) -> &'static str {
        match self {
            FrontendKind::Vite => "vite",
            FrontendKind::VueCli => "vue-cli-service",
        }
    }

    /// Command a `package.json` script must contain to count as the build.
    pub fn build_command(&self) -> String {
        format!("{} build", self.binary())
    }
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Loads `nitro-proxy.toml` from `root`, or defaults when there is none.
pub fn load_project_config(root: &Path) -> Result<Config> {
    let path = root.join(CONFIG_FILE);
    if path.exists() {
        load_config(&path)
    } else {
        Ok(Config::default())
    }
}
