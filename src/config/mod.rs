//! Service configuration: TOML file, then environment overrides.

pub mod schema;

pub use schema::{
    ClarinetConfig, CompilerConfig, Config, GatewayConfig, GitConfig, GithubConfig,
    SessionConfig,
};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

/// Default config location, e.g. `~/.config/labstx/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "labstx", "labstx")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Expand `~` and `$VARS` in a configured path. Unresolvable variables are
/// left as written.
pub(crate) fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

impl Config {
    /// Load from `path` (or the default location), falling back to defaults
    /// when no file exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::file_or_default(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn file_or_default(path: Option<&Path>) -> Result<Self> {
        match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(p) if p.exists() => Self::from_file(&p),
            Some(p) => {
                tracing::debug!("No config at {}, using defaults", p.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("LABSTX_PORT") {
            match port.trim().parse() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!("Ignoring invalid LABSTX_PORT={port}"),
            }
        }
        if let Some(host) = get("LABSTX_HOST") {
            self.gateway.host = host;
        }
        if let Some(id) = get("GITHUB_CLIENT_ID") {
            self.github.client_id = id;
        }
        if let Some(secret) = get("GITHUB_CLIENT_SECRET") {
            self.github.client_secret = secret;
        }
        if let Some(url) = get("LABSTX_CALLBACK_BASE_URL") {
            self.github.callback_base_url = url;
        }
        if let Some(url) = get("LABSTX_FRONTEND_URL") {
            self.github.frontend_url = url;
        }
        if let Some(url) = get("LABSTX_COMPILER_URL") {
            self.compiler.service_url = url;
        }
    }
}
