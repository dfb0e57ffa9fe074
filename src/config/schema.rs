use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level service configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub clarinet: ClarinetConfig,
    pub session: SessionConfig,
    pub github: GithubConfig,
    pub compiler: CompilerConfig,
    pub git: GitConfig,
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

// ── Gateway ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Maximum JSON request body in bytes.
    pub body_limit_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5001,
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "https://lab-stx-ide.vercel.app".into(),
            ],
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

// ── Clarinet ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClarinetConfig {
    /// Directory whose `bin/` is searched first for the binary. Defaults to
    /// the directory of the running executable.
    pub install_dir: Option<String>,
    /// Where per-request workspaces are created. Defaults to the OS temp dir.
    pub scratch_dir: Option<String>,
    /// Upper bound for one CLI invocation.
    pub timeout_secs: u64,
    /// Release fetched by `install-clarinet`.
    pub version: String,
    /// Release asset fetched by `install-clarinet`.
    pub asset: String,
}

impl Default for ClarinetConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            scratch_dir: None,
            timeout_secs: 300,
            version: "v2.11.0".into(),
            asset: "clarinet-linux-x64-glibc.tar.gz".into(),
        }
    }
}

impl ClarinetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn install_dir(&self) -> Option<PathBuf> {
        self.install_dir.as_deref().map(super::expand_path)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .as_deref()
            .map(super::expand_path)
            .unwrap_or_else(std::env::temp_dir)
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is dropped. `0` keeps sessions forever.
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ── GitHub ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Public base URL the OAuth callback is served under.
    pub callback_base_url: String,
    /// Where the browser is sent after login/logout.
    pub frontend_url: String,
    pub api_base: String,
    pub oauth_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_base_url: "http://localhost:3000".into(),
            frontend_url: "http://localhost:3000/".into(),
            api_base: "https://api.github.com".into(),
            oauth_base: "https://github.com".into(),
        }
    }
}

impl GithubConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

// ── Compiler proxy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    pub service_url: String,
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            service_url: "http://20.193.142.1:8080".into(),
            timeout_secs: 300,
        }
    }
}

// ── Git ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitConfig {
    /// Repository the git endpoints operate on. Defaults to the working dir.
    pub repo_root: Option<String>,
}

impl GitConfig {
    pub fn repo_root(&self) -> PathBuf {
        self.repo_root
            .as_deref()
            .map(super::expand_path)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
