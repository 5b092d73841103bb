use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use http::HeaderName;
use ows_proxy::{GatewayConfig, DEFAULT_USER_HEADER};
use serde::Deserialize;
use tracing::warn;
use url::Url;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub projects: ProjectsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub public: PublicConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "default_renderer_url")]
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            url: default_renderer_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProjectsConfig {
    /// Where the gate reads project settings.
    #[serde(default = "default_projects_root")]
    pub root: PathBuf,
    /// Where the renderer finds the same projects.
    #[serde(default = "default_map_root")]
    pub map_root: String,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            root: default_projects_root(),
            map_root: default_map_root(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PublicConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_audit_path")]
    pub audit_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            audit_log_path: default_audit_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_listen() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_renderer_url() -> String {
    "http://127.0.0.1:8080/ows".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_projects_root() -> PathBuf {
    PathBuf::from("projects")
}

fn default_map_root() -> String {
    "/srv/projects".to_string()
}

fn default_user_header() -> String {
    DEFAULT_USER_HEADER.to_string()
}

fn default_max_body() -> usize {
    10 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

impl Config {
    /// Validate the proxy-facing settings and convert them into the
    /// gateway's own configuration.
    pub fn gateway_config(&self) -> anyhow::Result<GatewayConfig> {
        let renderer_url = Url::parse(&self.renderer.url)
            .with_context(|| format!("invalid renderer url '{}'", self.renderer.url))?;
        let identity_header = HeaderName::from_bytes(self.auth.user_header.trim().as_bytes())
            .with_context(|| format!("invalid user header '{}'", self.auth.user_header))?;
        let public_base_url = self
            .public
            .base_url
            .as_deref()
            .map(|raw| Url::parse(raw).with_context(|| format!("invalid public base url '{raw}'")))
            .transpose()?;
        if self.limits.max_body_bytes == 0 {
            anyhow::bail!("limits.max_body_bytes must be greater than zero");
        }

        Ok(GatewayConfig {
            renderer_url,
            map_root: self.projects.map_root.clone(),
            identity_header,
            public_base_url,
            max_body_bytes: self.limits.max_body_bytes,
            renderer_timeout: Duration::from_secs(self.renderer.timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    Ok(config)
}
