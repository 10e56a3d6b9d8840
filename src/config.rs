use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::connector::transport::Credentials;

pub const DEFAULT_SERVER: &str = "https://rally1.rallydev.com";
pub const DEFAULT_API_VERSION: &str = "v2.0";
pub const DEFAULT_PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub rally: RallyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RallyConfig {
    pub server: String,
    pub username: String,
    pub password: String,
    pub api_version: String,
    pub page_size: u32,
    /// Ask Rally to inline artifact fields instead of returning bare references.
    pub inline_fetch: bool,
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            username: String::new(),
            password: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            inline_fetch: true,
        }
    }
}

impl RallyConfig {
    /// Apply `RALLY_SERVER`, `RALLY_USERNAME` and `RALLY_PASSWORD` when set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(server) = var("RALLY_SERVER") {
            self.server = server;
        }
        if let Some(username) = var("RALLY_USERNAME") {
            self.username = username;
        }
        if let Some(password) = var("RALLY_PASSWORD") {
            self.password = password;
        }
        self
    }

    pub fn credentials(&self) -> Result<Credentials> {
        if self.username.is_empty() || self.password.is_empty() {
            bail!(
                "Rally credentials missing. Set username/password in {} or RALLY_USERNAME/RALLY_PASSWORD",
                config_path().display()
            );
        }
        Ok(Credentials::new(&self.username, &self.password))
    }
}

fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".standup")
        .join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    let mut config = load_config_from(&config_path())?;
    config.rally = config.rally.with_env_overrides();
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?;
    Ok(config)
}
