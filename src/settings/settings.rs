use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub api: Api,
    #[serde(default)]
    pub session: Session,
    pub store: Store,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Api {
    pub base_url: String,
    #[serde(default = "default_transport")]
    pub transport: String, // "http" or "fake"
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Api {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct Session {
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            refresh_path: default_refresh_path(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
        }
    }
}

impl Session {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory", "file" or "redis"
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default)]
    pub redis_url: String,
    #[serde(default = "default_store_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn default_transport() -> String {
    "http".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_refresh_path() -> String {
    "/token/refresh/".to_string()
}

fn default_refresh_timeout_secs() -> u64 {
    15
}

fn default_store_path() -> String {
    ".pandit-session/credentials.json".to_string()
}

fn default_store_prefix() -> String {
    "pandit-session".to_string()
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Loads the TOML settings file, then lets `PANDIT__SECTION__KEY` variables
/// override single values (e.g. `PANDIT__API__BASE_URL`).
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix("PANDIT").separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
