use serde::Deserialize;
use std::error::Error;
use std::fmt;

/// Application configuration, read from the environment (optionally seeded
/// from an env file).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Fallback tracing directive when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_build_number")]
    pub build_number: String,

    #[serde(default = "default_ctrl_login")]
    pub ctrl_auth_login: String,
    #[serde(default = "default_ctrl_passwd")]
    pub ctrl_auth_passwd: String,

    /// Comma-separated list of room names that may not be created.
    #[serde(default)]
    pub forbidden_room_names: Option<String>,
    /// Comma-separated list of allowed WebSocket origins. Empty allows all.
    #[serde(default)]
    pub allowed_origins: Option<String>,

    #[serde(default = "default_shutdown_wait_sec")]
    pub shutdown_wait_sec: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "roomhub=debug,tower_http=debug,axum::rejection=trace,info".to_string()
}

fn default_build_number() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_ctrl_login() -> String {
    "admin".to_string()
}

fn default_ctrl_passwd() -> String {
    "admin".to_string()
}

fn default_shutdown_wait_sec() -> u64 {
    10
}

impl Config {
    /// Load configuration. An `app.env` file takes precedence over `.env`;
    /// real environment variables win over both.
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::from_filename("app.env").is_err() {
            let _ = dotenvy::dotenv();
        }
        envy::from_env::<Config>().map_err(ConfigError::Env)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn forbidden_room_names(&self) -> Vec<String> {
        split_list(self.forbidden_room_names.as_deref())
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        split_list(self.allowed_origins.as_deref())
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    Env(envy::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Env(e) => write!(f, "failed to read configuration: {e}"),
        }
    }
}

impl Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            build_number: default_build_number(),
            ctrl_auth_login: default_ctrl_login(),
            ctrl_auth_passwd: default_ctrl_passwd(),
            forbidden_room_names: None,
            allowed_origins: None,
            shutdown_wait_sec: default_shutdown_wait_sec(),
        }
    }
}
