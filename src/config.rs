use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub storage_dir: PathBuf,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
    pub public_base_url: Option<String>,
    pub shutdown_grace: Duration,

    // Retention
    pub sweep_enabled: bool,
    pub sweep_interval: Duration,

    // Outbound fetching
    pub accept_invalid_certs: bool,
    pub resolve_timeout: Duration,
    pub download_timeout: Option<Duration>,
    pub yt_dlp_path: String,
    pub tiktok_fallback_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let download_timeout_secs = parse_env_u64("DOWNLOAD_TIMEOUT_SECS", 0)?;

        Ok(Self {
            // Storage
            storage_dir: PathBuf::from(env_or_default("STORAGE_DIR", "./data/downloads")),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 5000)?,
            public_base_url: optional_env("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            shutdown_grace: Duration::from_secs(parse_env_u64("SHUTDOWN_GRACE_SECS", 10)?),

            // Retention
            sweep_enabled: parse_env_bool("SWEEP_ENABLED", true)?,
            sweep_interval: Duration::from_secs(parse_env_u64("SWEEP_INTERVAL_SECS", 12 * 3600)?),

            // Outbound fetching
            accept_invalid_certs: parse_env_bool("ACCEPT_INVALID_CERTS", false)?,
            resolve_timeout: Duration::from_secs(parse_env_u64("RESOLVE_TIMEOUT_SECS", 5)?),
            download_timeout: (download_timeout_secs > 0)
                .then(|| Duration::from_secs(download_timeout_secs)),
            yt_dlp_path: env_or_default("YT_DLP_PATH", "yt-dlp"),
            tiktok_fallback_enabled: parse_env_bool("TIKTOK_FALLBACK_ENABLED", true)?,
        })
    }

    /// Configuration with defaults and no environment access, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            storage_dir: PathBuf::from("./data/test-downloads"),
            web_host: "127.0.0.1".to_string(),
            web_port: 5000,
            public_base_url: None,
            shutdown_grace: Duration::from_secs(10),
            sweep_enabled: false,
            sweep_interval: Duration::from_secs(12 * 3600),
            accept_invalid_certs: false,
            resolve_timeout: Duration::from_secs(5),
            download_timeout: None,
            yt_dlp_path: "yt-dlp".to_string(),
            tiktok_fallback_enabled: false,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "SWEEP_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.resolve_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "RESOLVE_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "STORAGE_DIR".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if let Some(base) = &self.public_base_url {
            if url::Url::parse(base).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: "PUBLIC_BASE_URL".to_string(),
                    message: format!("not an absolute URL: '{base}'"),
                });
            }
        }
        Ok(())
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
