//! Configuration for visit-quota
//!
//! Values come from the built-in defaults, then an optional TOML file,
//! then `VISIT_QUOTA__<SECTION>__<KEY>` environment variables.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuotaError, Result};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "VISIT_QUOTA";

/// Main service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub site: SiteConfig,
    pub logging: LoggingConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8090")
    pub listen_addr: String,
    /// Bearer token the host platform must present. Open API when unset.
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
}

/// Site the quota is enforced for
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Site root URL, used for the `[site-url]` placeholder
    pub site_url: String,
    /// Offset of the site's local time from UTC, in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Member profile URL pattern. `[site-url]` and `{id}` are substituted.
    #[serde(default = "default_member_url_pattern")]
    pub member_url_pattern: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

fn default_member_url_pattern() -> String {
    "[site-url]members/{id}/".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuotaError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| QuotaError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Layer defaults, an optional file and environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(QuotaError::Config("server.listen_addr is empty".to_string()));
        }

        url::Url::parse(&self.site.site_url).map_err(|e| {
            QuotaError::Config(format!("Invalid site URL '{}': {}", self.site.site_url, e))
        })?;

        self.site.timezone()?;
        Ok(())
    }
}

impl SiteConfig {
    /// Fixed offset the day boundaries are computed in
    pub fn timezone(&self) -> Result<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                QuotaError::Config(format!(
                    "utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:8090".to_string(),
                api_token: None,
            },
            storage: StorageConfig {
                database_url: "sqlite://visit-quota.db?mode=rwc".to_string(),
            },
            site: SiteConfig {
                site_url: "http://localhost/".to_string(),
                utc_offset_minutes: 0,
                member_url_pattern: default_member_url_pattern(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
