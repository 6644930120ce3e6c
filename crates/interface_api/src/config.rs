//! API configuration
//!
//! Every field has a default; `API_*` environment variables override them
//! (`API_PORT=9000`, `API_SCHEDULER_ENABLED=false`, ...).

use serde::Deserialize;

use core_kernel::Timezone;

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// Log level or `EnvFilter` directive
    pub log_level: String,
    pub log_format: LogFormat,
    /// IANA name of the business timezone
    pub timezone: String,
    /// Runs the background billing jobs when true
    pub scheduler_enabled: bool,
    /// Cron expression (with seconds) for recurring invoice generation
    pub generate_cron: String,
    /// Cron expression (with seconds) for the overdue sweep
    pub overdue_cron: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/pg_billing".to_string(),
            db_max_connections: 10,
            db_min_connections: 2,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            timezone: "Asia/Kolkata".to_string(),
            scheduler_enabled: true,
            generate_cron: "0 5 0 * * *".to_string(),
            overdue_cron: "0 30 0 * * *".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port)?
            .set_default("jwt_secret", defaults.jwt_secret)?
            .set_default("jwt_expiration_secs", defaults.jwt_expiration_secs)?
            .set_default("database_url", defaults.database_url)?
            .set_default("db_max_connections", defaults.db_max_connections)?
            .set_default("db_min_connections", defaults.db_min_connections)?
            .set_default("log_level", defaults.log_level)?
            .set_default("log_format", "text")?
            .set_default("timezone", defaults.timezone)?
            .set_default("scheduler_enabled", defaults.scheduler_enabled)?
            .set_default("generate_cron", defaults.generate_cron)?
            .set_default("overdue_cron", defaults.overdue_cron)?
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses the configured business timezone
    pub fn business_timezone(&self) -> Result<Timezone, core_kernel::TemporalError> {
        self.timezone.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.business_timezone().unwrap().name(), "Asia/Kolkata");
        assert!(config.scheduler_enabled);
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let config = ApiConfig {
            timezone: "Mars/Olympus".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.business_timezone().is_err());
    }
}
