use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::NaiveDate;

use crate::workflows::renewal::DEFAULT_RENEWAL_WINDOW_DAYS;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub renewal: RenewalConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            renewal: RenewalConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Renewal engine knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalConfig {
    /// Days before the semester end during which a renewal may be filed.
    pub window_days: i64,
    /// Pins "today" for every date rule; used for demos and staging rehearsals.
    pub fixed_today: Option<NaiveDate>,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_RENEWAL_WINDOW_DAYS,
            fixed_today: None,
        }
    }
}

impl RenewalConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let window_days = match env::var("RENEWAL_WINDOW_DAYS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map(i64::from)
                .map_err(|_| ConfigError::InvalidRenewalWindow { value: raw })?,
            Err(_) => DEFAULT_RENEWAL_WINDOW_DAYS,
        };

        let fixed_today = match env::var("RENEWAL_TODAY") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .map_err(|source| ConfigError::InvalidToday { value: raw, source })?,
            ),
            _ => None,
        };

        Ok(Self {
            window_days,
            fixed_today,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidRenewalWindow { value: String },
    InvalidToday {
        value: String,
        source: chrono::ParseError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRenewalWindow { value } => write!(
                f,
                "RENEWAL_WINDOW_DAYS must be a non-negative day count, got '{value}'"
            ),
            ConfigError::InvalidToday { value, .. } => {
                write!(f, "RENEWAL_TODAY must be YYYY-MM-DD, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidRenewalWindow { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidToday { source, .. } => Some(source),
        }
    }
}
