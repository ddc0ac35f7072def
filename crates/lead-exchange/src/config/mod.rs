use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

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
    pub marketplace: MarketplaceConfig,
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
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            Err(_) => LogFormat::Compact,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            marketplace: MarketplaceConfig::from_env()?,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Upper bound on claim slots per lead, for the configured default and per-lead requests.
pub(crate) const MAX_CLAIMS_CEILING: u32 = 50;

/// Economic and scheduling dials for the claim engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceConfig {
    pub default_max_claims: u32,
    pub paid_lot_validity_days: i64,
    pub low_credit_threshold: u64,
    pub expiry_warning_days: i64,
    pub sweep_interval: Duration,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            default_max_claims: 5,
            paid_lot_validity_days: 365,
            low_credit_threshold: 10,
            expiry_warning_days: 30,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl MarketplaceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_max_claims = read_var("MARKET_DEFAULT_MAX_CLAIMS", defaults.default_max_claims)?;
        if default_max_claims == 0 || default_max_claims > MAX_CLAIMS_CEILING {
            return Err(ConfigError::OutOfRange {
                variable: "MARKET_DEFAULT_MAX_CLAIMS",
            });
        }

        let paid_lot_validity_days = read_var(
            "MARKET_PAID_LOT_VALIDITY_DAYS",
            defaults.paid_lot_validity_days,
        )?;
        if paid_lot_validity_days <= 0 {
            return Err(ConfigError::OutOfRange {
                variable: "MARKET_PAID_LOT_VALIDITY_DAYS",
            });
        }

        let expiry_warning_days =
            read_var("MARKET_EXPIRY_WARNING_DAYS", defaults.expiry_warning_days)?;
        if expiry_warning_days < 0 {
            return Err(ConfigError::OutOfRange {
                variable: "MARKET_EXPIRY_WARNING_DAYS",
            });
        }

        let sweep_secs: u64 = read_var(
            "MARKET_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        )?;
        if sweep_secs == 0 {
            return Err(ConfigError::OutOfRange {
                variable: "MARKET_SWEEP_INTERVAL_SECS",
            });
        }

        Ok(Self {
            default_max_claims,
            paid_lot_validity_days,
            low_credit_threshold: read_var(
                "MARKET_LOW_CREDIT_THRESHOLD",
                defaults.low_credit_threshold,
            )?,
            expiry_warning_days,
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }

    pub fn paid_lot_validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.paid_lot_validity_days)
    }

    pub fn expiry_warning(&self) -> chrono::Duration {
        chrono::Duration::days(self.expiry_warning_days)
    }
}

fn read_var<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidNumber { variable: &'static str },
    OutOfRange { variable: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a whole number")
            }
            ConfigError::OutOfRange { variable } => write!(f, "{variable} is out of range"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for variable in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "MARKET_DEFAULT_MAX_CLAIMS",
            "MARKET_PAID_LOT_VALIDITY_DAYS",
            "MARKET_LOW_CREDIT_THRESHOLD",
            "MARKET_EXPIRY_WARNING_DAYS",
            "MARKET_SWEEP_INTERVAL_SECS",
        ] {
            env::remove_var(variable);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert_eq!(config.marketplace, MarketplaceConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn marketplace_overrides_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MARKET_DEFAULT_MAX_CLAIMS", "3");
        env::set_var("MARKET_SWEEP_INTERVAL_SECS", "60");
        env::set_var("APP_LOG_FORMAT", "json");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.marketplace.default_max_claims, 3);
        assert_eq!(config.marketplace.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        reset_env();
    }

    #[test]
    fn rejects_zero_max_claims() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MARKET_DEFAULT_MAX_CLAIMS", "0");
        match AppConfig::load() {
            Err(ConfigError::OutOfRange { variable }) => {
                assert_eq!(variable, "MARKET_DEFAULT_MAX_CLAIMS")
            }
            other => panic!("expected out of range error, got {other:?}"),
        }
        reset_env();
    }
}
