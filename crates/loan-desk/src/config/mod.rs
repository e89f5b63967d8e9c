use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::lending::{LendingPolicy, SchedulePeriod, SchedulerConfig};

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
    pub lending: LendingPolicy,
    pub scheduler: SchedulerConfig,
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
        let request_timeout =
            Duration::from_millis(parse_var("APP_REQUEST_TIMEOUT_MS", 5_000u64)?);

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = LendingPolicy::default();
        let installment_period = match env::var("LENDING_INSTALLMENT_PERIOD_SECS") {
            Ok(raw) => {
                let period = raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .and_then(chrono::TimeDelta::try_seconds)
                    .ok_or(ConfigError::InvalidValue {
                        key: "LENDING_INSTALLMENT_PERIOD_SECS",
                    })?;
                SchedulePeriod::Fixed(period)
            }
            Err(_) => SchedulePeriod::CalendarMonth,
        };
        let lending = LendingPolicy {
            max_open_applications: parse_positive(
                "LENDING_MAX_OPEN_APPLICATIONS",
                defaults.max_open_applications,
            )?,
            collateral_deadline: parse_days(
                "LENDING_COLLATERAL_DEADLINE_DAYS",
                defaults.collateral_deadline,
            )?,
            installment_period,
        };

        let scheduler_defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            enabled: parse_bool("SCHEDULER_ENABLED", scheduler_defaults.enabled)?,
            npa_interval: parse_secs(
                "SCHEDULER_NPA_INTERVAL_SECS",
                scheduler_defaults.npa_interval,
            )?,
            reminder_interval: parse_secs(
                "SCHEDULER_REMINDER_INTERVAL_SECS",
                scheduler_defaults.reminder_interval,
            )?,
            collateral_interval: parse_secs(
                "SCHEDULER_COLLATERAL_INTERVAL_SECS",
                scheduler_defaults.collateral_interval,
            )?,
        };

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                request_timeout,
            },
            telemetry: TelemetryConfig { log_level },
            lending,
            scheduler,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key }),
        Err(_) => Ok(default),
    }
}

fn parse_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = parse_var(key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue { key });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_positive(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match parse_var(key, default)? {
        0 => Err(ConfigError::InvalidValue { key }),
        value => Ok(value),
    }
}

/// Whole days, at least one and small enough for `TimeDelta`.
fn parse_days(
    key: &'static str,
    default: chrono::TimeDelta,
) -> Result<chrono::TimeDelta, ConfigError> {
    let days = parse_var(key, default.num_days())?;
    Some(days)
        .filter(|days| *days > 0)
        .and_then(chrono::TimeDelta::try_days)
        .ok_or(ConfigError::InvalidValue { key })
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { key }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for a single request's store work.
    pub request_timeout: Duration,
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

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key } => write!(f, "{key} has an invalid value"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
