use chrono::Duration;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Ceiling on every configured lifetime, so derived timestamps stay in range.
const MAX_TTL_DAYS: i64 = 3650;

fn max_ttl() -> Duration {
    Duration::days(MAX_TTL_DAYS)
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared HMAC key; `None` or empty is a fatal start-up error.
    pub signing_key: Option<Secret<String>>,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Login and logout never answer faster than this. 0 disables padding.
    pub min_response_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub interval_seconds: u64,
    pub retention_days: i64,
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SessionConfig {
            common: core_config::Config {
                log_level: get_env("LOG_LEVEL", Some(common_config.log_level.as_str()), is_prod)?,
                otlp_endpoint: env::var("OTLP_ENDPOINT")
                    .ok()
                    .or(common_config.otlp_endpoint),
            },
            environment,
            service_name: get_env("SERVICE_NAME", Some("session-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                signing_key: env::var("JWT_SIGNING_KEY").ok().map(Secret::new),
                issuer: get_env("JWT_ISSUER", Some("session-service"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "5",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
            },
            auth: AuthConfig {
                min_response_ms: parse_env("AUTH_MIN_RESPONSE_MS", "1000", is_prod)?,
            },
            maintenance: MaintenanceConfig {
                interval_seconds: parse_env("MAINTENANCE_INTERVAL_SECONDS", "3600", is_prod)?,
                retention_days: parse_env("MAINTENANCE_RETENTION_DAYS", "30", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        let access_ttl = Duration::try_minutes(self.jwt.access_token_expiry_minutes)
            .filter(|ttl| *ttl > Duration::zero() && *ttl <= max_ttl())
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive and at most {} days",
                    MAX_TTL_DAYS
                ))
            })?;

        let refresh_ttl = Duration::try_days(self.jwt.refresh_token_expiry_days)
            .filter(|ttl| *ttl > Duration::zero() && *ttl <= max_ttl())
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive and at most {}",
                    MAX_TTL_DAYS
                ))
            })?;

        if refresh_ttl <= access_ttl {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Refresh credentials must outlive access tokens"
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS exceeds DATABASE_MAX_CONNECTIONS"
            )));
        }

        let retention_in_range = Duration::try_days(self.maintenance.retention_days)
            .is_some_and(|retention| retention >= Duration::zero() && retention <= max_ttl());
        if self.maintenance.interval_seconds == 0 || !retention_in_range {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAINTENANCE_INTERVAL_SECONDS must be positive and MAINTENANCE_RETENTION_DAYS between 0 and {}",
                MAX_TTL_DAYS
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
