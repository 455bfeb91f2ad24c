use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "APP";
const DEFAULT_RUN_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_DATABASE_URL: &str = "sqlite://toko_pos.db?mode=rwc";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ISSUER: &str = "toko-pos-api";
/// One week, matching the session cookie lifetime
const DEFAULT_SESSION_SECS: usize = 7 * 24 * 60 * 60;
const DEFAULT_RETENTION_DAYS: i64 = 30;
const DEFAULT_SWEEP_INTERVAL_HOURS: u64 = 24;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const POOL_MAX: u32 = 16;
const POOL_MIN: u32 = 2;
const POOL_CONNECT_TIMEOUT_SECS: u64 = 30;
const POOL_IDLE_TIMEOUT_SECS: u64 = 600;
const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 8;
const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Secret shipped in `config/default.toml`; only acceptable while developing
pub const DEV_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_the_pos";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const PLACEHOLDER_SECRETS: [&str; 3] = ["changeme", "secret", "your-jwt-secret"];

/// Runtime settings for the POS server and the admin CLI.
///
/// Every field can be set from `config/*.toml` or an `APP__<FIELD>` variable.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// SQLite or PostgreSQL URL
    pub database_url: String,

    /// HMAC key for session tokens
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Session lifetime in seconds; also the cookie `Max-Age`
    #[serde(default = "default_session_secs")]
    pub jwt_expiration: usize,

    #[serde(default = "default_issuer")]
    pub auth_issuer: String,

    /// Force `Secure` on the session cookie outside production too
    #[serde(default)]
    pub cookie_secure: bool,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// `development`, `test`, `production`, ...
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Apply pending migrations when the server starts
    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated list of browser origins allowed to call the API
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Accept any origin when no list is configured
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// The till UI sends the session cookie cross-origin
    #[serde(default = "enabled")]
    pub cors_allow_credentials: bool,

    #[serde(default = "default_pool_max")]
    pub db_max_connections: u32,
    #[serde(default = "default_pool_min")]
    pub db_min_connections: u32,
    #[serde(default = "default_pool_connect_timeout")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_pool_idle_timeout")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_pool_acquire_timeout")]
    pub db_acquire_timeout_secs: u64,
    /// How long a SQLite writer waits for the write lock before giving up
    #[serde(default = "default_sqlite_busy_timeout")]
    pub db_busy_timeout_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Days a soft-deleted row is kept before the sweep removes it
    #[serde(default = "default_retention_days")]
    #[validate(range(min = 1))]
    pub soft_delete_retention_days: i64,

    /// Interval of the in-process retention sweep in hours, 0 disables it
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
}

impl AppConfig {
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Settings for tests and embedding; everything not passed takes its default
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: usize,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            auth_issuer: default_issuer(),
            cookie_secure: false,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: true,
            db_max_connections: POOL_MAX,
            db_min_connections: POOL_MIN,
            db_connect_timeout_secs: POOL_CONNECT_TIMEOUT_SECS,
            db_idle_timeout_secs: POOL_IDLE_TIMEOUT_SECS,
            db_acquire_timeout_secs: POOL_ACQUIRE_TIMEOUT_SECS,
            db_busy_timeout_ms: SQLITE_BUSY_TIMEOUT_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            soft_delete_retention_days: DEFAULT_RETENTION_DAYS,
            sweep_interval_hours: DEFAULT_SWEEP_INTERVAL_HOURS,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEFAULT_RUN_ENV)
    }

    /// Production always gets `Secure` cookies
    pub fn secure_cookies(&self) -> bool {
        self.cookie_secure || self.is_production()
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_deref()
            .is_some_and(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
    }

    /// Permissive CORS is allowed while developing or when explicitly opted in
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Rules that depend on the deployment environment rather than a single field
    fn check_deployment(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            errors.add(
                "cors_allowed_origins",
                rule_violation(
                    "cors_origins_required",
                    "Set APP__CORS_ALLOWED_ORIGINS to the till's origin, or APP__CORS_ALLOW_ANY_ORIGIN=true",
                ),
            );
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_JWT_SECRET {
            errors.add(
                "jwt_secret",
                rule_violation(
                    "jwt_secret_is_dev_default",
                    "The bundled development secret is only allowed in development; set APP__JWT_SECRET",
                ),
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn rule_violation(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_session_secs() -> usize {
    DEFAULT_SESSION_SECS
}
fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}
fn default_pool_max() -> u32 {
    POOL_MAX
}
fn default_pool_min() -> u32 {
    POOL_MIN
}
fn default_pool_connect_timeout() -> u64 {
    POOL_CONNECT_TIMEOUT_SECS
}
fn default_pool_idle_timeout() -> u64 {
    POOL_IDLE_TIMEOUT_SECS
}
fn default_pool_acquire_timeout() -> u64 {
    POOL_ACQUIRE_TIMEOUT_SECS
}
fn default_sqlite_busy_timeout() -> u64 {
    SQLITE_BUSY_TIMEOUT_MS
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}
fn default_sweep_interval_hours() -> u64 {
    DEFAULT_SWEEP_INTERVAL_HOURS
}
fn enabled() -> bool {
    true
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(rule_violation(
            "log_level",
            "Must be one of: trace, debug, info, warn, error",
        ))
    }
}

/// Rejects placeholders and low-entropy secrets
fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();
    let lowered = trimmed.to_ascii_lowercase();

    if PLACEHOLDER_SECRETS
        .iter()
        .any(|placeholder| lowered.contains(placeholder) && lowered.len() < 40)
    {
        return Err(rule_violation(
            "jwt_secret",
            "JWT secret looks like a placeholder; generate a random value",
        ));
    }

    let distinct: HashSet<char> = trimmed.chars().collect();
    if distinct.len() < 10 {
        return Err(rule_violation(
            "jwt_secret",
            "JWT secret needs at least 10 distinct characters",
        ));
    }

    Ok(())
}

/// Installs the global subscriber; `RUST_LOG` wins over `level` when set
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directive = env::var("RUST_LOG")
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| format!("toko_pos_api={level},tower_http=debug"));
    let subscriber = fmt().with_env_filter(EnvFilter::new(directive));

    // try_init: tests and the admin CLI may initialise more than once
    let _ = if json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

fn run_environment() -> String {
    env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_RUN_ENV.to_string())
}

/// Built-in defaults, then `config/default.toml`, then `config/{run_env}.toml`, then `APP__*`
fn layered_sources(run_env: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    Ok(builder)
}

/// Loads and validates settings for the current `RUN_ENV`
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = run_environment();
    info!(run_env = %run_env, "loading configuration");

    if !Path::new(CONFIG_DIR).is_dir() {
        warn!(dir = CONFIG_DIR, "config directory missing; using defaults and APP__* variables");
    }

    let merged = layered_sources(&run_env)?.build()?;
    if merged.get_string("jwt_secret").is_err() {
        error!("APP__JWT_SECRET is not set");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret must be configured (APP__JWT_SECRET)".into(),
        )));
    }

    let settings: AppConfig = merged.try_deserialize()?;
    settings
        .validate()
        .and_then(|()| settings.check_deployment())
        .map_err(|e| {
            error!(error = %e, "configuration rejected");
            AppConfigError::Validation(e)
        })?;

    info!(
        environment = %settings.environment,
        port = settings.port,
        "configuration loaded"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "a_reasonably_long_and_varied_secret_for_pos_tests_42".into(),
            3600,
            "127.0.0.1".into(),
            3000,
            "production".into(),
        )
    }

    #[test]
    fn production_needs_cors_origins() {
        let mut cfg = production();
        assert!(cfg.check_deployment().is_err());

        cfg.cors_allowed_origins = Some("https://kasir.majujaya.com".into());
        assert!(cfg.check_deployment().is_ok());
    }

    #[test]
    fn development_tolerates_permissive_cors_and_dev_secret() {
        let mut cfg = production();
        cfg.environment = "development".into();
        cfg.jwt_secret = DEV_JWT_SECRET.into();
        assert!(cfg.check_deployment().is_ok());
    }

    #[test]
    fn dev_secret_is_refused_in_production() {
        let mut cfg = production();
        cfg.cors_allow_any_origin = true;
        cfg.jwt_secret = DEV_JWT_SECRET.into();
        let errors = cfg.check_deployment().unwrap_err();
        assert!(errors.field_errors().contains_key("jwt_secret"));
    }

    #[test]
    fn production_forces_secure_cookie() {
        let mut cfg = production();
        assert!(cfg.secure_cookies());
        cfg.environment = "development".into();
        assert!(!cfg.secure_cookies());
    }

    #[test]
    fn weak_secrets_are_rejected() {
        assert!(validate_jwt_secret("changeme").is_err());
        assert!(validate_jwt_secret("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").is_err());
        assert!(validate_jwt_secret("a_reasonably_long_and_varied_secret_for_pos_tests_42").is_ok());
        assert!(validate_jwt_secret(DEV_JWT_SECRET).is_ok());
    }

    #[test]
    fn defaults_keep_thirty_day_retention() {
        let cfg = production();
        assert_eq!(cfg.soft_delete_retention_days, 30);
        assert_eq!(cfg.sweep_interval_hours, 24);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn log_level_must_be_known() {
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
