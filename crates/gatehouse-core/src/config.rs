//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `GATEHOUSE_CONFIG` env var
//! 3. **Environment variables**: `GATEHOUSE__*` env vars override specific
//!    fields, with `__` as the nesting separator
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP server settings (bind address, body limit)
//! - [`SecurityConfig`]: CSRF origin, double-submit flag, rate limit rules
//! - [`AuthConfig`]: Verification mode, JWKS URL/TTL, clock-skew tolerance
//! - [`StoreConfig`]: Optional shared counter store (absence = local-only)
//! - [`MetricsConfig`]: Prometheus metrics endpoint
//! - [`LoggingConfig`]: Log level and format
//!
//! # Validation
//!
//! Configuration is validated once at startup. Contradictory auth settings
//! (production verification with a development shared secret configured)
//! are a fatal startup error, never a runtime fallback.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `8080`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Maximum accepted request body size in bytes. Defaults to 1 MiB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8080
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// A single rate limit rule: how many requests per fixed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRule {
    /// Whether this rule is enforced. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per window. Defaults to `30`.
    #[serde(default = "default_rate_limit")]
    pub limit: u32,

    /// Window length in milliseconds. Defaults to `60000` (one minute).
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> u32 {
    30
}

fn default_rate_window_ms() -> u64 {
    60_000
}

impl Default for RateRule {
    fn default() -> Self {
        Self { enabled: true, limit: default_rate_limit(), window_ms: default_rate_window_ms() }
    }
}

impl RateRule {
    /// Returns the window length as a [`Duration`].
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Cross-site request forgery and mutation throttling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// The service's own base origin. `origin`/`referer` headers on unsafe
    /// methods must match it. Defaults to `http://localhost:3000`.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,

    /// Whether the double-submit token check is enforced in addition to the
    /// origin check. Defaults to `false`.
    #[serde(default)]
    pub csrf_double_submit: bool,

    /// Name of the cookie carrying the anti-forgery token. Defaults to
    /// `csrf_token`. The header counterpart is always `x-csrf-token`.
    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie: String,

    /// Global rate limit applied to all unsafe methods, keyed by client IP.
    #[serde(default)]
    pub mutation_limit: RateRule,

    /// Per-feature rate limit rules, keyed by feature name.
    #[serde(default)]
    pub features: HashMap<String, RateRule>,
}

fn default_allowed_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_csrf_cookie() -> String {
    "csrf_token".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
            csrf_double_submit: false,
            csrf_cookie: default_csrf_cookie(),
            mutation_limit: RateRule::default(),
            features: HashMap::new(),
        }
    }
}

/// Token verification deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Symmetric (shared-secret) verification for local development and
    /// tests. No network fetch.
    Development,
    /// Asymmetric RS256 verification against the issuer's published JWKS.
    Production,
}

/// Bearer token verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Verification mode. Defaults to `development`.
    #[serde(default = "default_auth_mode")]
    pub mode: AuthMode,

    /// Shared secret for development-mode verification. Must be unset in
    /// production mode.
    #[serde(default)]
    pub dev_secret: Option<String>,

    /// JWKS document URL of the token issuer. Required in production mode.
    #[serde(default)]
    pub jwks_url: Option<String>,

    /// How long a fetched key set is reused before refetching, in seconds.
    /// Defaults to `300`.
    #[serde(default = "default_jwks_ttl_seconds")]
    pub jwks_ttl_seconds: u64,

    /// Allowed clock drift between issuer and verifier when checking
    /// `exp`/`iat`, in seconds. Defaults to `30`.
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,

    /// Expected `aud` claim value. Defaults to the allowed origin default.
    #[serde(default = "default_allowed_origin")]
    pub audience: String,
}

fn default_auth_mode() -> AuthMode {
    AuthMode::Development
}

fn default_jwks_ttl_seconds() -> u64 {
    300
}

fn default_clock_skew_seconds() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Development,
            dev_secret: Some("dev-only-shared-secret".to_string()),
            jwks_url: None,
            jwks_ttl_seconds: default_jwks_ttl_seconds(),
            clock_skew_seconds: default_clock_skew_seconds(),
            audience: default_allowed_origin(),
        }
    }
}

impl AuthConfig {
    /// Returns the JWKS cache TTL as a [`Duration`].
    #[must_use]
    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_seconds)
    }
}

/// Shared counter store configuration.
///
/// When `redis_url` is absent the pipeline runs in local-only mode; the
/// rate limiter and idempotency store never require the shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL. Absence means local-only operation.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Upper bound for a single shared-store round trip, in milliseconds.
    /// Defaults to `500`.
    #[serde(default = "default_store_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Interval for the optional background sweep of local rate/idempotency
    /// state, in seconds. Absence means sweeps are caller-invoked only.
    #[serde(default)]
    pub sweep_interval_seconds: Option<u64>,
}

fn default_store_timeout_ms() -> u64 {
    500
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { redis_url: None, io_timeout_ms: default_store_timeout_ms(), sweep_interval_seconds: None }
    }
}

impl StoreConfig {
    /// Returns the shared-store I/O timeout as a [`Duration`].
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g. "debug", "info", "warn"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root application configuration containing all subsystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment label (e.g. "development", "production").
    #[serde(default = "default_environment")]
    pub environment: String,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// CSRF and rate limiting configuration.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Bearer token verification configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Shared counter store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Prometheus metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment overrides.
    ///
    /// Environment variables with the `GATEHOUSE__` prefix can override any
    /// configuration value, using `__` as the nesting separator (e.g.
    /// `GATEHOUSE__SERVER__BIND_PORT=9090`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("server.bind_address", "127.0.0.1")?
            .set_default("server.bind_port", 8080)?
            .set_default("server.request_timeout_seconds", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("GATEHOUSE").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to
    /// defaults. The file path can be overridden via `GATEHOUSE_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("GATEHOUSE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// Checks include:
    /// - The allowed origin parses as an absolute http(s) URL
    /// - Every enabled rate rule has a non-zero limit and window
    /// - Production auth mode names a JWKS URL and carries no development
    ///   secret; development mode has a secret (fail-fast, never a runtime
    ///   fallback)
    /// - Logging format is either `"json"` or `"pretty"`
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        match url::Url::parse(&self.security.allowed_origin) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => {
                return Err(format!("Allowed origin must be http(s), got scheme: {}", parsed.scheme()));
            }
            Err(e) => return Err(format!("Invalid allowed origin: {e}")),
        }

        validate_rule("security.mutation_limit", &self.security.mutation_limit)?;
        for (name, rule) in &self.security.features {
            validate_rule(&format!("security.features.{name}"), rule)?;
        }

        match self.auth.mode {
            AuthMode::Production => {
                if self.auth.jwks_url.is_none() {
                    return Err("Production auth mode requires auth.jwks_url".to_string());
                }
                if self.auth.dev_secret.is_some() {
                    return Err(
                        "Production auth mode forbids auth.dev_secret; symmetric verification \
                         cannot be mixed into a production deployment"
                            .to_string(),
                    );
                }
            }
            AuthMode::Development => {
                if self.auth.dev_secret.is_none() {
                    return Err("Development auth mode requires auth.dev_secret".to_string());
                }
            }
        }

        if self.auth.jwks_ttl_seconds == 0 {
            return Err("JWKS cache TTL must be greater than 0".to_string());
        }

        if self.store.io_timeout_ms == 0 {
            return Err("Shared store timeout must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}

fn validate_rule(name: &str, rule: &RateRule) -> Result<(), String> {
    if rule.enabled && rule.limit == 0 {
        return Err(format!("{name}: limit must be greater than 0"));
    }
    if rule.enabled && rule.window_ms == 0 {
        return Err(format!("{name}: window must be greater than 0"));
    }
    Ok(())
}
