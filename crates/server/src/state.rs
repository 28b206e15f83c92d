//! Shared application state assembled once at startup.

use anyhow::Context;
use gatehouse_core::{
    auth::{HttpJwksFetcher, TokenVerifier},
    config::{AppConfig, AuthMode},
    idempotency::IdempotencyStore,
    limiter::{DistributedRateLimiter, RateDecision},
    metrics::MetricsCollector,
    store::SharedStore,
};
use std::sync::Arc;
use url::Url;

/// Handles to every pipeline service, cloned into each request path.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Parsed once so the CSRF check never re-parses per request.
    pub allowed_origin: Arc<Url>,
    pub limiter: Arc<DistributedRateLimiter>,
    pub idempotency: Arc<IdempotencyStore>,
    pub verifier: Arc<TokenVerifier>,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// Builds the pipeline services from validated configuration.
    ///
    /// A configured-but-unreachable shared store is logged and skipped:
    /// the limiter and idempotency store then run local-only, which is a
    /// degradation, never a startup failure.
    ///
    /// # Errors
    ///
    /// Returns an error for configuration the pipeline cannot run without:
    /// an unparseable allowed origin or incomplete auth settings.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let allowed_origin = Url::parse(&config.security.allowed_origin)
            .context("security.allowed_origin is not a valid URL")?;

        let shared = match &config.store.redis_url {
            Some(url) => match SharedStore::connect(url, config.store.io_timeout()).await {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "shared store unreachable at startup, running local-only"
                    );
                    None
                }
            },
            None => None,
        };

        let verifier = match config.auth.mode {
            AuthMode::Production => {
                let jwks_url = config
                    .auth
                    .jwks_url
                    .clone()
                    .context("auth.jwks_url is required in production mode")?;
                let fetcher = HttpJwksFetcher::new(config.request_timeout())
                    .map_err(|e| anyhow::anyhow!("JWKS fetcher init failed: {e}"))?;
                TokenVerifier::production(
                    jwks_url,
                    config.auth.audience.clone(),
                    config.auth.jwks_ttl(),
                    config.auth.clock_skew_seconds,
                    Arc::new(fetcher),
                )
            }
            AuthMode::Development => {
                let secret = config
                    .auth
                    .dev_secret
                    .clone()
                    .context("auth.dev_secret is required in development mode")?;
                TokenVerifier::development(
                    secret,
                    config.auth.audience.clone(),
                    config.auth.clock_skew_seconds,
                )
            }
        };

        let idempotency = match &shared {
            Some(store) => IdempotencyStore::with_shared(store.clone()),
            None => IdempotencyStore::new(),
        };

        Ok(Self {
            config: Arc::new(config),
            allowed_origin: Arc::new(allowed_origin),
            limiter: Arc::new(DistributedRateLimiter::new(shared)),
            idempotency: Arc::new(idempotency),
            verifier: Arc::new(verifier),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Consumes one token from a named feature's rate rule for `key`.
    ///
    /// Returns `None` when the feature has no rule or its rule is disabled,
    /// which callers treat as allowed.
    pub async fn check_feature_limit(&self, feature: &str, key: &str) -> Option<RateDecision> {
        let rule = self.config.security.features.get(feature)?;
        if !rule.enabled {
            return None;
        }

        Some(
            self.limiter
                .check(&format!("feature:{feature}:{key}"), rule.limit, rule.window())
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::config::RateRule;

    #[tokio::test]
    async fn test_builds_from_default_config() {
        let state = AppState::from_config(AppConfig::default()).await;
        assert!(state.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_missing_dev_secret() {
        let mut config = AppConfig::default();
        config.auth.dev_secret = None;

        assert!(AppState::from_config(config).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_production_without_jwks_url() {
        let mut config = AppConfig::default();
        config.auth.mode = AuthMode::Production;
        config.auth.dev_secret = None;
        config.auth.jwks_url = None;

        assert!(AppState::from_config(config).await.is_err());
    }

    #[tokio::test]
    async fn test_feature_limit_unknown_feature_is_allowed() {
        let state = AppState::from_config(AppConfig::default()).await.unwrap();
        assert!(state.check_feature_limit("unknown", "user-1").await.is_none());
    }

    #[tokio::test]
    async fn test_feature_limit_enforced_per_key() {
        let mut config = AppConfig::default();
        config.security.features.insert(
            "quiz_submission".to_string(),
            RateRule { enabled: true, limit: 1, window_ms: 60_000 },
        );
        let state = AppState::from_config(config).await.unwrap();

        let first = state.check_feature_limit("quiz_submission", "user-1").await.unwrap();
        assert!(first.allowed);

        let second = state.check_feature_limit("quiz_submission", "user-1").await.unwrap();
        assert!(!second.allowed);

        // A different key is unaffected.
        let other = state.check_feature_limit("quiz_submission", "user-2").await.unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn test_disabled_feature_rule_skips_check() {
        let mut config = AppConfig::default();
        config.security.features.insert(
            "bulk_export".to_string(),
            RateRule { enabled: false, limit: 1, window_ms: 60_000 },
        );
        let state = AppState::from_config(config).await.unwrap();

        assert!(state.check_feature_limit("bulk_export", "user-1").await.is_none());
    }
}
