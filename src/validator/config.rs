//! Validator configuration surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::permission::Permission;
use crate::secret::SecretBytes;

const MIN_HMAC_KEY_LEN: usize = 32;

/// Default path to the local Kubernetes service-account token file.
pub const DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Recognized configuration for a [`super::TokenValidator`].
///
/// Embedding applications load this through whatever layered config
/// mechanism they already use (env, YAML, flags); the core only requires
/// the final, validated struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Enable the platform (HMAC) route.
    pub enable_platform: bool,
    /// Enable the OIDC route.
    pub enable_oidc: bool,
    /// Enable the Kubernetes service-account route.
    pub enable_kubernetes: bool,

    /// HMAC signing key for the platform route. Required (and must be at
    /// least 32 bytes) if `enable_platform` is set.
    pub platform_signing_key: Option<SecretBytes>,
    /// Expected `iss` for platform tokens.
    pub platform_issuer: String,
    /// If non-empty, the enforced `aud` for platform tokens.
    pub platform_audience: Option<String>,

    /// Base issuer URL for OIDC discovery.
    pub oidc_issuer_url: String,
    /// If non-empty, the enforced `aud` for OIDC tokens.
    pub oidc_audience: Option<String>,

    /// Expected `iss` for Kubernetes service-account tokens.
    pub kubernetes_issuer: String,
    /// If non-empty, the enforced `aud` for Kubernetes tokens.
    pub kubernetes_audience: Option<String>,

    /// Token identity cache TTL, in seconds. Must be non-negative.
    pub token_cache_ttl_secs: i64,
    /// Token identity cache capacity. Must be positive.
    pub token_cache_max_size: usize,
    /// JWKS cache TTL, in seconds. Must be non-negative.
    pub jwks_cache_ttl_secs: i64,
    /// Clock skew leeway applied to `exp`/`nbf`/`iat`, in seconds. Must be
    /// non-negative.
    pub clock_skew_secs: i64,

    /// Role name → granted permissions, consulted by the default claims
    /// mapper's `roles` source. Empty when the caller has no roles
    /// configured.
    pub role_permissions: HashMap<String, Vec<Permission>>,

    /// Filesystem path to the local service-account token.
    pub service_account_token_path: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enable_platform: false,
            enable_oidc: false,
            enable_kubernetes: false,
            platform_signing_key: None,
            platform_issuer: String::new(),
            platform_audience: None,
            oidc_issuer_url: String::new(),
            oidc_audience: None,
            kubernetes_issuer: String::new(),
            kubernetes_audience: None,
            token_cache_ttl_secs: 300,
            token_cache_max_size: 10_000,
            jwks_cache_ttl_secs: 3600,
            clock_skew_secs: 60,
            role_permissions: HashMap::new(),
            service_account_token_path: DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH.to_string(),
        }
    }
}

impl ValidatorConfig {
    /// Validate the configuration, returning the first offending field
    /// wrapped in [`Error::ConfigInvalid`].
    pub fn validate(&self) -> Result<()> {
        if !self.enable_platform && !self.enable_oidc && !self.enable_kubernetes {
            return Err(Error::ConfigInvalid(
                "at least one of enable_platform, enable_oidc, enable_kubernetes must be true"
                    .to_string(),
            ));
        }
        if self.enable_platform {
            let key_len = self
                .platform_signing_key
                .as_ref()
                .map(SecretBytes::len)
                .unwrap_or(0);
            if key_len < MIN_HMAC_KEY_LEN {
                return Err(Error::ConfigInvalid(format!(
                    "platform_signing_key must be at least {MIN_HMAC_KEY_LEN} bytes"
                )));
            }
        }
        if self.enable_oidc && self.oidc_issuer_url.is_empty() {
            return Err(Error::ConfigInvalid(
                "oidc_issuer_url must not be empty when enable_oidc is set".to_string(),
            ));
        }
        if self.token_cache_ttl_secs < 0 {
            return Err(Error::ConfigInvalid(
                "token_cache_ttl_secs must not be negative".to_string(),
            ));
        }
        if self.jwks_cache_ttl_secs < 0 {
            return Err(Error::ConfigInvalid(
                "jwks_cache_ttl_secs must not be negative".to_string(),
            ));
        }
        if self.clock_skew_secs < 0 {
            return Err(Error::ConfigInvalid(
                "clock_skew_secs must not be negative".to_string(),
            ));
        }
        if self.token_cache_max_size == 0 {
            return Err(Error::ConfigInvalid(
                "token_cache_max_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
