//! Token validator — the crate's central entry point.

pub mod config;

use std::collections::HashMap;

use base64::Engine;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use config::ValidatorConfig;

use crate::cache::{JwksCache, TokenCache};
use crate::claim_mapper::map_claims_to_permissions;
use crate::claims::{claims_from_json, Claims};
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityError, IdentityType};
use crate::permission::Permission;

const MAX_TOKEN_LEN: usize = 8192;
const MAX_DISCOVERY_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Platform,
    Oidc,
    Kubernetes,
}

/// Validates bearer credentials across the platform (HMAC), OIDC, and
/// Kubernetes service-account routes, caching resolved identities.
pub struct TokenValidator {
    config: ValidatorConfig,
    token_cache: TokenCache,
    jwks_cache: JwksCache,
    http: reqwest::Client,
    /// OIDC discovery results, cached for the process lifetime.
    discovery: DashMap<String, String>,
}

impl TokenValidator {
    /// Construct a validator from a validated configuration and an
    /// injected HTTP client (shared with, or independent from, the JWKS
    /// fetch client).
    pub fn new(config: ValidatorConfig, http: reqwest::Client) -> Result<Self> {
        config.validate()?;
        let jwks_cache = JwksCache::new(
            http.clone(),
            std::time::Duration::from_secs(config.jwks_cache_ttl_secs.max(0) as u64),
        );
        let token_cache = TokenCache::new(
            std::time::Duration::from_secs(config.token_cache_ttl_secs.max(0) as u64),
            config.token_cache_max_size,
        );
        Ok(Self {
            config,
            token_cache,
            jwks_cache,
            http,
            discovery: DashMap::new(),
        })
    }

    /// Validate a bearer token, returning the resolved identity. `ctx` is
    /// honored across any JWKS or discovery fetch this validation triggers;
    /// canceling it aborts the in-flight request and surfaces as
    /// [`Error::TransientFetch`].
    pub async fn validate(&self, ctx: &CancellationToken, token: &str) -> Result<Identity> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(Error::CredentialInvalid(
                "token length out of bounds".to_string(),
            ));
        }

        if let Some(identity) = self.token_cache.get(token) {
            return Ok(identity);
        }

        let header = decode_segment(token, 0)?;
        let unverified_claims = decode_segment(token, 1)?;
        let token_hash = TokenCache::hash_token(token);

        let alg = header
            .get("alg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if alg.eq_ignore_ascii_case("none") {
            warn!(token_hash = %token_hash, "rejected alg=none token");
            return Err(Error::CredentialInvalid(
                "alg=none is not a permitted signing algorithm".to_string(),
            ));
        }

        let iss = unverified_claims
            .get("iss")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let Some(route) = self.detect_route(iss, &alg) else {
            warn!(token_hash = %token_hash, iss, alg, "no enabled route matched");
            return Err(Error::Unauthenticated(
                "no enabled route matches this credential".to_string(),
            ));
        };
        debug!(token_hash = %token_hash, route = ?route, "routed token");

        let kid = header.get("kid").and_then(Value::as_str);

        let claims_json = match route {
            Route::Platform => self.verify_platform(token),
            Route::Oidc => self.verify_oidc(ctx, token, kid).await,
            Route::Kubernetes => self.verify_kubernetes(ctx, token, kid).await,
        }
        .inspect_err(|e| warn!(token_hash = %token_hash, route = ?route, error = %e, "credential rejected"))?;

        let claims = claims_from_json(claims_json.clone());
        let permissions = map_claims_to_permissions(&claims, &self.config.role_permissions);

        let identity = match route {
            Route::Platform => build_platform_identity(&claims_json, claims, permissions),
            Route::Oidc => build_oidc_identity(&claims_json, claims, permissions),
            Route::Kubernetes => build_kubernetes_identity(&claims_json, claims, permissions),
        }
        .map_err(|e| Error::CredentialInvalid(e.to_string()))?;

        if let Some(exp) = claims_json.get("exp").and_then(Value::as_u64) {
            self.token_cache.insert(token, identity.clone(), exp);
        }

        Ok(identity)
    }

    fn detect_route(&self, iss: &str, alg: &str) -> Option<Route> {
        if self.config.enable_platform && !self.config.platform_issuer.is_empty() && iss == self.config.platform_issuer {
            return Some(Route::Platform);
        }
        if self.config.enable_oidc && !self.config.oidc_issuer_url.is_empty() && iss == self.config.oidc_issuer_url {
            return Some(Route::Oidc);
        }
        if self.config.enable_kubernetes
            && !self.config.kubernetes_issuer.is_empty()
            && iss == self.config.kubernetes_issuer
        {
            return Some(Route::Kubernetes);
        }

        let upper = alg.to_ascii_uppercase();
        if upper.starts_with("HS") {
            if self.config.enable_platform {
                return Some(Route::Platform);
            }
        } else if upper.starts_with("RS") || upper.starts_with("ES") {
            if self.config.enable_oidc {
                return Some(Route::Oidc);
            }
            if self.config.enable_kubernetes {
                return Some(Route::Kubernetes);
            }
        }
        None
    }

    fn verify_platform(&self, token: &str) -> Result<Value> {
        let key = self
            .config
            .platform_signing_key
            .as_ref()
            .expect("validated non-empty at construction");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = self.config.clock_skew_secs.max(0) as u64;
        validation.set_issuer(&[self.config.platform_issuer.clone()]);
        match self.config.platform_audience.as_deref().filter(|a| !a.is_empty()) {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let decoding_key = DecodingKey::from_secret(key.expose());
        let data: TokenData<Value> = jsonwebtoken::decode(token, &decoding_key, &validation)
            .map_err(classify_jwt_error)?;
        Ok(data.claims)
    }

    async fn verify_oidc(&self, ctx: &CancellationToken, token: &str, kid: Option<&str>) -> Result<Value> {
        let kid = kid.ok_or_else(|| Error::CredentialInvalid("token header missing kid".to_string()))?;
        let jwks_uri = self.discover_jwks_uri(ctx, &self.config.oidc_issuer_url).await?;
        let key = self
            .jwks_cache
            .get_key(ctx, &jwks_uri, kid)
            .await
            .map_err(classify_jwks_error)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = vec![Algorithm::RS256, Algorithm::ES256];
        validation.leeway = self.config.clock_skew_secs.max(0) as u64;
        validation.set_issuer(&[self.config.oidc_issuer_url.clone()]);
        match self.config.oidc_audience.as_deref().filter(|a| !a.is_empty()) {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data: TokenData<Value> =
            jsonwebtoken::decode(token, &key, &validation).map_err(classify_jwt_error)?;
        Ok(data.claims)
    }

    async fn verify_kubernetes(&self, ctx: &CancellationToken, token: &str, kid: Option<&str>) -> Result<Value> {
        let kid = kid.ok_or_else(|| Error::CredentialInvalid("token header missing kid".to_string()))?;
        let jwks_url = format!(
            "{}/openid/v1/jwks",
            self.config.kubernetes_issuer.trim_end_matches('/')
        );
        let key = self
            .jwks_cache
            .get_key(ctx, &jwks_url, kid)
            .await
            .map_err(classify_jwks_error)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = vec![Algorithm::RS256, Algorithm::ES256];
        validation.leeway = self.config.clock_skew_secs.max(0) as u64;
        validation.set_issuer(&[self.config.kubernetes_issuer.clone()]);
        match self.config.kubernetes_audience.as_deref().filter(|a| !a.is_empty()) {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data: TokenData<Value> =
            jsonwebtoken::decode(token, &key, &validation).map_err(classify_jwt_error)?;
        Ok(data.claims)
    }

    async fn discover_jwks_uri(&self, ctx: &CancellationToken, issuer: &str) -> Result<String> {
        if let Some(cached) = self.discovery.get(issuer) {
            return Ok(cached.clone());
        }

        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(Error::TransientFetch(format!("discovery fetch from {url} was canceled"))),
            result = self.http.get(&url).send() => result.map_err(|e| Error::TransientFetch(e.to_string()))?,
        };
        if !response.status().is_success() {
            return Err(Error::TransientFetch(format!(
                "discovery endpoint {url} returned {}",
                response.status()
            )));
        }
        let bytes = tokio::select! {
            () = ctx.cancelled() => return Err(Error::TransientFetch(format!("discovery fetch from {url} was canceled"))),
            result = response.bytes() => result.map_err(|e| Error::TransientFetch(e.to_string()))?,
        };
        if bytes.len() > MAX_DISCOVERY_BODY_BYTES {
            return Err(Error::TransientFetch(format!(
                "discovery response from {url} exceeded the size limit"
            )));
        }
        let doc: Value = serde_json::from_slice(&bytes)
            .map_err(|_| Error::TransientFetch(format!("discovery response from {url} was not valid JSON")))?;
        let jwks_uri = doc
            .get("jwks_uri")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::TransientFetch(format!("discovery document at {url} is missing jwks_uri")))?
            .to_string();

        self.discovery.insert(issuer.to_string(), jwks_uri.clone());
        Ok(jwks_uri)
    }
}

fn decode_segment(token: &str, index: usize) -> Result<Value> {
    let parts: Vec<&str> = token.split('.').collect();
    let segment = parts
        .get(index)
        .ok_or_else(|| Error::CredentialInvalid("malformed token structure".to_string()))?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| Error::CredentialInvalid("malformed token encoding".to_string()))?;
    serde_json::from_slice(&bytes).map_err(|_| Error::CredentialInvalid("malformed token payload".to_string()))
}

fn classify_jwt_error(e: jsonwebtoken::errors::Error) -> Error {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => Error::CredentialExpired,
        _ => Error::CredentialInvalid(e.to_string()),
    }
}

fn classify_jwks_error(e: crate::cache::jwks_cache::JwksCacheError) -> Error {
    use crate::cache::jwks_cache::JwksCacheError;
    match e {
        JwksCacheError::KeyNotFound { .. } => Error::CredentialInvalid(e.to_string()),
        JwksCacheError::Fetch { .. }
        | JwksCacheError::Status { .. }
        | JwksCacheError::TooLarge(_)
        | JwksCacheError::Malformed(_)
        | JwksCacheError::Canceled(_) => Error::TransientFetch(e.to_string()),
    }
}

fn get_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn build_platform_identity(
    claims_json: &Value,
    claims: Claims,
    permissions: Vec<Permission>,
) -> std::result::Result<Identity, IdentityError> {
    let sub = get_str(claims_json, "sub").unwrap_or_default();
    if let Some(email) = get_str(claims_json, "email") {
        let name = get_str(claims_json, "name").map(str::to_string);
        Identity::user(sub, claims, email, name, permissions)
    } else if let Some(service_name) = get_str(claims_json, "service_name") {
        let namespace = get_str(claims_json, "namespace").map(str::to_string);
        Identity::service(sub, claims, service_name, namespace, permissions)
    } else {
        Identity::basic(sub, IdentityType::Service, claims)
    }
}

fn build_oidc_identity(
    claims_json: &Value,
    claims: Claims,
    permissions: Vec<Permission>,
) -> std::result::Result<Identity, IdentityError> {
    let sub = get_str(claims_json, "sub").unwrap_or_default();
    if let Some(email) = get_str(claims_json, "email") {
        let name = get_str(claims_json, "name").map(str::to_string);
        Identity::user(sub, claims, email, name, permissions)
    } else {
        Identity::basic(sub, IdentityType::User, claims)
    }
}

fn build_kubernetes_identity(
    claims_json: &Value,
    claims: Claims,
    permissions: Vec<Permission>,
) -> std::result::Result<Identity, IdentityError> {
    let sub = get_str(claims_json, "sub").unwrap_or_default();
    let (namespace, name) = nested_k8s_ns_name(claims_json)
        .or_else(|| flat_k8s_ns_name(claims_json))
        .or_else(|| sub_k8s_ns_name(sub))
        .filter(|(ns, n)| !ns.is_empty() && !n.is_empty())
        .ok_or(IdentityError::EmptyServiceName)?;

    let id = if sub.is_empty() {
        format!("system:serviceaccount:{namespace}:{name}")
    } else {
        sub.to_string()
    };

    Identity::service(id, claims, name, Some(namespace), permissions)
}

fn nested_k8s_ns_name(v: &Value) -> Option<(String, String)> {
    let k8s = v.get("kubernetes.io")?;
    let namespace = k8s.get("namespace")?.as_str()?.to_string();
    let name = k8s.get("serviceaccount")?.get("name")?.as_str()?.to_string();
    Some((namespace, name))
}

fn flat_k8s_ns_name(v: &Value) -> Option<(String, String)> {
    let namespace = v.get("kubernetes.io/serviceaccount/namespace")?.as_str()?.to_string();
    let name = v
        .get("kubernetes.io/serviceaccount/service-account.name")?
        .as_str()?
        .to_string();
    Some((namespace, name))
}

fn sub_k8s_ns_name(sub: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = sub.split(':').collect();
    if parts.len() == 4 && parts[0] == "system" && parts[1] == "serviceaccount" {
        Some((parts[2].to_string(), parts[3].to_string()))
    } else {
        None
    }
}
