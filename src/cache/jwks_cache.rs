//! JWKS cache — per-URL cache of a key-id → decoded public key mapping,
//! rotation-aware.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors surfaced while fetching or decoding a JWKS document.
#[derive(Debug, thiserror::Error)]
pub enum JwksCacheError {
    /// The HTTP fetch itself failed, or returned a non-200 status.
    #[error("failed to fetch JWKS from {url}: {source}")]
    Fetch {
        /// The JWKS URL that was requested.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The fetch returned a non-200 status.
    #[error("JWKS fetch from {url} returned status {status}")]
    Status {
        /// The JWKS URL that was requested.
        url: String,
        /// The HTTP status code returned.
        status: u16,
    },
    /// The response body exceeded the 1 MiB cap.
    #[error("JWKS response from {0} exceeded the size limit")]
    TooLarge(String),
    /// The response body was not a well-formed JWKS document.
    #[error("JWKS response from {0} could not be parsed")]
    Malformed(String),
    /// The requested `kid` was not present after a fresh fetch.
    #[error("key id {kid} not found in JWKS from {url}")]
    KeyNotFound {
        /// The JWKS URL that was requested.
        url: String,
        /// The key id that was not found.
        kid: String,
    },
    /// The caller's cancellation handle fired before the fetch completed.
    #[error("JWKS fetch from {0} was canceled")]
    Canceled(String),
}

const MAX_BODY_BYTES: usize = 1024 * 1024;

struct CachedEntry {
    keys: std::collections::HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// Per-URL JWKS cache, backed by an injected [`reqwest::Client`].
pub struct JwksCache {
    entries: DashMap<String, CachedEntry>,
    http: reqwest::Client,
    ttl: Duration,
}

impl JwksCache {
    /// Construct a cache using the given HTTP client and TTL.
    #[must_use]
    pub fn new(http: reqwest::Client, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            http,
            ttl,
        }
    }

    /// Resolve `kid` against the JWKS document at `url`, fetching or
    /// refreshing as needed. `ctx` is a cancellation handle honored across
    /// the underlying HTTP fetch; a cancellation aborts the in-flight
    /// request and surfaces as [`JwksCacheError::Canceled`].
    pub async fn get_key(
        &self,
        ctx: &CancellationToken,
        url: &str,
        kid: &str,
    ) -> Result<DecodingKey, JwksCacheError> {
        if let Some(entry) = self.entries.get(url) {
            if entry.fetched_at.elapsed() < self.ttl {
                if let Some(key) = entry.keys.get(kid) {
                    return Ok(clone_decoding_key(key));
                }
            }
        }

        debug!(url, kid, "refreshing JWKS cache entry");
        let keys = self.fetch(ctx, url).await?;
        let found = keys.get(kid).map(clone_decoding_key);

        self.entries.insert(
            url.to_string(),
            CachedEntry {
                keys,
                fetched_at: Instant::now(),
            },
        );

        found.ok_or_else(|| JwksCacheError::KeyNotFound {
            url: url.to_string(),
            kid: kid.to_string(),
        })
    }

    async fn fetch(
        &self,
        ctx: &CancellationToken,
        url: &str,
    ) -> Result<std::collections::HashMap<String, DecodingKey>, JwksCacheError> {
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(JwksCacheError::Canceled(url.to_string())),
            result = self.http.get(url).send() => result.map_err(|source| JwksCacheError::Fetch {
                url: url.to_string(),
                source,
            })?,
        };

        if !response.status().is_success() {
            return Err(JwksCacheError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = tokio::select! {
            () = ctx.cancelled() => return Err(JwksCacheError::Canceled(url.to_string())),
            result = response.bytes() => result.map_err(|source| JwksCacheError::Fetch {
                url: url.to_string(),
                source,
            })?,
        };
        if bytes.len() > MAX_BODY_BYTES {
            return Err(JwksCacheError::TooLarge(url.to_string()));
        }

        let jwks: JwkSet =
            serde_json::from_slice(&bytes).map_err(|_| JwksCacheError::Malformed(url.to_string()))?;

        Ok(decode_jwks(&jwks))
    }
}

/// Decode every well-formed, `kid`-bearing entry in a JWKS document. Skips
/// unknown `kty`, unsupported `crv`, malformed fields, or entries without
/// a `kid` rather than failing the whole document.
fn decode_jwks(jwks: &JwkSet) -> std::collections::HashMap<String, DecodingKey> {
    let mut out = std::collections::HashMap::new();
    for jwk in &jwks.keys {
        let Some(kid) = jwk.common.key_id.clone() else {
            continue;
        };
        let key = match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y).ok()
            }
            AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
        };
        if let Some(key) = key {
            out.insert(kid, key);
        }
    }
    out
}

/// Hand out an owned, independent key so cache hits don't hold the map's
/// lock across the caller's use of it. `DecodingKey` clones cheaply via
/// its internal `Arc`.
fn clone_decoding_key(key: &DecodingKey) -> DecodingKey {
    key.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_jwk_set(kid: &str) -> JwkSet {
        let json = serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": kid,
                "use": "sig",
                "alg": "RS256",
                "n": "sXchJfPr9P1kS",
                "e": "AQAB",
            }]
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn decode_jwks_skips_entries_without_kid() {
        let json = serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "n": "sXchJfPr9P1kS",
                "e": "AQAB",
            }]
        });
        let jwks: JwkSet = serde_json::from_value(json).unwrap();
        assert!(decode_jwks(&jwks).is_empty());
    }

    #[test]
    fn decode_jwks_skips_octet_keys() {
        let json = serde_json::json!({
            "keys": [{
                "kty": "oct",
                "kid": "hmac-key",
                "k": "c2VjcmV0",
            }]
        });
        let jwks: JwkSet = serde_json::from_value(json).unwrap();
        assert!(decode_jwks(&jwks).is_empty());
    }

    #[test]
    fn decode_jwks_decodes_valid_rsa_entry() {
        let jwks = rsa_jwk_set("key-1");
        let decoded = decode_jwks(&jwks);
        assert!(decoded.contains_key("key-1"));
    }

    const ALPHA_N: &str = "spI6pNCwI0OGgeYZ9tQLGjAjE6eMQ8yF1rpJJmtdwPNWRHljAl7GIitDwHpmIH-NabJyk5nnWPgPguVAXtDUBfgBzpR_gScS7wtX9GhSMBPA_90N82GTT4SI-vE79oVD5R6Rm2wMGxGJsjusZwtBUSWYNMUFxRQDr_zNs3UMM92JK32gRzDPDv2i9KD9RdMi0mCbpHt2YCXgMP08LjRNEjMCe4GGNcVGIg8eeEYka0QwVVV24Fwgvpqd4Nf20dOsCoZ6qzRuEwnLdvGn2nwihqEZr-SXOBc7wzM3Nun8-Yf21H1JCIt3O1-hq36Bh2XftgAjCQzE14WVqLr7vv7dTw";
    const BETA_N: &str = "uXlOC8O7D81iVoUjTr4wyRizkbGAoVFZ5fZxf3Z-Q4uNU8XJtMqM5AOWuM1npGXdv1NbPuYA2dZ2rNdwdjn3mqXDErRtXflWXdUR0yOYtRADWtkipzFBFJ2ttblYFgP7zGTVBPsvaVNzK_nLuBKmRLLPUeJtS7UYXvy2zb_hZYUdApBe5YwsEdYy15Wf0UejeP5d6tNgd0aoRkF8VjiAm1t5U_OGyEU8ed53SJ-BMxLbpwekF9msZhwbvYiRhBBf0BX7rJXont4Mmw25kYcysgdP97A1_pR2PX_nUJ8qIUSWcn2LJJiFX1FzcRL08RGz_Y4CkVxGkoYrLsllivh03Q";

    fn jwk_entry(kid: &str, n: &str) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": n,
            "e": "AQAB",
        })
    }

    /// Spawn a minimal loopback HTTP/1.1 responder serving a single JSON
    /// body at `path`, read fresh out of `body` on every request. Tests
    /// rotate the served JWKS by swapping `body`'s contents.
    async fn spawn_jwks_responder(
        path: &'static str,
        body: std::sync::Arc<std::sync::Mutex<String>>,
    ) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let Ok(n) = stream.read(&mut buf).await else {
                        return;
                    };
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let request_path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/");
                    let response = if request_path == path {
                        let current = body.lock().unwrap().clone();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            current.len(),
                            current
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn rotated_kid_validates_after_exactly_one_extra_fetch() {
        let initial = serde_json::json!({ "keys": [jwk_entry("key-1", ALPHA_N)] }).to_string();
        let body = std::sync::Arc::new(std::sync::Mutex::new(initial));
        let addr = spawn_jwks_responder("/jwks", body.clone()).await;
        let url = format!("http://{addr}/jwks");

        let cache = JwksCache::new(reqwest::Client::new(), Duration::from_secs(3600));
        let ctx = CancellationToken::new();

        // First resolution fetches and caches `key-1`.
        cache.get_key(&ctx, &url, "key-1").await.unwrap();

        // Rotate: the server now serves `key-2` instead. `key-1` is still
        // within TTL, so asking for it again must not trigger a refetch.
        *body.lock().unwrap() = serde_json::json!({ "keys": [jwk_entry("key-2", BETA_N)] }).to_string();

        // `key-2` is absent from the still-fresh cached entry, so this must
        // fall through to exactly one refetch and then resolve.
        let resolved = cache.get_key(&ctx, &url, "key-2").await;
        assert!(resolved.is_ok(), "expected key-2 to resolve after one refetch, got {resolved:?}");

        // A further rotation must again require exactly one more refetch:
        // `key-1` is no longer being served, so asking for it now fails.
        let err = cache.get_key(&ctx, &url, "key-1").await.unwrap_err();
        assert!(matches!(err, JwksCacheError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_fetch() {
        let initial = serde_json::json!({ "keys": [jwk_entry("key-1", ALPHA_N)] }).to_string();
        let body = std::sync::Arc::new(std::sync::Mutex::new(initial));
        let addr = spawn_jwks_responder("/jwks", body).await;
        let url = format!("http://{addr}/jwks");

        let cache = JwksCache::new(reqwest::Client::new(), Duration::from_secs(3600));
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = cache.get_key(&ctx, &url, "key-1").await.unwrap_err();
        assert!(matches!(err, JwksCacheError::Canceled(_)));
    }
}
