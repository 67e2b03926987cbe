//! Wire codec for propagated identity, claims, and call chain.

use std::collections::HashMap;

use base64::Engine;
use tracing::warn;

use crate::chain::CallChain;
use crate::claims::Claims;
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityType};

/// Header / RPC metadata key carrying the bearer credential.
pub const HEADER_AUTHORIZATION: &str = "authorization";
/// Header / RPC metadata key carrying the identity id.
pub const HEADER_IDENTITY_ID: &str = "x-identity-id";
/// Header / RPC metadata key carrying the identity type.
pub const HEADER_IDENTITY_TYPE: &str = "x-identity-type";
/// Header / RPC metadata key carrying base64url(JSON) claims.
pub const HEADER_IDENTITY_CLAIMS: &str = "x-identity-claims";
/// Header / RPC metadata key carrying the immediate caller's service name.
pub const HEADER_CALLER_SERVICE: &str = "x-caller-service";
/// Header / RPC metadata key carrying base64url(JSON) of the full call chain.
pub const HEADER_CALL_CHAIN: &str = "x-call-chain";

/// Maximum size, in bytes, of any single encoded header value.
pub const MAX_ENCODED_VALUE_BYTES: usize = 8192;

/// Read access to inbound headers or RPC metadata. Implementations that
/// see duplicate values for a key must return the first one (the
/// documented behavior for multi-valued metadata).
pub trait HeaderGetter {
    /// Look up a header/metadata value by key.
    fn get(&self, key: &str) -> Option<&str>;
}

impl HeaderGetter for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

fn encode_value(bytes: &[u8]) -> Result<String> {
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    if encoded.len() > MAX_ENCODED_VALUE_BYTES {
        return Err(Error::SerializationTooLarge(
            encoded.len(),
            MAX_ENCODED_VALUE_BYTES,
        ));
    }
    Ok(encoded)
}

fn decode_value<T: serde::de::DeserializeOwned>(encoded: &str) -> Result<T> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::CredentialInvalid(format!("malformed propagated value: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::CredentialInvalid(format!("malformed propagated JSON: {e}")))
}

/// Encode an identity, its immediate caller service, and the call chain
/// into outbound header/metadata pairs.
///
/// A `None` identity yields `None` (pass-through, no propagation
/// metadata emitted). Claims are omitted when empty; caller service is
/// omitted when empty; the chain is omitted when absent.
pub fn identity_to_headers(
    identity: Option<&Identity>,
    caller_service: Option<&str>,
    chain: Option<&CallChain>,
) -> Result<Option<HashMap<String, String>>> {
    let Some(identity) = identity else {
        return Ok(None);
    };

    let mut headers = HashMap::new();
    headers.insert(HEADER_IDENTITY_ID.to_string(), identity.id().to_string());
    headers.insert(
        HEADER_IDENTITY_TYPE.to_string(),
        identity.identity_type().as_str().to_string(),
    );

    let claims = identity.claims();
    if !claims.is_empty() {
        let json = serde_json::to_vec(&claims)
            .map_err(|e| Error::CredentialInvalid(format!("claims not serializable: {e}")))?;
        headers.insert(HEADER_IDENTITY_CLAIMS.to_string(), encode_value(&json)?);
    }

    if let Some(caller_service) = caller_service.filter(|s| !s.is_empty()) {
        headers.insert(HEADER_CALLER_SERVICE.to_string(), caller_service.to_string());
    }

    if let Some(chain) = chain {
        let json = serde_json::to_vec(chain)
            .map_err(|e| Error::CredentialInvalid(format!("chain not serializable: {e}")))?;
        headers.insert(HEADER_CALL_CHAIN.to_string(), encode_value(&json)?);
    }

    Ok(Some(headers))
}

/// Decode inbound propagation headers back into a transport-only
/// ([`Identity::Basic`]) identity, the immediate caller service, and the
/// call chain.
///
/// This identity carries no permissions: propagated identity is for audit
/// and routing only and must never be treated as an authorization
/// decision. Missing id yields `(None, None, None)` with no error.
/// Missing or invalid type defaults to `service` (logging a warning if a
/// non-empty but unrecognized value was present). Malformed encoded
/// claims or chain fail with a decoding error.
pub fn identity_from_headers(
    getter: &impl HeaderGetter,
) -> Result<(Option<Identity>, Option<String>, Option<CallChain>)> {
    let Some(id) = getter.get(HEADER_IDENTITY_ID).filter(|s| !s.is_empty()) else {
        return Ok((None, None, None));
    };

    let identity_type = match getter.get(HEADER_IDENTITY_TYPE) {
        Some(s) if s.is_empty() => IdentityType::Service,
        Some(s) => IdentityType::parse(s).unwrap_or_else(|| {
            warn!(value = s, "unrecognized identity type header, defaulting to service");
            IdentityType::Service
        }),
        None => IdentityType::Service,
    };

    let claims = match getter.get(HEADER_IDENTITY_CLAIMS).filter(|s| !s.is_empty()) {
        Some(encoded) => decode_value::<Claims>(encoded)?,
        None => Claims::new(),
    };

    let caller_service = getter
        .get(HEADER_CALLER_SERVICE)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let chain = match getter.get(HEADER_CALL_CHAIN).filter(|s| !s.is_empty()) {
        Some(encoded) => Some(decode_value::<CallChain>(encoded)?),
        None => None,
    };

    let identity = Identity::basic(id, identity_type, claims)
        .map_err(|e| Error::CredentialInvalid(e.to_string()))?;

    Ok((Some(identity), caller_service, chain))
}
