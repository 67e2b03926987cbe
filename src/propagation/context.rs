//! Request-scope propagation context.

use tracing::{debug, warn};

use crate::chain::{CallChain, CallerInfo};
use crate::error::{Error, Result};
use crate::identity::Identity;

use super::codec::{identity_from_headers, identity_to_headers, HeaderGetter, HEADER_AUTHORIZATION};

/// Per-request ambient state: the authenticated identity, the immediate
/// caller's service name, and the call chain. Modeled as three
/// independent typed slots rather than a single blob.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
    caller_service: Option<String>,
    chain: Option<CallChain>,
}

impl RequestContext {
    /// An empty context (no identity attached yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current identity, if attached.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The current identity, panicking if none is attached.
    ///
    /// Reserved for call sites downstream of authentication middleware,
    /// where an absent identity is a programming error, not a runtime
    /// condition to handle.
    #[must_use]
    pub fn require_identity(&self) -> &Identity {
        self.identity
            .as_ref()
            .expect("request-scope identity required but absent")
    }

    /// The immediate caller's service name, if attached.
    #[must_use]
    pub fn caller_service(&self) -> Option<&str> {
        self.caller_service.as_deref()
    }

    /// The call chain accumulated so far, if attached.
    #[must_use]
    pub fn chain(&self) -> Option<&CallChain> {
        self.chain.as_ref()
    }

    fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    fn set_caller_service(&mut self, service: String) {
        self.caller_service = Some(service);
    }

    fn set_chain(&mut self, chain: CallChain) {
        self.chain = Some(chain);
    }
}

/// Extract the bearer credential from the `authorization` header/metadata
/// value, stripping a case-insensitive `Bearer ` prefix.
fn extract_bearer<'a>(getter: &'a impl HeaderGetter) -> Result<&'a str> {
    let value = getter
        .get(HEADER_AUTHORIZATION)
        .ok_or_else(|| Error::Unauthenticated("missing authorization header".to_string()))?;

    let mut parts = value.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(Error::Unauthenticated(
            "authorization header is not a bearer credential".to_string(),
        ));
    }
    Ok(token)
}

/// Run the inbound request-scope pipeline:
/// extract the bearer credential, validate it, attach the resulting
/// identity, and opportunistically attach the caller service and chain
/// carried in propagation headers.
///
/// `validate` is an async callback so this function stays agnostic of the
/// concrete [`crate::validator::TokenValidator`] wiring.
pub async fn inbound<G, F, Fut>(getter: &G, validate: F) -> Result<RequestContext>
where
    G: HeaderGetter,
    F: FnOnce(&str) -> Fut,
    Fut: std::future::Future<Output = Result<Identity>>,
{
    let token = extract_bearer(getter)?;

    let identity = validate(token)
        .await
        .map_err(|_| Error::Unauthenticated("credential did not validate".to_string()))?;

    let mut context = RequestContext::new();
    context.set_identity(identity);

    if let Some(caller_service) = getter.get(super::codec::HEADER_CALLER_SERVICE).filter(|s| !s.is_empty()) {
        context.set_caller_service(caller_service.to_string());
    }

    match identity_from_headers(getter) {
        Ok((_, _, Some(chain))) => context.set_chain(chain),
        Ok((_, _, None)) => {}
        Err(e) => {
            debug!(error = %e, "ignoring undecodable inbound call chain header");
        }
    }

    Ok(context)
}

/// Run the outbound request-scope pipeline: extend the call chain
/// with `current_service` and encode identity + caller service + chain
/// into a fresh header/metadata map, merged on top of `existing`.
///
/// Never mutates `existing`; always returns a new map. If no identity is
/// attached, `existing` is returned unchanged. Encoding failures are
/// logged and the call proceeds without propagation metadata.
#[must_use]
pub fn outbound(
    context: &RequestContext,
    current_service: &str,
    existing: &std::collections::HashMap<String, String>,
) -> std::collections::HashMap<String, String> {
    let Some(identity) = context.identity() else {
        return existing.clone();
    };

    let chain = context
        .chain()
        .cloned()
        .unwrap_or_else(|| CallChain::new(identity.id(), identity.identity_type()))
        .append(CallerInfo::new(current_service, identity.id(), identity.identity_type()));

    let mut merged = existing.clone();
    match identity_to_headers(Some(identity), Some(current_service), Some(&chain)) {
        Ok(Some(new_headers)) => {
            for (key, value) in new_headers {
                merged.insert(key, value);
            }
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "failed to encode outbound propagation headers, proceeding without them");
        }
    }
    merged
}
