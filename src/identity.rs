//! Identity model — the verified principal attached to a request.

use serde::{Deserialize, Serialize};

use crate::claims::Claims;
use crate::permission::{Permission, PermissionSet};

/// The tag distinguishing what kind of principal an identity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    /// A human user.
    User,
    /// A service account.
    Service,
    /// An autonomous agent acting on behalf of a user or service.
    Agent,
    /// The mesh's own system identity.
    System,
}

impl IdentityType {
    /// Parse from the wire representation (`user` | `service` | `agent` |
    /// `system`), case-sensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "service" => Some(Self::Service),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Render to the wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Service => "service",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for IdentityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when constructing an identity with an invariant
/// violation (an empty id, service name, or email).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The id field was empty.
    #[error("identity id must not be empty")]
    EmptyId,
    /// The service name field was empty.
    #[error("service identity requires a non-empty service name")]
    EmptyServiceName,
    /// The email field was empty.
    #[error("user identity requires a non-empty email")]
    EmptyEmail,
}

/// A verified principal with id, type, claims, and a permission-check
/// capability.
///
/// `Basic` is the transport-only form: it always denies permission checks.
/// `Service` and `User` carry an indexed [`PermissionSet`].
#[derive(Debug, Clone)]
pub enum Identity {
    /// Transport form only — always denies permission checks.
    Basic {
        /// Non-empty identity id.
        id: String,
        /// Identity type tag.
        identity_type: IdentityType,
        /// Defensive-copy-on-access claims map.
        claims: Claims,
    },
    /// A service account identity.
    Service {
        /// Non-empty identity id.
        id: String,
        /// Identity type tag (normally [`IdentityType::Service`]).
        identity_type: IdentityType,
        /// Defensive-copy-on-access claims map.
        claims: Claims,
        /// Non-empty service name.
        service_name: String,
        /// Optional namespace.
        namespace: Option<String>,
        /// Indexed permission set.
        permissions: PermissionSet,
    },
    /// A human user identity.
    User {
        /// Non-empty identity id.
        id: String,
        /// Identity type tag (normally [`IdentityType::User`]).
        identity_type: IdentityType,
        /// Defensive-copy-on-access claims map.
        claims: Claims,
        /// Non-empty email address.
        email: String,
        /// Optional display name.
        display_name: Option<String>,
        /// Indexed permission set.
        permissions: PermissionSet,
    },
}

impl Identity {
    /// Construct a basic (transport-only) identity.
    pub fn basic(
        id: impl Into<String>,
        identity_type: IdentityType,
        claims: Claims,
    ) -> Result<Self, IdentityError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentityError::EmptyId);
        }
        Ok(Self::Basic {
            id,
            identity_type,
            claims,
        })
    }

    /// Construct a service identity.
    pub fn service(
        id: impl Into<String>,
        claims: Claims,
        service_name: impl Into<String>,
        namespace: Option<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<Self, IdentityError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentityError::EmptyId);
        }
        let service_name = service_name.into();
        if service_name.is_empty() {
            return Err(IdentityError::EmptyServiceName);
        }
        Ok(Self::Service {
            id,
            identity_type: IdentityType::Service,
            claims,
            service_name,
            namespace,
            permissions: PermissionSet::new(permissions),
        })
    }

    /// Construct a user identity.
    pub fn user(
        id: impl Into<String>,
        claims: Claims,
        email: impl Into<String>,
        display_name: Option<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<Self, IdentityError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentityError::EmptyId);
        }
        let email = email.into();
        if email.is_empty() {
            return Err(IdentityError::EmptyEmail);
        }
        Ok(Self::User {
            id,
            identity_type: IdentityType::User,
            claims,
            email,
            display_name,
            permissions: PermissionSet::new(permissions),
        })
    }

    /// The identity's id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Basic { id, .. } | Self::Service { id, .. } | Self::User { id, .. } => id,
        }
    }

    /// The identity's type tag.
    #[must_use]
    pub fn identity_type(&self) -> IdentityType {
        match self {
            Self::Basic { identity_type, .. }
            | Self::Service { identity_type, .. }
            | Self::User { identity_type, .. } => *identity_type,
        }
    }

    /// A defensive copy of the claims map. Mutating the returned map never
    /// affects this identity, and mutating the caller's original source
    /// map after construction never affects this identity either (that
    /// invariant is upheld by the constructors taking ownership).
    #[must_use]
    pub fn claims(&self) -> Claims {
        match self {
            Self::Basic { claims, .. } | Self::Service { claims, .. } | Self::User { claims, .. } => {
                claims.clone()
            }
        }
    }

    /// Scope-unaware permission check: `matches_permission(resource, action, "")`.
    ///
    /// `Basic` identities always return `false`, for any input including
    /// `("*", "*")`.
    #[must_use]
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.matches_permission(resource, action, "")
    }

    /// Full (resource, action, scope) permission check, evaluated through
    /// the identity's indexed [`PermissionSet`]. `Basic` identities always
    /// return `false`.
    #[must_use]
    pub fn matches_permission(&self, resource: &str, action: &str, scope: &str) -> bool {
        match self {
            Self::Basic { .. } => false,
            Self::Service { permissions, .. } | Self::User { permissions, .. } => {
                permissions.matches(resource, action, scope)
            }
        }
    }

    /// Defensive copy of the identity's permissions (empty for `Basic`).
    #[must_use]
    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Self::Basic { .. } => Vec::new(),
            Self::Service { permissions, .. } | Self::User { permissions, .. } => {
                permissions.permissions()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_with(key: &str, value: &str) -> Claims {
        let mut m = Claims::new();
        m.insert(key.to_string(), crate::claims::ClaimValue::String(value.to_string()));
        m
    }

    #[test]
    fn empty_id_is_rejected_for_every_variant() {
        assert_eq!(
            Identity::basic("", IdentityType::Service, Claims::new()).unwrap_err(),
            IdentityError::EmptyId
        );
        assert_eq!(
            Identity::service("", Claims::new(), "svc", None, []).unwrap_err(),
            IdentityError::EmptyId
        );
        assert_eq!(
            Identity::user("", Claims::new(), "a@b.com", None, []).unwrap_err(),
            IdentityError::EmptyId
        );
    }

    #[test]
    fn empty_service_name_is_rejected() {
        assert_eq!(
            Identity::service("id", Claims::new(), "", None, []).unwrap_err(),
            IdentityError::EmptyServiceName
        );
    }

    #[test]
    fn empty_email_is_rejected() {
        assert_eq!(
            Identity::user("id", Claims::new(), "", None, []).unwrap_err(),
            IdentityError::EmptyEmail
        );
    }

    // ── defensive copy invariant ────────────────────────────────────────────

    #[test]
    fn mutating_input_claims_after_construction_does_not_affect_identity() {
        // GIVEN: claims used to build an identity
        let mut input = claims_with("role", "admin");
        let identity = Identity::basic("id-1", IdentityType::User, input.clone()).unwrap();

        // WHEN: the caller's original map is mutated
        input.insert("role".to_string(), crate::claims::ClaimValue::String("root".to_string()));

        // THEN: the identity's claims are unaffected
        assert_eq!(
            identity.claims().get("role").and_then(crate::claims::ClaimValue::as_str),
            Some("admin")
        );
    }

    #[test]
    fn mutating_returned_claims_does_not_affect_subsequent_accessor_calls() {
        // GIVEN: an identity with claims
        let identity = Identity::basic("id-1", IdentityType::User, claims_with("role", "admin")).unwrap();

        // WHEN: the returned claims copy is mutated
        let mut copy = identity.claims();
        copy.insert("role".to_string(), crate::claims::ClaimValue::String("root".to_string()));

        // THEN: a fresh accessor call still sees the original value
        assert_eq!(
            identity.claims().get("role").and_then(crate::claims::ClaimValue::as_str),
            Some("admin")
        );
    }

    #[test]
    fn mutating_returned_permissions_does_not_affect_subsequent_accessor_calls() {
        let identity = Identity::service(
            "svc-1",
            Claims::new(),
            "gateway",
            None,
            [Permission::new("docs", "read", "")],
        )
        .unwrap();

        let mut perms = identity.permissions();
        perms.push(Permission::new("extra", "extra", ""));

        assert_eq!(identity.permissions().len(), 1);
    }

    // ── boundary: BasicIdentity always denies ─────────────────────────────

    #[test]
    fn basic_identity_always_denies_even_wildcard_check() {
        let identity = Identity::basic("id-1", IdentityType::Service, Claims::new()).unwrap();
        assert!(!identity.has_permission("*", "*"));
        assert!(!identity.matches_permission("*", "*", "*"));
    }

    #[test]
    fn service_identity_permission_check_delegates_to_permission_set() {
        let identity = Identity::service(
            "svc-1",
            Claims::new(),
            "gateway",
            Some("platform".to_string()),
            [Permission::new("docs", "read", "")],
        )
        .unwrap();
        assert!(identity.has_permission("docs", "read"));
        assert!(!identity.has_permission("docs", "write"));
    }
}
