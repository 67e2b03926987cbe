//! Permissions and the indexed permission set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A `*` wildcard, matching any resource/action, or (in scope position)
/// any scope.
pub const WILDCARD: &str = "*";

/// A (resource, action, scope) permission triple.
///
/// `resource` and `action` are never empty. `scope` is either empty
/// (global), `"*"` (also global), or a non-empty opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// The resource this permission applies to, or `*` for any resource.
    pub resource: String,
    /// The action this permission grants, or `*` for any action.
    pub action: String,
    /// The scope this permission is restricted to; empty or `*` means
    /// global.
    pub scope: String,
}

/// Error returned when parsing a `resource:action[:scope]` string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionParseError {
    /// Fewer than two non-empty `:`-separated parts were present.
    #[error("expected \"resource:action\" or \"resource:action:scope\", got {0:?}")]
    TooFewParts(String),
    /// A three-part form had an empty trailing scope (`"docs:read:"`).
    #[error("empty scope in three-part permission {0:?}")]
    EmptyScope(String),
}

impl Permission {
    /// Construct a permission, treating an empty or `*` scope as global.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            scope: scope.into(),
        }
    }

    /// Parse a `resource:action` or `resource:action:scope` string.
    pub fn parse(s: &str) -> Result<Self, PermissionParseError> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        match parts.as_slice() {
            [r, a] if !r.is_empty() && !a.is_empty() => {
                Ok(Self::new(*r, *a, ""))
            }
            [r, a, sc] if !r.is_empty() && !a.is_empty() => {
                if sc.is_empty() {
                    Err(PermissionParseError::EmptyScope(s.to_string()))
                } else {
                    Ok(Self::new(*r, *a, *sc))
                }
            }
            _ => Err(PermissionParseError::TooFewParts(s.to_string())),
        }
    }

    /// Format back to `resource:action` (empty or `*` scope) or
    /// `resource:action:scope`.
    #[must_use]
    pub fn to_string_form(&self) -> String {
        if self.scope.is_empty() || self.scope == WILDCARD {
            format!("{}:{}", self.resource, self.action)
        } else {
            format!("{}:{}:{}", self.resource, self.action, self.scope)
        }
    }

    /// `true` if this permission has a wildcard in any field.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.resource == WILDCARD || self.action == WILDCARD || self.scope == WILDCARD
    }

    /// Evaluate this permission's matching rule against a requested
    /// (resource, action, scope).
    #[must_use]
    pub fn matches(&self, resource: &str, action: &str, scope: &str) -> bool {
        let resource_ok = self.resource == WILDCARD || self.resource == resource;
        let action_ok = self.action == WILDCARD || self.action == action;
        let scope_ok = scope.is_empty()
            || scope == WILDCARD
            || self.scope.is_empty()
            || self.scope == WILDCARD
            || self.scope == scope;
        resource_ok && action_ok && scope_ok
    }
}

/// An indexed, immutable set of permissions supporting O(1) exact lookups
/// and a correct (if linear) wildcard fallback.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    /// Fully-specified (no wildcard) triples.
    exact: HashSet<(String, String, String)>,
    /// Scope-agnostic projection of `exact`, for the common
    /// scope-unaware-check path.
    any_scope: HashSet<(String, String)>,
    /// Permissions with at least one wildcard field, in insertion order.
    wildcards: Vec<Permission>,
    /// The deduplicated, insertion-order-preserved original list.
    all: Vec<Permission>,
}

impl PermissionSet {
    /// Build an indexed set from a sequence of permissions, deduplicating
    /// while preserving first-seen order.
    #[must_use]
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
        let mut exact = HashSet::new();
        let mut any_scope = HashSet::new();
        let mut wildcards = Vec::new();
        let mut all = Vec::new();
        let mut seen = HashSet::new();

        for p in permissions {
            let key = (p.resource.clone(), p.action.clone(), p.scope.clone());
            if !seen.insert(key.clone()) {
                continue;
            }
            if p.has_wildcard() {
                wildcards.push(p.clone());
            } else {
                any_scope.insert((p.resource.clone(), p.action.clone()));
                exact.insert(key);
            }
            all.push(p);
        }

        Self {
            exact,
            any_scope,
            wildcards,
            all,
        }
    }

    /// Empty permission set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// O(1) exact lookup; never consults wildcards.
    #[must_use]
    pub fn has(&self, resource: &str, action: &str, scope: &str) -> bool {
        self.exact.contains(&(resource.to_string(), action.to_string(), scope.to_string()))
    }

    /// Full match evaluation: exact triple, then scope-agnostic, then
    /// global grant, then wildcard fallback.
    #[must_use]
    pub fn matches(&self, resource: &str, action: &str, scope: &str) -> bool {
        let key = (resource.to_string(), action.to_string(), scope.to_string());
        if self.exact.contains(&key) {
            return true;
        }
        if scope.is_empty() || scope == WILDCARD {
            if self.any_scope.contains(&(resource.to_string(), action.to_string())) {
                return true;
            }
        } else if self.exact.contains(&(resource.to_string(), action.to_string(), String::new())) {
            return true;
        }
        self.wildcards.iter().any(|p| p.matches(resource, action, scope))
    }

    /// Scope-unaware check: `matches(resource, action, "")`.
    #[must_use]
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.matches(resource, action, "")
    }

    /// Defensive copy of the deduplicated, insertion-ordered permission
    /// list.
    #[must_use]
    pub fn permissions(&self) -> Vec<Permission> {
        self.all.clone()
    }

    /// Number of unique permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// `true` if the set has no permissions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_set() -> PermissionSet {
        PermissionSet::new([
            Permission::new("docs", "read", ""),
            Permission::new("*", "read", ""),
            Permission::new("agents", "*", "staging"),
        ])
    }

    // ── permission match matrix ───────────────────────────────────────────

    #[test]
    fn exact_resource_match() {
        assert!(matrix_set().matches("docs", "read", ""));
    }

    #[test]
    fn wildcard_resource_match() {
        assert!(matrix_set().matches("users", "read", ""));
    }

    #[test]
    fn wildcard_action_with_matching_scope() {
        assert!(matrix_set().matches("agents", "execute", "staging"));
    }

    #[test]
    fn wildcard_action_with_mismatched_scope() {
        assert!(!matrix_set().matches("agents", "execute", "production"));
    }

    #[test]
    fn empty_check_scope_matches_any_stored_scope() {
        assert!(matrix_set().matches("agents", "execute", ""));
    }

    #[test]
    fn no_matching_entry() {
        assert!(!matrix_set().matches("secrets", "delete", "prod"));
    }

    // ── has() never consults wildcards ────────────────────────────────────

    #[test]
    fn has_is_exact_only() {
        let set = matrix_set();
        assert!(set.has("docs", "read", ""));
        assert!(!set.has("users", "read", "")); // would match via wildcard, but has() ignores it
        assert!(!set.has("agents", "execute", "staging"));
    }

    // ── global-grant fallback path ─────────────────────────────────────────

    #[test]
    fn specific_scope_check_falls_back_to_global_exact_grant() {
        let set = PermissionSet::new([Permission::new("docs", "read", "")]);
        assert!(set.matches("docs", "read", "prod"));
    }

    // ── defensive copy + dedup + ordering ─────────────────────────────────

    #[test]
    fn permissions_defensive_copy_preserves_order_and_dedups() {
        let set = PermissionSet::new([
            Permission::new("docs", "read", ""),
            Permission::new("docs", "write", ""),
            Permission::new("docs", "read", ""), // duplicate
        ]);
        let mut perms = set.permissions();
        assert_eq!(perms.len(), 2);
        perms.push(Permission::new("extra", "extra", ""));
        // Mutating the returned Vec must not affect the set.
        assert_eq!(set.len(), 2);
        assert_eq!(set.permissions()[0].action, "read");
        assert_eq!(set.permissions()[1].action, "write");
    }

    // ── parse / format round-trip ─────────────────────────────────────────

    #[test]
    fn two_part_string_round_trips() {
        let s = "docs:read";
        let p = Permission::parse(s).unwrap();
        assert_eq!(p.to_string_form(), s);
    }

    #[test]
    fn three_part_string_round_trips() {
        let s = "agents:execute:staging";
        let p = Permission::parse(s).unwrap();
        assert_eq!(p.to_string_form(), s);
    }

    #[test]
    fn wildcard_scope_formats_as_two_parts() {
        let p = Permission::new("docs", "read", "*");
        assert_eq!(p.to_string_form(), "docs:read");
    }

    #[test]
    fn trailing_empty_scope_is_a_parse_error() {
        assert!(matches!(
            Permission::parse("docs:read:"),
            Err(PermissionParseError::EmptyScope(_))
        ));
    }

    #[test]
    fn single_part_is_a_parse_error() {
        assert!(matches!(
            Permission::parse("docs"),
            Err(PermissionParseError::TooFewParts(_))
        ));
    }

    #[test]
    fn empty_string_is_a_parse_error() {
        assert!(Permission::parse("").is_err());
    }
}
