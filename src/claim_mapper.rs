//! Claims → permissions extraction.

use std::collections::HashMap;

use crate::claims::{ClaimValue, Claims};
use crate::permission::Permission;

/// Extract permissions from a claims map by inspecting, in order:
/// `permissions`, `roles` (resolved through `role_permissions`), and
/// `scope`. Results are unioned and deduplicated, preserving the order in
/// which each permission was first produced.
///
/// Never fails: claim absence, wrong dynamic type, or malformed entries
/// degrade to an empty contribution from that source.
#[must_use]
pub fn map_claims_to_permissions(
    claims: &Claims,
    role_permissions: &HashMap<String, Vec<Permission>>,
) -> Vec<Permission> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut push = |p: Permission| {
        let key = (p.resource.clone(), p.action.clone(), p.scope.clone());
        if seen.insert(key) {
            out.push(p);
        }
    };

    for p in from_permissions_claim(claims) {
        push(p);
    }
    for p in from_roles_claim(claims, role_permissions) {
        push(p);
    }
    for p in from_scope_claim(claims) {
        push(p);
    }

    out
}

fn from_permissions_claim(claims: &Claims) -> Vec<Permission> {
    let Some(ClaimValue::Array(items)) = claims.get("permissions") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(ClaimValue::as_str)
        .filter_map(|s| Permission::parse(s).ok())
        .collect()
}

fn from_roles_claim(
    claims: &Claims,
    role_permissions: &HashMap<String, Vec<Permission>>,
) -> Vec<Permission> {
    let Some(ClaimValue::Array(items)) = claims.get("roles") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(ClaimValue::as_str)
        .filter_map(|role| role_permissions.get(role))
        .flatten()
        .cloned()
        .collect()
}

fn from_scope_claim(claims: &Claims) -> Vec<Permission> {
    let Some(scope) = claims.get("scope").and_then(ClaimValue::as_str) else {
        return Vec::new();
    };
    scope
        .split_whitespace()
        .filter_map(|token| Permission::parse(token).ok())
        .collect()
}
