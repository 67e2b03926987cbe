//! Call chain — the ordered record of services a request has passed
//! through.

use serde::{Deserialize, Serialize};

use crate::identity::IdentityType;

/// The default maximum call chain depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// One hop in a call chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    /// The name of the service that made this hop.
    pub service_name: String,
    /// The identity id of the caller at this hop.
    pub identity_id: String,
    /// The identity type of the caller at this hop.
    pub identity_type: IdentityType,
}

impl CallerInfo {
    /// Construct a caller-info entry.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        identity_id: impl Into<String>,
        identity_type: IdentityType,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            identity_id: identity_id.into(),
            identity_type,
        }
    }
}

/// The ordered, depth-bounded chain of services a request has traversed.
///
/// Immutable after construction: [`CallChain::append`] returns a new
/// chain rather than mutating `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChain {
    /// The id of the identity that originated the request.
    pub original_id: String,
    /// The type of the identity that originated the request.
    pub original_type: IdentityType,
    /// Ordered hops, oldest first, most recent last.
    pub callers: Vec<CallerInfo>,
    /// Maximum depth this chain enforces on append. Not serialized —
    /// every chain in a given deployment uses the configured maximum.
    #[serde(skip, default = "default_max_depth")]
    max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl CallChain {
    /// A new chain with no callers yet, using the default maximum depth.
    #[must_use]
    pub fn new(original_id: impl Into<String>, original_type: IdentityType) -> Self {
        Self::with_max_depth(original_id, original_type, DEFAULT_MAX_DEPTH)
    }

    /// A new chain with no callers yet, using an explicit maximum depth.
    #[must_use]
    pub fn with_max_depth(
        original_id: impl Into<String>,
        original_type: IdentityType,
        max_depth: usize,
    ) -> Self {
        Self {
            original_id: original_id.into(),
            original_type,
            callers: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Append a caller, returning a new chain. If the result would exceed
    /// the configured maximum depth, the oldest intermediate callers are
    /// dropped first, preserving the original identity and the most
    /// recent callers.
    #[must_use]
    pub fn append(&self, caller: CallerInfo) -> Self {
        let mut callers = self.callers.clone();
        callers.push(caller);
        if callers.len() > self.max_depth {
            let excess = callers.len() - self.max_depth;
            callers.drain(0..excess);
        }
        Self {
            original_id: self.original_id.clone(),
            original_type: self.original_type,
            callers,
            max_depth: self.max_depth,
        }
    }

    /// Number of hops currently recorded.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.callers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── call chain depth truncation ───────────────────────────────────────

    #[test]
    fn appending_beyond_max_depth_drops_oldest_intermediate_callers() {
        // GIVEN: an empty chain with the default max depth (32)
        let mut chain = CallChain::new("user-1", IdentityType::User);

        // WHEN: 34 callers are appended
        for i in 0..34 {
            chain = chain.append(CallerInfo::new(
                format!("svc-{i}"),
                "user-1",
                IdentityType::User,
            ));
        }

        // THEN: depth caps at MaxDepth, oldest two (svc-0, svc-1) dropped
        assert_eq!(chain.depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(chain.callers[31].service_name, "svc-33");
        assert_eq!(chain.callers[0].service_name, "svc-2");
        // Original identity fields preserved throughout.
        assert_eq!(chain.original_id, "user-1");
        assert_eq!(chain.original_type, IdentityType::User);
    }

    #[test]
    fn append_does_not_mutate_receiver() {
        // GIVEN: a chain with one caller
        let chain = CallChain::new("svc-a", IdentityType::Service)
            .append(CallerInfo::new("hop-1", "svc-a", IdentityType::Service));
        let original_depth = chain.depth();

        // WHEN: appending again
        let extended = chain.append(CallerInfo::new("hop-2", "svc-a", IdentityType::Service));

        // THEN: the original chain is unchanged; the new chain grew by one
        assert_eq!(chain.depth(), original_depth);
        assert_eq!(extended.depth(), original_depth + 1);
    }

    #[test]
    fn depth_grows_by_one_until_the_cap() {
        let chain = CallChain::with_max_depth("o", IdentityType::Service, 3);
        let c1 = chain.append(CallerInfo::new("a", "o", IdentityType::Service));
        assert_eq!(c1.depth(), (chain.depth() + 1).min(3));
        let c2 = c1.append(CallerInfo::new("b", "o", IdentityType::Service));
        assert_eq!(c2.depth(), (c1.depth() + 1).min(3));
        let c3 = c2.append(CallerInfo::new("c", "o", IdentityType::Service));
        assert_eq!(c3.depth(), 3);
        let c4 = c3.append(CallerInfo::new("d", "o", IdentityType::Service));
        assert_eq!(c4.depth(), 3);
        assert_eq!(c4.callers[0].service_name, "b");
    }
}
