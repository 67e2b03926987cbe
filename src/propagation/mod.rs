//! Identity propagation — wire codec and request-scope context.

pub mod codec;
pub mod context;

pub use codec::{identity_from_headers, identity_to_headers, HeaderGetter};
pub use context::RequestContext;
