//! Trust-region resolution.
//!
//! Resolution always takes the nearest marker, so a `system` or `verified`
//! region nested in an `untrusted` one re-enables extraction for its subtree.

use crate::dom::AgentNode;
use crate::types::TrustLevel;
use crate::vocab;

/// Trust level of the nearest trust marker at or above `node`.
pub fn effective_trust_level<N: AgentNode>(node: &N) -> TrustLevel {
    match node.closest(vocab::trust_selector()) {
        Some(marker) => TrustLevel::resolve(marker.attr(vocab::TRUST).as_deref()),
        None => TrustLevel::System,
    }
}

pub fn is_untrusted<N: AgentNode>(node: &N) -> bool {
    effective_trust_level(node) == TrustLevel::Untrusted
}

/// True iff the nearest ignore marker at or above `node` is literally `"true"`.
pub fn is_ignored<N: AgentNode>(node: &N) -> bool {
    node.closest(vocab::ignore_selector())
        .and_then(|marker| marker.attr(vocab::IGNORE))
        .is_some_and(|v| v == "true")
}

/// Nodes for which this holds are left out of extraction with their subtree.
pub fn should_skip<N: AgentNode>(node: &N) -> bool {
    is_untrusted(node) || is_ignored(node)
}
