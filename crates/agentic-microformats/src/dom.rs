//! Tree capability contract consumed by the extraction engine.
//!
//! Any host that can answer attribute reads, parent/child navigation and text
//! content can be extracted from. Attribute queries and the nearest-ancestor
//! search are provided on top of those primitives, and hosts with a native
//! query engine may override them.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::selector::{AttrSelector, ElementView};

/// Host-assigned identity of a node.
///
/// Extracted values keep a `NodeKey` instead of the node itself, so a result
/// never holds a borrow on the tree it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(pub usize);

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An element in a host tree.
pub trait AgentNode: Clone {
    /// Stable identity of this node within its tree.
    fn key(&self) -> NodeKey;

    /// Tag name as reported by the host (HTML hosts report lowercase).
    fn tag_name(&self) -> String;

    fn attr(&self, name: &str) -> Option<String>;

    fn parent(&self) -> Option<Self>;

    /// Element children in document order.
    fn children(&self) -> Vec<Self>;

    /// Concatenated text of all descendant text nodes.
    fn text_content(&self) -> String;

    fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    fn matches(&self, selector: &AttrSelector) -> bool {
        selector.matches(&OwnedView(self))
    }

    /// All matching descendants in document order. Never includes `self`.
    fn query_selector_all(&self, selector: &AttrSelector) -> Vec<Self> {
        let mut found = Vec::new();
        let mut stack: Vec<Self> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.matches(selector) {
                found.push(node.clone());
            }
            stack.extend(node.children().into_iter().rev());
        }
        found
    }

    fn query_selector(&self, selector: &AttrSelector) -> Option<Self> {
        self.query_selector_all(selector).into_iter().next()
    }

    /// Nearest node matching `selector`, starting at `self` and walking up.
    ///
    /// This is the one upward search used for trust resolution and for
    /// resource/action/property ownership.
    fn closest(&self, selector: &AttrSelector) -> Option<Self> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.matches(selector) {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }

    /// Mutation-observation capability of the host, if it has one.
    fn mutation_source(&self) -> Option<Box<dyn MutationSource>> {
        None
    }
}

/// Adapts any [`AgentNode`] to the selector matcher.
struct OwnedView<'n, N>(&'n N);

impl<N: AgentNode> ElementView for OwnedView<'_, N> {
    fn tag(&self) -> Cow<'_, str> {
        Cow::Owned(self.0.tag_name())
    }

    fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        self.0.attr(name).map(Cow::Owned)
    }
}

/// What changed in one host mutation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeChange {
    Attribute { name: String },
    ChildList,
    CharacterData,
}

/// One change reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub target: NodeKey,
    pub change: TreeChange,
}

/// Handle for a host subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked once per host-delivered batch of records.
pub type MutationListener = Box<dyn FnMut(&[MutationRecord]) + Send>;

/// Host-side change notification. Batching is owned entirely by the host.
pub trait MutationSource: Send + Sync {
    fn subscribe(&self, listener: MutationListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}
