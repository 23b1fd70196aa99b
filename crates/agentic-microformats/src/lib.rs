//! AgenticMicroformats — extraction engine for agent-readable page semantics.
//!
//! Pages annotated with the `data-agent-*` vocabulary describe resources,
//! their properties and the actions an agent may take. This crate rebuilds
//! that model from any tree implementing [`AgentNode`], filters untrusted
//! regions, prepares requests for actions and reports live changes as typed
//! events.

pub mod agent_dom;
pub mod coerce;
pub mod dom;
pub mod extract;
pub mod hints;
pub mod html;
pub mod observe;
pub mod params;
pub mod selector;
pub mod trust;
pub mod types;
pub mod vocab;

pub use agent_dom::{prepare_action, AgentDom};
pub use coerce::{coerce_value, is_coercion_failure};
pub use dom::{AgentNode, MutationRecord, MutationSource, NodeKey, SubscriptionId, TreeChange};
pub use extract::{extract_actions, extract_all, extract_meta, extract_resources, parse_meta};
pub use hints::{extract_hints, requires_confirmation};
pub use html::{HtmlDocument, HtmlNode};
pub use observe::{compare, observe, AgentMutation, MutationKind, Observer, Snapshot, SnapshotDiffer};
pub use params::{build_nested_params, extract_parameters};
pub use selector::AttrSelector;
pub use trust::{effective_trust_level, is_ignored, is_untrusted, should_skip};
pub use types::*;
