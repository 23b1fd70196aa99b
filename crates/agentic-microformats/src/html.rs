//! HTML host tree backed by `scraper`.
//!
//! The parsed [`scraper::Html`] is kept as the live tree and edited in place
//! through its `ego_tree` nodes. Edits are recorded as mutation records and
//! delivered to subscribers in one batch per [`HtmlDocument::flush`], which
//! gives the differ the same round structure a browser mutation observer has.
//!
//! Traversal goes through `ego_tree` iterators, so document depth never turns
//! into call-stack depth.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ego_tree::iter::Edge;
use ego_tree::NodeId;
use scraper::node::{Attributes, Element, Text};
use scraper::{ElementRef, Html, Node, Selector, StrTendril};

use crate::dom::{
    AgentNode, MutationListener, MutationRecord, MutationSource, NodeKey, SubscriptionId,
    TreeChange,
};
use crate::selector::{AttrSelector, ElementView};
use crate::types::{AgentError, AgentResult};

struct DocState {
    html: Html,
    /// Element ids in registration order. A `NodeKey` indexes this list.
    ids: Vec<NodeId>,
    keys: HashMap<NodeId, NodeKey>,
    pending: Vec<MutationRecord>,
}

impl DocState {
    fn new(html: Html) -> Self {
        let elements: Vec<NodeId> = html
            .tree
            .nodes()
            .filter(|node| node.value().is_element())
            .map(|node| node.id())
            .collect();
        let mut state = Self {
            html,
            ids: Vec::with_capacity(elements.len()),
            keys: HashMap::with_capacity(elements.len()),
            pending: Vec::new(),
        };
        for id in elements {
            state.register(id);
        }
        state
    }

    fn register(&mut self, id: NodeId) -> NodeKey {
        let key = NodeKey(self.ids.len());
        self.ids.push(id);
        self.keys.insert(id, key);
        key
    }

    fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    /// Run `edit` on the element data of `id`, if it is an element.
    fn edit_element<R>(&mut self, id: NodeId, edit: impl FnOnce(&mut Element) -> R) -> Option<R> {
        let mut node = self.html.tree.get_mut(id)?;
        match node.value() {
            Node::Element(element) => Some(edit(element)),
            _ => None,
        }
    }
}

type SharedListener = Arc<Mutex<MutationListener>>;

struct Shared {
    state: Mutex<DocState>,
    root: (NodeId, NodeKey),
    listeners: Mutex<Vec<(SubscriptionId, SharedListener)>>,
    next_subscription: AtomicU64,
    observable: bool,
}

/// A parsed, editable HTML document. Cloning shares the same tree.
#[derive(Clone)]
pub struct HtmlDocument {
    shared: Arc<Shared>,
}

/// An element of an [`HtmlDocument`].
#[derive(Clone)]
pub struct HtmlNode {
    doc: HtmlDocument,
    id: NodeId,
    key: NodeKey,
}

impl std::fmt::Debug for HtmlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("HtmlDocument")
            .field("nodes", &state.html.tree.nodes().count())
            .field("pending", &state.pending.len())
            .field("observable", &self.shared.observable)
            .finish()
    }
}

impl std::fmt::Debug for HtmlNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}> {}", self.tag_name(), self.key)
    }
}

impl PartialEq for HtmlNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc.shared, &other.doc.shared) && self.id == other.id
    }
}

impl Eq for HtmlNode {}

impl HtmlDocument {
    /// Parse a full document. The root is the `<html>` element.
    pub fn parse(markup: &str) -> Self {
        Self::build(Html::parse_document(markup), true)
    }

    /// Parse a body fragment. The root is scraper's synthetic `<html>` wrapper.
    pub fn parse_fragment(markup: &str) -> Self {
        Self::build(Html::parse_fragment(markup), true)
    }

    /// Parse a document whose nodes report no mutation-observation capability.
    pub fn frozen(markup: &str) -> Self {
        Self::build(Html::parse_document(markup), false)
    }

    pub fn open(path: impl AsRef<Path>) -> AgentResult<Self> {
        let markup = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Parsed HTML document: {}", path.as_ref().display());
        Ok(Self::parse(&markup))
    }

    fn build(html: Html, observable: bool) -> Self {
        let root_id = html.root_element().id();
        let state = DocState::new(html);
        let root_key = state.keys.get(&root_id).copied().unwrap_or(NodeKey(0));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                root: (root_id, root_key),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                observable,
            }),
        }
    }

    pub fn root(&self) -> HtmlNode {
        let (id, key) = self.shared.root;
        self.node(id, key)
    }

    /// Look up an element by key, whether attached or not.
    pub fn get(&self, key: NodeKey) -> Option<HtmlNode> {
        let id = self.lock().ids.get(key.0).copied()?;
        Some(self.node(id, key))
    }

    /// First element under the root matching a CSS selector.
    pub fn select_first(&self, selector: &str) -> AgentResult<Option<HtmlNode>> {
        let parsed = Selector::parse(selector).map_err(|e| AgentError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        let state = self.lock();
        let found = state
            .element(self.shared.root.0)
            .and_then(|root| root.select(&parsed).next())
            .map(|el| el.id());
        Ok(found.and_then(|id| self.wrap(&state, id)))
    }

    pub fn set_attribute(&self, node: &HtmlNode, name: &str, value: &str) -> AgentResult<()> {
        let mut state = self.lock();
        state
            .edit_element(node.id, |element| {
                let mut attrs = element.attrs.clone();
                match attrs.iter_mut().find(|(k, _)| &*k.local == name) {
                    Some((_, v)) => *v = StrTendril::from(value),
                    None => {
                        // Same shape the parser gives plain HTML attributes: no prefix, no namespace.
                        let mut qual = element.name.clone();
                        qual.prefix = None;
                        qual.ns = Default::default();
                        qual.local = name.into();
                        attrs.insert(qual, StrTendril::from(value));
                    }
                }
                *element = with_attrs(element, attrs);
            })
            .ok_or(AgentError::UnknownNode(node.key))?;
        state.pending.push(MutationRecord {
            target: node.key,
            change: TreeChange::Attribute {
                name: name.to_string(),
            },
        });
        Ok(())
    }

    pub fn remove_attribute(&self, node: &HtmlNode, name: &str) -> AgentResult<()> {
        let mut state = self.lock();
        let removed = state
            .edit_element(node.id, |element| {
                let mut attrs = element.attrs.clone();
                let before = attrs.len();
                attrs.retain(|k, _| &*k.local != name);
                let removed = attrs.len() != before;
                if removed {
                    *element = with_attrs(element, attrs);
                }
                removed
            })
            .ok_or(AgentError::UnknownNode(node.key))?;
        if !removed {
            return Ok(());
        }
        state.pending.push(MutationRecord {
            target: node.key,
            change: TreeChange::Attribute {
                name: name.to_string(),
            },
        });
        Ok(())
    }

    /// Replace all children of `node` with a single text node.
    ///
    /// An element whose only child is already a text node has that node
    /// rewritten in place.
    pub fn set_text(&self, node: &HtmlNode, text: &str) -> AgentResult<()> {
        let mut state = self.lock();
        let children: Vec<NodeId> = match state.element(node.id) {
            Some(el) => el.children().map(|c| c.id()).collect(),
            None => return Err(AgentError::UnknownNode(node.key)),
        };

        let tree = &mut state.html.tree;
        let reused = match children.as_slice() {
            [only] => tree.get_mut(*only).is_some_and(|mut child| match child.value() {
                Node::Text(existing) => {
                    existing.text = StrTendril::from(text);
                    true
                }
                _ => false,
            }),
            _ => false,
        };
        if !reused {
            for child in children {
                if let Some(mut child) = tree.get_mut(child) {
                    child.detach();
                }
            }
            if let Some(mut target) = tree.get_mut(node.id) {
                target.append(Node::Text(Text {
                    text: StrTendril::from(text),
                }));
            }
        }

        state.pending.push(MutationRecord {
            target: node.key,
            change: TreeChange::CharacterData,
        });
        Ok(())
    }

    /// Parse `markup` as a fragment and append its nodes to `parent`.
    pub fn append_html(&self, parent: &HtmlNode, markup: &str) -> AgentResult<()> {
        let fragment = Html::parse_fragment(markup);
        let mut state = self.lock();
        if state.element(parent.id).is_none() {
            return Err(AgentError::UnknownNode(parent.key));
        }
        graft(&mut state, &fragment, parent.id);
        state.pending.push(MutationRecord {
            target: parent.key,
            change: TreeChange::ChildList,
        });
        Ok(())
    }

    /// Detach `node` (and its subtree) from its parent element.
    pub fn remove(&self, node: &HtmlNode) -> AgentResult<()> {
        let mut state = self.lock();
        let parent_key = state
            .html
            .tree
            .get(node.id)
            .and_then(|n| n.parent())
            .filter(|p| p.value().is_element())
            .and_then(|p| state.keys.get(&p.id()).copied())
            .ok_or(AgentError::UnknownNode(node.key))?;
        if let Some(mut target) = state.html.tree.get_mut(node.id) {
            target.detach();
        }
        state.pending.push(MutationRecord {
            target: parent_key,
            change: TreeChange::ChildList,
        });
        Ok(())
    }

    /// Number of records waiting for the next [`flush`](Self::flush).
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Deliver all pending records to every subscriber as one batch.
    ///
    /// Returns the number of records delivered. A subscriber that is still
    /// running (a flush from inside its own callback) is skipped.
    pub fn flush(&self) -> usize {
        let batch = std::mem::take(&mut self.lock().pending);
        if batch.is_empty() {
            return 0;
        }

        let listeners: Vec<SharedListener> = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            match listener.try_lock() {
                Ok(mut callback) => (&mut **callback)(batch.as_slice()),
                Err(_) => tracing::warn!("Skipping re-entrant mutation listener"),
            }
        }
        batch.len()
    }

    fn node(&self, id: NodeId, key: NodeKey) -> HtmlNode {
        HtmlNode {
            doc: self.clone(),
            id,
            key,
        }
    }

    fn wrap(&self, state: &DocState, id: NodeId) -> Option<HtmlNode> {
        state.keys.get(&id).map(|key| self.node(id, *key))
    }

    fn lock(&self) -> MutexGuard<'_, DocState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl MutationSource for HtmlDocument {
    fn subscribe(&self, listener: MutationListener) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(Mutex::new(listener))));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}

impl HtmlNode {
    pub fn document(&self) -> &HtmlDocument {
        &self.doc
    }
}

impl AgentNode for HtmlNode {
    fn key(&self) -> NodeKey {
        self.key
    }

    fn tag_name(&self) -> String {
        let state = self.doc.lock();
        state
            .element(self.id)
            .map(|el| el.value().name().to_string())
            .unwrap_or_default()
    }

    fn attr(&self, name: &str) -> Option<String> {
        let state = self.doc.lock();
        let value = state.element(self.id)?.value().attr(name)?;
        Some(value.to_string())
    }

    fn parent(&self) -> Option<Self> {
        let state = self.doc.lock();
        let parent = state.html.tree.get(self.id)?.parent()?;
        if !parent.value().is_element() {
            return None;
        }
        self.doc.wrap(&state, parent.id())
    }

    fn children(&self) -> Vec<Self> {
        let state = self.doc.lock();
        let Some(el) = state.element(self.id) else {
            return Vec::new();
        };
        el.child_elements()
            .filter_map(|child| self.doc.wrap(&state, child.id()))
            .collect()
    }

    fn text_content(&self) -> String {
        let state = self.doc.lock();
        state
            .element(self.id)
            .map(|el| el.text().collect())
            .unwrap_or_default()
    }

    fn matches(&self, selector: &AttrSelector) -> bool {
        let state = self.doc.lock();
        state
            .element(self.id)
            .is_some_and(|el| selector.matches(&ElementData(el.value())))
    }

    /// Single traversal under one lock.
    fn query_selector_all(&self, selector: &AttrSelector) -> Vec<Self> {
        let state = self.doc.lock();
        let Some(el) = state.element(self.id) else {
            return Vec::new();
        };
        el.descendent_elements()
            .skip(1)
            .filter(|d| selector.matches(&ElementData(d.value())))
            .filter_map(|d| self.doc.wrap(&state, d.id()))
            .collect()
    }

    fn closest(&self, selector: &AttrSelector) -> Option<Self> {
        let state = self.doc.lock();
        let start = state.html.tree.get(self.id)?;
        let found = std::iter::successors(Some(start), |n| n.parent())
            .filter_map(ElementRef::wrap)
            .find(|el| selector.matches(&ElementData(el.value())))?;
        self.doc.wrap(&state, found.id())
    }

    fn mutation_source(&self) -> Option<Box<dyn MutationSource>> {
        if self.doc.shared.observable {
            Some(Box::new(self.doc.clone()))
        } else {
            None
        }
    }
}

/// Element view over scraper's element data, used while the lock is held.
struct ElementData<'a>(&'a Element);

impl ElementView for ElementData<'_> {
    fn tag(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.0.name())
    }

    fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        self.0.attr(name).map(Cow::Borrowed)
    }
}

/// A fresh element carrying `attrs`, so scraper recomputes its cached id and classes.
fn with_attrs(element: &Element, attrs: Attributes) -> Element {
    let mut fresh = Element::new(element.name.clone(), Vec::new());
    fresh.attrs = attrs;
    fresh
}

/// Copy the children of the fragment's root under `parent`, in document order.
fn graft(state: &mut DocState, fragment: &Html, parent: NodeId) {
    let mut stack = vec![parent];
    let mut added = Vec::new();
    for edge in fragment.root_element().traverse().skip(1) {
        match edge {
            Edge::Open(source) => {
                let Some(top) = stack.last().copied() else {
                    break;
                };
                let Some(mut target) = state.html.tree.get_mut(top) else {
                    break;
                };
                let id = target.append(source.value().clone()).id();
                if source.value().is_element() {
                    added.push(id);
                }
                stack.push(id);
            }
            Edge::Close(_) => {
                stack.pop();
            }
        }
    }
    for id in added {
        state.register(id);
    }
}
