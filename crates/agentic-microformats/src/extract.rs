//! Resource/action tree reconstruction.
//!
//! The host returns resource, action and property markers as flat lists. One
//! scan groups them by nearest enclosing resource (`closest`), which gives the
//! containment hierarchy without relying on document order; the tree is then
//! assembled top-down, dropping anything inside an untrusted or ignored region.

use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::coerce::coerce_value;
use crate::dom::{AgentNode, NodeKey};
use crate::hints::extract_hints;
use crate::params::extract_parameters;
use crate::trust;
use crate::types::{
    Action, AgentPolicies, AgentResult, ExtractionResult, HttpMethod, PageDefaults, PageInfo,
    PageMeta, Property, Provider, RateLimit, Resource, TypeHint,
};
use crate::vocab;

/// Parse the page metadata payload under `root`.
///
/// A missing or malformed payload gives an empty [`PageMeta`].
pub fn extract_meta<N: AgentNode>(root: &N) -> PageMeta {
    let Some(script) = root.query_selector(vocab::meta_selector()) else {
        return PageMeta::default();
    };
    match parse_meta(&script.text_content()) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::debug!("Ignoring malformed page metadata: {e}");
            PageMeta::default()
        }
    }
}

/// Top-level resources under `root`, each with its nested children.
pub fn extract_resources<N: AgentNode>(root: &N) -> Vec<Resource> {
    ResourceForest::scan(root).resources()
}

/// Actions under `root` that have no enclosing resource.
pub fn extract_actions<N: AgentNode>(root: &N) -> Vec<Action> {
    ResourceForest::scan(root).standalone_actions()
}

/// Run a full extraction pass.
pub fn extract_all<N: AgentNode>(root: &N) -> ExtractionResult {
    let (resources, actions) = extract_model(root);
    ExtractionResult {
        meta: extract_meta(root),
        resources,
        actions,
    }
}

/// Resources and standalone actions from a single scan.
pub(crate) fn extract_model<N: AgentNode>(root: &N) -> (Vec<Resource>, Vec<Action>) {
    let forest = ResourceForest::scan(root);
    let resources = forest.resources();
    let actions = forest.standalone_actions();
    tracing::debug!(
        "Extracted {} top-level resources and {} standalone actions",
        resources.len(),
        actions.len()
    );
    (resources, actions)
}

/// Marker nodes of one subtree, grouped by owning resource.
struct ResourceForest<N> {
    nodes: HashMap<NodeKey, N>,
    skipped: HashSet<NodeKey>,
    top_level: Vec<NodeKey>,
    children: HashMap<NodeKey, Vec<NodeKey>>,
    properties: HashMap<NodeKey, Vec<N>>,
    actions: HashMap<NodeKey, Vec<N>>,
    standalone: Vec<N>,
}

impl<N: AgentNode> ResourceForest<N> {
    fn scan(root: &N) -> Self {
        let resource_sel = vocab::resource_selector();
        let resource_nodes = root.query_selector_all(resource_sel);
        let in_scope: HashSet<NodeKey> = resource_nodes.iter().map(|n| n.key()).collect();

        let mut forest = Self {
            nodes: HashMap::with_capacity(resource_nodes.len()),
            skipped: HashSet::new(),
            top_level: Vec::new(),
            children: HashMap::new(),
            properties: HashMap::new(),
            actions: HashMap::new(),
            standalone: Vec::new(),
        };

        for node in resource_nodes {
            let key = node.key();
            let parent = node
                .parent()
                .and_then(|p| p.closest(resource_sel))
                .map(|p| p.key())
                .filter(|k| in_scope.contains(k));
            match parent {
                Some(parent) => forest.children.entry(parent).or_default().push(key),
                None => forest.top_level.push(key),
            }
            if trust::should_skip(&node) {
                tracing::trace!("Skipping resource {key} in untrusted or ignored region");
                forest.skipped.insert(key);
            }
            forest.nodes.insert(key, node);
        }

        for node in root.query_selector_all(vocab::property_selector()) {
            if let Some(owner) = node.closest(resource_sel) {
                forest.properties.entry(owner.key()).or_default().push(node);
            }
        }

        for node in root.query_selector_all(vocab::action_selector()) {
            match node.closest(resource_sel) {
                Some(owner) => forest.actions.entry(owner.key()).or_default().push(node),
                None => forest.standalone.push(node),
            }
        }

        forest
    }

    fn resources(&self) -> Vec<Resource> {
        self.top_level
            .iter()
            .filter_map(|key| self.build(*key))
            .collect()
    }

    fn standalone_actions(&self) -> Vec<Action> {
        self.standalone
            .iter()
            .filter(|node| !skip_logged(*node, "action"))
            .map(|node| build_action(node, None))
            .collect()
    }

    fn build(&self, key: NodeKey) -> Option<Resource> {
        if self.skipped.contains(&key) {
            return None;
        }
        let node = self.nodes.get(&key)?;
        let id = node.attr(vocab::ID).unwrap_or_default();

        let mut properties = IndexMap::new();
        for prop in owned(&self.properties, key) {
            if skip_logged(prop, "property") {
                continue;
            }
            if let Some(property) = build_property(prop) {
                properties.insert(property.name.clone(), property);
            }
        }

        let actions = owned(&self.actions, key)
            .filter(|node| !skip_logged(*node, "action"))
            .map(|node| build_action(node, Some(&id)))
            .collect();

        let children = self
            .children
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|child| self.build(*child))
            .collect();

        Some(Resource {
            resource_type: node.attr(vocab::TYPE).unwrap_or_default(),
            id,
            properties,
            actions,
            children,
            element: key,
        })
    }
}

fn owned<N>(groups: &HashMap<NodeKey, Vec<N>>, owner: NodeKey) -> impl Iterator<Item = &N> {
    groups.get(&owner).into_iter().flatten()
}

fn skip_logged<N: AgentNode>(node: &N, what: &str) -> bool {
    let skip = trust::should_skip(node);
    if skip {
        tracing::trace!("Skipping {what} {} in untrusted or ignored region", node.key());
    }
    skip
}

fn build_property<N: AgentNode>(node: &N) -> Option<Property> {
    let name = node.attr(vocab::PROP).filter(|n| !n.is_empty())?;
    let type_hint = TypeHint::resolve(node.attr(vocab::TYPEHINT).as_deref());
    let raw_value = node
        .attr(vocab::VALUE)
        .unwrap_or_else(|| node.text_content().trim().to_string());

    Some(Property {
        value: coerce_value(&raw_value, type_hint),
        name,
        raw_value,
        type_hint,
        currency: node.attr(vocab::CURRENCY),
        element: node.key(),
    })
}

/// Build an action; `inherited_target` is the owning resource's id, if any.
fn build_action<N: AgentNode>(node: &N, inherited_target: Option<&str>) -> Action {
    Action {
        name: node.attr(vocab::NAME).unwrap_or_default(),
        target: node
            .attr(vocab::TARGET)
            .or_else(|| inherited_target.map(str::to_string)),
        method: HttpMethod::resolve(node.attr(vocab::METHOD).as_deref()),
        endpoint: node.attr(vocab::ENDPOINT),
        params: extract_parameters(node),
        declared_params: node
            .attr(vocab::PARAMS)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        headers: node.attr(vocab::HEADERS).and_then(|h| parse_headers(&h)),
        description: description(node),
        hints: extract_hints(node),
        element: node.key(),
    }
}

fn parse_headers(raw: &str) -> Option<BTreeMap<String, String>> {
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(headers) => Some(headers),
        Err(e) => {
            tracing::debug!("Ignoring malformed action headers: {e}");
            None
        }
    }
}

fn description<N: AgentNode>(node: &N) -> Option<String> {
    [vocab::DESCRIPTION, vocab::ARIA_LABEL, vocab::TITLE]
        .into_iter()
        .find_map(|name| node.attr(name).filter(|v| !v.is_empty()))
}

// Snake-case shapes of the metadata payload that differ from the camelCase model.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPolicies {
    rate_limit: Option<RawRateLimit>,
    require_auth: Option<bool>,
    auth_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRateLimit {
    requests_per_minute: Option<u64>,
}

/// Parse a metadata payload.
///
/// Only an unparsable document is an error. Each section is read on its own,
/// so a section of the wrong shape is dropped without losing the others.
pub fn parse_meta(text: &str) -> AgentResult<PageMeta> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(PageMeta::default());
    }
    let Value::Object(raw) = serde_json::from_str::<Value>(text)? else {
        return Ok(PageMeta::default());
    };

    let policies = section::<RawPolicies>(&raw, "agent_policies").map(|p| AgentPolicies {
        rate_limit: p.rate_limit.map(|r| RateLimit {
            requests_per_minute: r.requests_per_minute,
        }),
        require_auth: p.require_auth,
        auth_method: p.auth_method.filter(|m| !m.is_empty()),
    });

    Ok(PageMeta {
        provider: section::<Provider>(&raw, "provider"),
        defaults: section::<PageDefaults>(&raw, "defaults"),
        page: section::<PageInfo>(&raw, "page"),
        agent_policies: policies,
        related: section::<BTreeMap<String, String>>(&raw, "related"),
    })
}

fn section<T: for<'de> Deserialize<'de>>(raw: &Map<String, Value>, key: &str) -> Option<T> {
    let value = raw.get(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!("Ignoring metadata section '{key}': {e}");
            None
        }
    }
}
