//! Snapshot diffing and live observation.
//!
//! Each host-delivered batch of tree changes triggers one diff round: the
//! resources and standalone actions are extracted again and compared with the
//! previous round's snapshot, producing typed [`AgentMutation`] events.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dom::{AgentNode, MutationRecord, MutationSource, NodeKey, SubscriptionId, TreeChange};
use crate::extract::extract_model;
use crate::types::{Action, AgentError, AgentResult, Property, Resource};
use crate::vocab;

/// Resources and standalone actions from one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub resources: Vec<Resource>,
    pub actions: Vec<Action>,
}

impl Snapshot {
    pub fn capture<N: AgentNode>(root: &N) -> Self {
        let (resources, actions) = extract_model(root);
        Self { resources, actions }
    }

    /// Every resource by id, depth-first. A repeated id keeps the last one.
    fn resource_index(&self) -> IndexMap<&str, &Resource> {
        self.resources
            .iter()
            .flat_map(Resource::walk)
            .map(|r| (r.id.as_str(), r))
            .collect()
    }

    fn action_index(&self) -> IndexMap<ActionKey<'_>, &Action> {
        self.actions.iter().map(|a| (ActionKey::of(a), a)).collect()
    }
}

/// Identity of a standalone action across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ActionKey<'a> {
    name: &'a str,
    target: &'a str,
}

impl<'a> ActionKey<'a> {
    fn of(action: &'a Action) -> Self {
        Self {
            name: &action.name,
            target: action.target.as_deref().unwrap_or(""),
        }
    }
}

/// A typed change between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentMutation {
    ResourceAdded {
        resource: Resource,
    },
    ResourceRemoved {
        resource: Resource,
    },
    /// Same id, different type tag.
    #[serde(rename_all = "camelCase")]
    ResourceChanged {
        resource: Resource,
        previous_type: String,
    },
    /// A property's raw value differs, or the property is new.
    #[serde(rename_all = "camelCase")]
    PropertyChanged {
        resource_id: String,
        property: Property,
        previous_value: Option<String>,
    },
    ActionAdded {
        action: Action,
    },
    ActionRemoved {
        action: Action,
    },
    /// Same name and target, different method or endpoint.
    ActionChanged {
        action: Action,
        previous: Action,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    ResourceAdded,
    ResourceRemoved,
    ResourceChanged,
    PropertyChanged,
    ActionAdded,
    ActionRemoved,
    ActionChanged,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::ResourceAdded => "resource-added",
            MutationKind::ResourceRemoved => "resource-removed",
            MutationKind::ResourceChanged => "resource-changed",
            MutationKind::PropertyChanged => "property-changed",
            MutationKind::ActionAdded => "action-added",
            MutationKind::ActionRemoved => "action-removed",
            MutationKind::ActionChanged => "action-changed",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgentMutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            AgentMutation::ResourceAdded { .. } => MutationKind::ResourceAdded,
            AgentMutation::ResourceRemoved { .. } => MutationKind::ResourceRemoved,
            AgentMutation::ResourceChanged { .. } => MutationKind::ResourceChanged,
            AgentMutation::PropertyChanged { .. } => MutationKind::PropertyChanged,
            AgentMutation::ActionAdded { .. } => MutationKind::ActionAdded,
            AgentMutation::ActionRemoved { .. } => MutationKind::ActionRemoved,
            AgentMutation::ActionChanged { .. } => MutationKind::ActionChanged,
        }
    }

    /// The node the event is about.
    pub fn element(&self) -> NodeKey {
        match self {
            AgentMutation::ResourceAdded { resource }
            | AgentMutation::ResourceRemoved { resource }
            | AgentMutation::ResourceChanged { resource, .. } => resource.element,
            AgentMutation::PropertyChanged { property, .. } => property.element,
            AgentMutation::ActionAdded { action }
            | AgentMutation::ActionRemoved { action }
            | AgentMutation::ActionChanged { action, .. } => action.element,
        }
    }
}

/// Events that turn `previous` into `current`.
///
/// Order: for each current resource, its added/changed event followed by its
/// property changes; then removed resources; then added, removed and changed
/// actions. A property that disappears produces no event.
pub fn compare(previous: &Snapshot, current: &Snapshot) -> Vec<AgentMutation> {
    let before = previous.resource_index();
    let after = current.resource_index();
    let mut events = Vec::new();

    for (id, resource) in &after {
        let Some(old) = before.get(id) else {
            events.push(AgentMutation::ResourceAdded {
                resource: (*resource).clone(),
            });
            continue;
        };
        if old.resource_type != resource.resource_type {
            events.push(AgentMutation::ResourceChanged {
                resource: (*resource).clone(),
                previous_type: old.resource_type.clone(),
            });
        }
        for (name, property) in &resource.properties {
            let previous_value = old.properties.get(name).map(|p| &p.raw_value);
            if previous_value != Some(&property.raw_value) {
                events.push(AgentMutation::PropertyChanged {
                    resource_id: id.to_string(),
                    property: property.clone(),
                    previous_value: previous_value.cloned(),
                });
            }
        }
    }

    for (id, resource) in &before {
        if !after.contains_key(id) {
            events.push(AgentMutation::ResourceRemoved {
                resource: (*resource).clone(),
            });
        }
    }

    let before = previous.action_index();
    let after = current.action_index();

    for (key, action) in &after {
        if !before.contains_key(key) {
            events.push(AgentMutation::ActionAdded {
                action: (*action).clone(),
            });
        }
    }
    for (key, action) in &before {
        if !after.contains_key(key) {
            events.push(AgentMutation::ActionRemoved {
                action: (*action).clone(),
            });
        }
    }
    for (key, action) in &after {
        if let Some(old) = before.get(key) {
            if old.method != action.method || old.endpoint != action.endpoint {
                events.push(AgentMutation::ActionChanged {
                    action: (*action).clone(),
                    previous: (*old).clone(),
                });
            }
        }
    }

    events
}

/// Holds the baseline snapshot between diff rounds.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiffer {
    baseline: Snapshot,
}

impl SnapshotDiffer {
    pub fn new<N: AgentNode>(root: &N) -> Self {
        Self::from_snapshot(Snapshot::capture(root))
    }

    pub fn from_snapshot(baseline: Snapshot) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    /// Extract again, compare, and make the new pass the baseline.
    pub fn diff<N: AgentNode>(&mut self, root: &N) -> Vec<AgentMutation> {
        let current = Snapshot::capture(root);
        let events = compare(&self.baseline, &current);
        self.baseline = current;
        events
    }
}

/// Handle for a live observation.
///
/// Dropping the handle leaves the subscription running; call
/// [`disconnect`](Self::disconnect) to stop it.
pub struct Observer {
    active: Arc<AtomicBool>,
    source: Box<dyn MutationSource>,
    id: SubscriptionId,
}

impl Observer {
    /// Stop delivery. No diff round runs after this returns.
    pub fn disconnect(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.source.unsubscribe(self.id);
            tracing::debug!("Observer {:?} disconnected", self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Watch the subtree at `root` and report agent-level changes.
///
/// `callback` runs at most once per host batch, and only when the round
/// produced events. Fails immediately when the host cannot report mutations.
pub fn observe<N, F>(root: &N, callback: F) -> AgentResult<Observer>
where
    N: AgentNode + Send + 'static,
    F: FnMut(&[AgentMutation]) + Send + 'static,
{
    observe_with(root, || {}, callback)
}

/// [`observe`] with a hook that runs on every host batch, before filtering.
pub(crate) fn observe_with<N, H, F>(root: &N, mut on_batch: H, mut callback: F) -> AgentResult<Observer>
where
    N: AgentNode + Send + 'static,
    H: FnMut() + Send + 'static,
    F: FnMut(&[AgentMutation]) + Send + 'static,
{
    let source = root
        .mutation_source()
        .ok_or(AgentError::ObservationUnsupported)?;

    let mut differ = SnapshotDiffer::new(root);
    let active = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&active);
    let root = root.clone();

    let id = source.subscribe(Box::new(move |records: &[MutationRecord]| {
        if !flag.load(Ordering::SeqCst) {
            return;
        }
        on_batch();
        if !is_relevant(records) {
            tracing::trace!("Ignoring batch of {} unobserved attribute changes", records.len());
            return;
        }
        let events = differ.diff(&root);
        tracing::debug!("Diff round over {} records: {} events", records.len(), events.len());
        if !events.is_empty() {
            callback(&events);
        }
    }));
    tracing::debug!("Observer {id:?} subscribed");

    Ok(Observer { active, source, id })
}

/// Whether a batch can change the extracted model.
fn is_relevant(records: &[MutationRecord]) -> bool {
    records.iter().any(|record| match &record.change {
        TreeChange::Attribute { name } => vocab::OBSERVED_ATTRIBUTES.contains(&name.as_str()),
        TreeChange::ChildList | TreeChange::CharacterData => true,
    })
}
