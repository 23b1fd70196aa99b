//! High-level entry point over one host tree.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::dom::AgentNode;
use crate::extract::extract_all;
use crate::hints::{requires_confirmation, warnings};
use crate::observe::{observe_with, AgentMutation, Observer};
use crate::params::build_nested_params;
use crate::types::{Action, AgentResult, ExtractionResult, PageMeta, PreparedAction, Resource};

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    cached: Option<(u64, Arc<ExtractionResult>)>,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn invalidate(state: &Mutex<CacheState>) {
    lock(state).generation += 1;
}

/// Cached extraction, lookups and request preparation for one root node.
///
/// The cache belongs to a generation. [`extract`](Self::extract), starting an
/// observation and every batch delivered to an observation move to a new
/// generation, and the next read extracts again.
pub struct AgentDom<N: AgentNode> {
    root: N,
    state: Arc<Mutex<CacheState>>,
}

impl<N: AgentNode> AgentDom<N> {
    pub fn new(root: N) -> Self {
        Self {
            root,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn root(&self) -> &N {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// The extraction result for the current generation.
    pub fn snapshot(&self) -> Arc<ExtractionResult> {
        let generation = {
            let state = lock(&self.state);
            if let Some((built_for, result)) = &state.cached {
                if *built_for == state.generation {
                    return Arc::clone(result);
                }
            }
            state.generation
        };

        let result = Arc::new(extract_all(&self.root));
        let mut state = lock(&self.state);
        if state.generation == generation {
            state.cached = Some((generation, Arc::clone(&result)));
        }
        result
    }

    /// Drop the cache and extract again.
    pub fn extract(&self) -> Arc<ExtractionResult> {
        invalidate(&self.state);
        self.snapshot()
    }

    pub fn meta(&self) -> PageMeta {
        self.snapshot().meta.clone()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.snapshot().resources.clone()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.snapshot().actions.clone()
    }

    /// Depth-first search by id, nested resources included.
    pub fn get_resource(&self, id: &str) -> Option<Resource> {
        self.snapshot()
            .resources
            .iter()
            .flat_map(Resource::walk)
            .find(|r| r.id == id)
            .cloned()
    }

    /// Resource-owned actions first (depth-first), then standalone actions.
    /// `target` only filters when given.
    pub fn get_action(&self, name: &str, target: Option<&str>) -> Option<Action> {
        let result = self.snapshot();
        let matches = |a: &&Action| a.name == name && target.map_or(true, |t| a.target.as_deref() == Some(t));

        let found = result
            .resources
            .iter()
            .flat_map(Resource::walk)
            .flat_map(|r| r.actions.iter())
            .find(matches)
            .or_else(|| result.actions.iter().find(matches))
            .cloned();
        found
    }

    /// Observe the root; the cache is dropped now and on every host batch.
    pub fn observe<F>(&self, callback: F) -> AgentResult<Observer>
    where
        N: Send + 'static,
        F: FnMut(&[AgentMutation]) + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let observer = observe_with(&self.root, move || invalidate(&state), callback)?;
        invalidate(&self.state);
        Ok(observer)
    }

    pub fn prepare_action(&self, action: &Action, values: Option<Map<String, Value>>) -> PreparedAction {
        prepare_action(action, values)
    }
}

/// Turn an action into a request descriptor.
///
/// Supplied `values` become the body verbatim; otherwise the body is built
/// from the action's own parameters.
pub fn prepare_action(action: &Action, values: Option<Map<String, Value>>) -> PreparedAction {
    PreparedAction {
        method: action.method,
        url: action.endpoint.clone().unwrap_or_default(),
        headers: action.headers.clone().unwrap_or_default(),
        body: values.unwrap_or_else(|| build_nested_params(&action.params)),
        confirmation_required: requires_confirmation(&action.hints),
        warnings: warnings(&action.hints),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{HtmlDocument, HtmlNode};
    use crate::types::{AgentError, HttpMethod};
    use serde_json::json;

    const PROJECT: &str = r#"
        <script type="application/json" data-agent-meta>{"provider":{"name":"Acme"}}</script>
        <div data-agent="resource" data-agent-type="project" data-agent-id="P1">
            <span id="status" data-agent-prop="status">active</span>
            <button data-agent="action" data-agent-name="archive" data-agent-endpoint="/archive"></button>
            <div data-agent="resource" data-agent-type="task" data-agent-id="T1">
                <button data-agent="action" data-agent-name="archive" data-agent-endpoint="/tasks/archive"></button>
                <form data-agent="action" data-agent-name="delete" data-agent-method="DELETE"
                      data-agent-endpoint="/tasks/T1" data-agent-risk="high" data-agent-reversible="false"
                      data-agent-headers='{"X-Confirm":"yes"}'>
                    <input data-agent-param="reason.code" data-agent-typehint="integer" value="3">
                    <input data-agent-param="reason.note" value="done">
                </form>
            </div>
        </div>
        <form data-agent="action" data-agent-name="create_project" data-agent-endpoint="/projects"></form>
    "#;

    fn dom() -> (HtmlDocument, AgentDom<HtmlNode>) {
        let doc = HtmlDocument::parse(PROJECT);
        let agent = AgentDom::new(doc.root());
        (doc, agent)
    }

    #[test]
    fn test_accessors_share_one_cached_result() {
        let (_doc, agent) = dom();
        let first = agent.snapshot();
        let second = agent.snapshot();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(agent.meta().provider.unwrap().name.as_deref(), Some("Acme"));
        assert_eq!(agent.resources().len(), 1);
        assert_eq!(agent.actions().len(), 1);
    }

    #[test]
    fn test_extract_bumps_generation() {
        let (doc, agent) = dom();
        let before = agent.snapshot();
        let status = doc.select_first("#status").unwrap().unwrap();
        doc.set_text(&status, "archived").unwrap();

        assert!(Arc::ptr_eq(&before, &agent.snapshot()));
        let generation = agent.generation();
        let after = agent.extract();
        assert_eq!(agent.generation(), generation + 1);
        assert_eq!(after.resources[0].property("status").unwrap().raw_value, "archived");
    }

    #[test]
    fn test_get_resource_searches_nested() {
        let (_doc, agent) = dom();
        assert_eq!(agent.get_resource("T1").unwrap().resource_type, "task");
        assert!(agent.get_resource("missing").is_none());
    }

    #[test]
    fn test_get_action_order_and_target() {
        let (_doc, agent) = dom();
        let first = agent.get_action("archive", None).unwrap();
        assert_eq!(first.target.as_deref(), Some("P1"));
        let task = agent.get_action("archive", Some("T1")).unwrap();
        assert_eq!(task.endpoint.as_deref(), Some("/tasks/archive"));
        assert!(agent.get_action("archive", Some("nope")).is_none());

        let standalone = agent.get_action("create_project", None).unwrap();
        assert_eq!(standalone.target, None);
        assert!(agent.get_action("create_project", Some("P1")).is_none());
    }

    #[test]
    fn test_prepare_action_from_declared_params() {
        let (_doc, agent) = dom();
        let delete = agent.get_action("delete", None).unwrap();
        let prepared = agent.prepare_action(&delete, None);

        assert_eq!(prepared.method, HttpMethod::Delete);
        assert_eq!(prepared.url, "/tasks/T1");
        assert_eq!(prepared.headers.get("X-Confirm").map(String::as_str), Some("yes"));
        assert_eq!(
            Value::Object(prepared.body),
            json!({"reason": {"code": 3, "note": "done"}})
        );
        assert!(prepared.confirmation_required);
        assert_eq!(prepared.warnings, vec!["High risk action", "Irreversible action"]);
    }

    #[test]
    fn test_prepare_action_with_supplied_values() {
        let (_doc, agent) = dom();
        let delete = agent.get_action("delete", None).unwrap();
        let mut values = Map::new();
        values.insert("force".into(), json!(true));

        let prepared = agent.prepare_action(&delete, Some(values.clone()));
        assert_eq!(prepared.body, values);
    }

    #[test]
    fn test_prepare_action_defaults() {
        let (_doc, agent) = dom();
        let create = agent.get_action("create_project", None).unwrap();
        let mut bare = create.clone();
        bare.endpoint = None;

        let prepared = prepare_action(&bare, None);
        assert_eq!(prepared.method, HttpMethod::Post);
        assert_eq!(prepared.url, "");
        assert!(prepared.headers.is_empty());
        assert!(prepared.body.is_empty());
        assert!(!prepared.confirmation_required);
        assert!(prepared.warnings.is_empty());
    }

    #[test]
    fn test_observe_invalidates_cache() {
        let (doc, agent) = dom();
        let before = agent.snapshot();
        let start = agent.generation();
        let observer = agent.observe(|_: &[AgentMutation]| {}).unwrap();
        assert_eq!(agent.generation(), start + 1);

        let status = doc.select_first("#status").unwrap().unwrap();
        doc.set_attribute(&status, "class", "ignored-by-differ").unwrap();
        doc.flush();
        assert_eq!(agent.generation(), start + 2);

        doc.set_text(&status, "paused").unwrap();
        doc.flush();
        assert!(!Arc::ptr_eq(&before, &agent.snapshot()));
        assert_eq!(
            agent.get_resource("P1").unwrap().property("status").unwrap().raw_value,
            "paused"
        );

        observer.disconnect();
        let generation = agent.generation();
        doc.set_text(&status, "done").unwrap();
        doc.flush();
        assert_eq!(agent.generation(), generation);
    }

    #[test]
    fn test_observe_unsupported_host() {
        let doc = HtmlDocument::frozen(PROJECT);
        let agent = AgentDom::new(doc.root());
        let start = agent.generation();
        let err = agent.observe(|_: &[AgentMutation]| {}).unwrap_err();
        assert!(matches!(err, AgentError::ObservationUnsupported));
        assert_eq!(agent.generation(), start);
        assert_eq!(agent.resources().len(), 1);
    }
}
