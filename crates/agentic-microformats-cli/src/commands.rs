//! Command implementations shared by the CLI and the REPL.
//!
//! Every command returns the text to print so callers decide where it goes.

use std::fmt::Write;

use anyhow::{bail, Context};
use serde::Serialize;
use serde_json::{Map, Value};

use agentic_microformats::{
    compare, effective_trust_level, is_ignored, should_skip, Action, AgentDom, AgentMutation,
    AgentNode, ExtractionResult, HtmlDocument, HtmlNode, NodeKey, PreparedAction, Resource,
    Snapshot, TrustLevel,
};

use crate::config::OutputFormat;

/// A loaded HTML page and its facade.
pub struct Page {
    pub path: String,
    pub doc: HtmlDocument,
    pub agent: AgentDom<HtmlNode>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Page {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let doc = HtmlDocument::open(path).with_context(|| format!("Failed to load {path}"))?;
        tracing::info!("Loaded page: {path}");
        Ok(Self::from_document(path, doc))
    }

    pub fn parse(label: &str, markup: &str) -> Self {
        Self::from_document(label, HtmlDocument::parse(markup))
    }

    fn from_document(path: &str, doc: HtmlDocument) -> Self {
        let agent = AgentDom::new(doc.root());
        Self {
            path: path.to_string(),
            doc,
            agent,
        }
    }

    /// First element matching `selector`, or an error naming it.
    pub fn select(&self, selector: &str) -> anyhow::Result<HtmlNode> {
        match self.doc.select_first(selector)? {
            Some(node) => Ok(node),
            None => bail!("No element matches '{selector}'"),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

// ─────────────────────── commands ───────────────────────

pub fn extract(page: &Page, format: OutputFormat) -> anyhow::Result<String> {
    let result = page.agent.snapshot();
    match format {
        OutputFormat::Json => to_json(&*result),
        OutputFormat::Text => Ok(render_summary(&result)),
    }
}

pub fn resources(page: &Page, format: OutputFormat) -> anyhow::Result<String> {
    let resources = page.agent.resources();
    match format {
        OutputFormat::Json => to_json(&resources),
        OutputFormat::Text => {
            if resources.is_empty() {
                return Ok("No resources found.".to_string());
            }
            let mut out = String::new();
            for resource in &resources {
                render_resource(&mut out, resource, 0);
            }
            Ok(out.trim_end().to_string())
        }
    }
}

pub fn resource(page: &Page, id: &str, format: OutputFormat) -> anyhow::Result<String> {
    let Some(resource) = page.agent.get_resource(id) else {
        bail!("Resource '{id}' not found in {}", page.path);
    };
    match format {
        OutputFormat::Json => to_json(&resource),
        OutputFormat::Text => {
            let mut out = String::new();
            render_resource(&mut out, &resource, 0);
            Ok(out.trim_end().to_string())
        }
    }
}

pub fn action(
    page: &Page,
    name: &str,
    target: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let action = find_action(page, name, target)?;
    match format {
        OutputFormat::Json => to_json(&action),
        OutputFormat::Text => Ok(render_action(&action)),
    }
}

/// Prepare a request. `values` is a JSON object used verbatim as the body.
pub fn prepare(
    page: &Page,
    name: &str,
    target: Option<&str>,
    values: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let action = find_action(page, name, target)?;
    let values = values.map(parse_values).transpose()?;
    let prepared = page.agent.prepare_action(&action, values);
    if prepared.confirmation_required {
        tracing::warn!("Action '{name}' requires confirmation before it is sent");
    }
    match format {
        OutputFormat::Json => to_json(&prepared),
        OutputFormat::Text => Ok(render_prepared(&prepared)),
    }
}

/// Events that turn the `before` page into the `after` page.
pub fn diff(before: &Page, after: &Page, format: OutputFormat) -> anyhow::Result<String> {
    let events = compare(
        &Snapshot::capture(&before.doc.root()),
        &Snapshot::capture(&after.doc.root()),
    );
    tracing::debug!("{} changes between {} and {}", events.len(), before.path, after.path);
    match format {
        OutputFormat::Json => to_json(&events),
        OutputFormat::Text => Ok(render_events(&events)),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrustReport {
    selector: String,
    element: NodeKey,
    tag: String,
    trust_level: TrustLevel,
    ignored: bool,
    skipped: bool,
}

/// Trust resolution for the first element matching `selector`.
pub fn trust(page: &Page, selector: &str, format: OutputFormat) -> anyhow::Result<String> {
    let node = page.select(selector)?;
    let report = TrustReport {
        selector: selector.to_string(),
        element: node.key(),
        tag: node.tag_name(),
        trust_level: effective_trust_level(&node),
        ignored: is_ignored(&node),
        skipped: should_skip(&node),
    };
    match format {
        OutputFormat::Json => to_json(&report),
        OutputFormat::Text => Ok(format!(
            "{} <{}> {}\n  trust:   {}\n  ignored: {}\n  skipped: {}",
            report.selector,
            report.tag,
            report.element,
            report.trust_level,
            report.ignored,
            report.skipped
        )),
    }
}

fn find_action(page: &Page, name: &str, target: Option<&str>) -> anyhow::Result<Action> {
    match page.agent.get_action(name, target) {
        Some(action) => Ok(action),
        None => match target {
            Some(target) => bail!("Action '{name}' targeting '{target}' not found in {}", page.path),
            None => bail!("Action '{name}' not found in {}", page.path),
        },
    }
}

fn parse_values(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("Invalid --values JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--values must be a JSON object, got {other}"),
    }
}

// ─────────────────────── text rendering ───────────────────────

pub fn render_summary(result: &ExtractionResult) -> String {
    let mut out = String::new();
    let meta = &result.meta;
    if let Some(name) = meta.provider.as_ref().and_then(|p| p.name.as_deref()) {
        let _ = writeln!(out, "Provider:   {name}");
    }
    if let Some(page_type) = meta.page.as_ref().and_then(|p| p.page_type.as_deref()) {
        let _ = writeln!(out, "Page type:  {page_type}");
    }
    if let Some(currency) = meta.defaults.as_ref().and_then(|d| d.currency.as_deref()) {
        let _ = writeln!(out, "Currency:   {currency}");
    }

    let total: usize = result.resources.iter().map(|r| r.walk().len()).sum();
    let _ = writeln!(
        out,
        "Resources:  {} top-level, {} total",
        result.resources.len(),
        total
    );
    let _ = writeln!(out, "Actions:    {} standalone", result.actions.len());

    if !result.resources.is_empty() {
        out.push('\n');
        for resource in &result.resources {
            render_resource(&mut out, resource, 0);
        }
    }
    if !result.actions.is_empty() {
        out.push('\n');
        for action in &result.actions {
            let _ = writeln!(out, "{}", action_line(action));
        }
    }
    out.trim_end().to_string()
}

fn render_resource(out: &mut String, resource: &Resource, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{} {}", resource.resource_type, resource.id);
    for property in resource.properties.values() {
        let currency = property
            .currency
            .as_deref()
            .map(|c| format!(" {c}"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{indent}  .{} = {}{currency} [{}]",
            property.name, property.value, property.type_hint
        );
    }
    for action in &resource.actions {
        let _ = writeln!(out, "{indent}  {}", action_line(action));
    }
    for child in &resource.children {
        render_resource(out, child, depth + 1);
    }
}

fn action_line(action: &Action) -> String {
    let endpoint = action.endpoint.as_deref().unwrap_or("-");
    let flag = if agentic_microformats::requires_confirmation(&action.hints) {
        " (confirm)"
    } else {
        ""
    };
    format!("-> {} {} {endpoint}{flag}", action.name, action.method)
}

pub fn render_action(action: &Action) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", action_line(action));
    if let Some(target) = &action.target {
        let _ = writeln!(out, "  target:      {target}");
    }
    if let Some(description) = &action.description {
        let _ = writeln!(out, "  description: {description}");
    }
    if let Some(headers) = &action.headers {
        for (name, value) in headers {
            let _ = writeln!(out, "  header:      {name}: {value}");
        }
    }

    let hints = &action.hints;
    let mut flags = Vec::new();
    if let Some(role) = hints.role {
        flags.push(format!("role={role}"));
    }
    if let Some(risk) = hints.risk {
        flags.push(format!("risk={risk}"));
    }
    if let Some(reversible) = hints.reversible {
        flags.push(format!("reversible={reversible}"));
    }
    if hints.human_preferred {
        flags.push("human-preferred".to_string());
    }
    if let Some(cost) = hints.cost {
        match &hints.cost_currency {
            Some(currency) => flags.push(format!("cost={cost} {currency}")),
            None => flags.push(format!("cost={cost}")),
        }
    }
    if !flags.is_empty() {
        let _ = writeln!(out, "  hints:       {}", flags.join(", "));
    }

    if !action.params.is_empty() {
        let _ = writeln!(out, "  params:");
        for param in &action.params {
            let mut marks = Vec::new();
            if param.required {
                marks.push("required");
            }
            if param.disabled {
                marks.push("disabled");
            }
            let marks = if marks.is_empty() {
                String::new()
            } else {
                format!(" ({})", marks.join(", "))
            };
            let value = param.value.as_deref().unwrap_or("<none>");
            let _ = writeln!(
                out,
                "    {}: {}{marks} = {value}",
                param.name, param.type_hint
            );
        }
    }
    out.trim_end().to_string()
}

pub fn render_prepared(prepared: &PreparedAction) -> String {
    let mut out = String::new();
    let url = if prepared.url.is_empty() {
        "<no endpoint>"
    } else {
        prepared.url.as_str()
    };
    let _ = writeln!(out, "{} {url}", prepared.method);
    for (name, value) in &prepared.headers {
        let _ = writeln!(out, "{name}: {value}");
    }
    let body = serde_json::to_string_pretty(&prepared.body).unwrap_or_default();
    let _ = writeln!(out, "\n{body}\n");
    if prepared.confirmation_required {
        let _ = writeln!(out, "Confirmation required");
    }
    for warning in &prepared.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    out.trim_end().to_string()
}

pub fn render_events(events: &[AgentMutation]) -> String {
    if events.is_empty() {
        return "No changes.".to_string();
    }
    let lines: Vec<String> = events.iter().map(event_line).collect();
    lines.join("\n")
}

pub fn event_line(event: &AgentMutation) -> String {
    let kind = event.kind();
    match event {
        AgentMutation::ResourceAdded { resource } | AgentMutation::ResourceRemoved { resource } => {
            format!("{kind} {} {}", resource.resource_type, resource.id)
        }
        AgentMutation::ResourceChanged {
            resource,
            previous_type,
        } => format!(
            "{kind} {}: {previous_type} -> {}",
            resource.id, resource.resource_type
        ),
        AgentMutation::PropertyChanged {
            resource_id,
            property,
            previous_value,
        } => match previous_value {
            Some(previous) => format!(
                "{kind} {resource_id}.{}: {previous:?} -> {:?}",
                property.name, property.raw_value
            ),
            None => format!(
                "{kind} {resource_id}.{}: {:?} (new)",
                property.name, property.raw_value
            ),
        },
        AgentMutation::ActionAdded { action } | AgentMutation::ActionRemoved { action } => {
            format!("{kind} {}", action_key(action))
        }
        AgentMutation::ActionChanged { action, previous } => format!(
            "{kind} {}: {} {} -> {} {}",
            action_key(action),
            previous.method,
            previous.endpoint.as_deref().unwrap_or("-"),
            action.method,
            action.endpoint.as_deref().unwrap_or("-")
        ),
    }
}

fn action_key(action: &Action) -> String {
    match &action.target {
        Some(target) => format!("{}@{target}", action.name),
        None => action.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div data-agent="resource" data-agent-type="product" data-agent-id="P1">
            <span data-agent-prop="price" data-agent-typehint="currency" data-agent-currency="EUR">9,50</span>
            <form data-agent="action" data-agent-name="buy" data-agent-endpoint="/buy"
                  data-agent-cost="9.5" data-agent-cost-currency="EUR">
                <input data-agent-param="qty" data-agent-typehint="integer" value="2" required>
            </form>
        </div>
    </body></html>"#;

    fn page() -> Page {
        Page::parse("inline", PAGE)
    }

    #[test]
    fn test_resource_tree_text() {
        let text = resources(&page(), OutputFormat::Text).unwrap();
        assert!(text.starts_with("product P1"));
        assert!(text.contains(".price = 9.5 EUR [currency]"));
        assert!(text.contains("-> buy POST /buy (confirm)"));
    }

    #[test]
    fn test_missing_lookups_fail() {
        let page = page();
        let err = resource(&page, "P9", OutputFormat::Json).unwrap_err();
        assert!(err.to_string().contains("Resource 'P9' not found"));
        let err = action(&page, "buy", Some("P9"), OutputFormat::Text).unwrap_err();
        assert!(err.to_string().contains("targeting 'P9'"));
    }

    #[test]
    fn test_prepare_with_and_without_values() {
        let page = page();
        let json: Value =
            serde_json::from_str(&prepare(&page, "buy", None, None, OutputFormat::Json).unwrap())
                .unwrap();
        assert_eq!(json["body"]["qty"], 2);
        assert_eq!(json["confirmationRequired"], true);
        assert_eq!(json["warnings"][0], "Cost: 9.5 EUR");

        let json: Value = serde_json::from_str(
            &prepare(&page, "buy", None, Some(r#"{"qty": 5}"#), OutputFormat::Json).unwrap(),
        )
        .unwrap();
        assert_eq!(json["body"], serde_json::json!({"qty": 5}));

        assert!(prepare(&page, "buy", None, Some("[1]"), OutputFormat::Json).is_err());
        assert!(prepare(&page, "buy", None, Some("{oops"), OutputFormat::Json).is_err());
    }

    #[test]
    fn test_diff_between_pages() {
        let before = page();
        let after = Page::parse("after", &PAGE.replace("9,50", "8,00"));
        let text = diff(&before, &after, OutputFormat::Text).unwrap();
        assert_eq!(text, r#"property-changed P1.price: "9,50" -> "8,00""#);
        assert_eq!(diff(&before, &page(), OutputFormat::Text).unwrap(), "No changes.");
    }

    #[test]
    fn test_trust_report() {
        let page = Page::parse(
            "inline",
            r#"<div data-agent-trust="untrusted"><p id="c">hi</p></div>"#,
        );
        let json: Value =
            serde_json::from_str(&trust(&page, "#c", OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["trustLevel"], "untrusted");
        assert_eq!(json["skipped"], true);
        assert_eq!(json["ignored"], false);
        let json: Value =
            serde_json::from_str(&trust(&page, "div > p", OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["selector"], "div > p");
        assert_eq!(json["tag"], "p");
        assert!(trust(&page, "p[", OutputFormat::Json).is_err());
        assert!(trust(&page, "#missing", OutputFormat::Json).is_err());
    }
}
