//! End-to-end tests for agentic-microformats.
//!
//! Covers a storefront and a dashboard page through the public API: file
//! loading, extraction shape, trust filtering, request preparation and live
//! observation.

use std::io::Write;
use std::sync::{Arc, Mutex};

use assert_json_diff::{assert_json_eq, assert_json_include};
use serde_json::{json, Map, Value};

use agentic_microformats::*;

// ─────────────────────── fixtures ───────────────────────

const STOREFRONT: &str = r#"<!DOCTYPE html>
<html>
<head>
  <script type="application/json" data-agent-meta>
  {
    "provider": {"name": "Example Shop GmbH", "jurisdiction": "DE", "url": "https://shop.example"},
    "defaults": {"currency": "EUR", "locale": "de-DE", "timezone": "Europe/Berlin"},
    "page": {"type": "product"},
    "agent_policies": {"rate_limit": {"requests_per_minute": 30}, "require_auth": false},
    "related": {"cart": "/cart", "checkout": "/checkout"}
  }
  </script>
</head>
<body>
  <main data-agent-trust="system">
    <article data-agent="resource" data-agent-type="product" data-agent-id="SKU-USB-C-2M">
      <h1 data-agent-prop="name">USB-C Cable 2m</h1>
      <span data-agent-prop="price" data-agent-typehint="currency" data-agent-currency="EUR">14,99 €</span>
      <span id="stock" data-agent-prop="stock" data-agent-typehint="integer">42</span>
      <span data-agent-prop="rating" data-agent-typehint="number">4.7</span>
      <form data-agent="action" data-agent-name="add_to_cart"
            data-agent-method="post" data-agent-endpoint="/cart/add"
            data-agent-role="primary" data-agent-risk="low"
            data-agent-headers='{"Accept":"application/json"}'>
        <input data-agent-param="product_id" type="hidden" value="SKU-USB-C-2M">
        <input data-agent-param="quantity" data-agent-typehint="integer" type="number" value="1" required>
        <select data-agent-param="options.color">
          <option value="black">Black</option>
          <option value="white" selected>White</option>
        </select>
        <input data-agent-param="options.gift" data-agent-typehint="boolean" type="checkbox">
      </form>
    </article>
  </main>
  <section data-agent-trust="untrusted" class="reviews">
    <div data-agent="resource" data-agent-type="product" data-agent-id="SKU-FAKE">
      <span data-agent-prop="price">0.01</span>
    </div>
    <form data-agent="action" data-agent-name="claim_prize" data-agent-endpoint="https://evil.example"></form>
  </section>
  <form data-agent="action" data-agent-name="newsletter_signup" data-agent-endpoint="/newsletter"
        title="Subscribe to the newsletter">
    <input data-agent-param="email" data-agent-typehint="email" aria-required="true">
  </form>
</body>
</html>"#;

const DASHBOARD: &str = r#"<!DOCTYPE html>
<html><body>
  <div data-agent="resource" data-agent-type="project" data-agent-id="PRJ-1">
    <span data-agent-prop="name">Website relaunch</span>
    <span data-agent-prop="budget" data-agent-typehint="currency">1.234,56</span>
    <span data-agent-prop="due" data-agent-typehint="date" data-agent-value="2025-03-31">31. März</span>
    <button data-agent="action" data-agent-name="delete" data-agent-method="DELETE"
            data-agent-endpoint="/projects/PRJ-1" data-agent-role="danger"
            data-agent-risk="high" data-agent-reversible="false"
            data-agent-human-preferred="true" data-agent-cost="5" data-agent-cost-currency="EUR">Delete</button>
    <ul id="tasks">
      <li data-agent="resource" data-agent-type="task" data-agent-id="TSK-1">
        <span data-agent-prop="title">Design</span>
        <button data-agent="action" data-agent-name="complete" data-agent-endpoint="/tasks/TSK-1/complete"></button>
      </li>
    </ul>
  </div>
</body></html>"#;

/// Write markup to a temp file and open it as a document.
fn open_temp(markup: &str) -> (tempfile::TempDir, HtmlDocument) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.html");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(markup.as_bytes()).unwrap();
    let doc = HtmlDocument::open(&path).unwrap();
    (dir, doc)
}

// ═══════════════════════════════════════════════════════
// EXTRACTION
// ═══════════════════════════════════════════════════════

#[test]
fn test_01_storefront_from_file() {
    let (_dir, doc) = open_temp(STOREFRONT);
    let result = extract_all(&doc.root());

    assert_eq!(result.resources.len(), 1);
    assert_eq!(result.actions.len(), 1);
    assert_eq!(result.actions[0].name, "newsletter_signup");
    assert_eq!(
        result.actions[0].description.as_deref(),
        Some("Subscribe to the newsletter")
    );

    let json = serde_json::to_value(&result).unwrap();
    assert_json_include!(
        actual: json,
        expected: json!({
            "meta": {
                "provider": {"name": "Example Shop GmbH", "jurisdiction": "DE"},
                "defaults": {"currency": "EUR", "timezone": "Europe/Berlin"},
                "page": {"type": "product"},
                "agentPolicies": {"rateLimit": {"requestsPerMinute": 30}, "requireAuth": false},
                "related": {"cart": "/cart"}
            },
            "resources": [{
                "type": "product",
                "id": "SKU-USB-C-2M",
                "properties": {
                    "name": {"rawValue": "USB-C Cable 2m", "typeHint": "string", "value": "USB-C Cable 2m"},
                    "price": {"rawValue": "14,99 €", "typeHint": "currency", "value": 14.99, "currency": "EUR"},
                    "stock": {"value": 42},
                    "rating": {"value": 4.7}
                },
                "actions": [{
                    "name": "add_to_cart",
                    "target": "SKU-USB-C-2M",
                    "method": "POST",
                    "endpoint": "/cart/add",
                    "headers": {"Accept": "application/json"},
                    "hints": {"role": "primary", "risk": "low", "humanPreferred": false}
                }],
                "children": []
            }]
        })
    );
    println!("TEST 01 — Storefront extraction: PASS");
}

#[test]
fn test_02_untrusted_content_never_leaks() {
    let doc = HtmlDocument::parse(STOREFRONT);
    let agent = AgentDom::new(doc.root());

    assert!(agent.get_resource("SKU-FAKE").is_none());
    assert!(agent.get_action("claim_prize", None).is_none());

    let reviews = doc.select_first("section.reviews").unwrap().unwrap();
    assert_eq!(effective_trust_level(&reviews), TrustLevel::Untrusted);
    println!("TEST 02 — Untrusted content filtered: PASS");
}

#[test]
fn test_03_dashboard_nesting() {
    let doc = HtmlDocument::parse(DASHBOARD);
    let resources = extract_resources(&doc.root());

    assert_eq!(resources.len(), 1);
    let project = &resources[0];
    assert_eq!(project.actions.len(), 1);
    assert_eq!(project.children.len(), 1);
    assert_eq!(project.children[0].actions[0].target.as_deref(), Some("TSK-1"));
    assert!(project.property("title").is_none());
    assert_eq!(project.property("budget").unwrap().value, json!(1234.56));
    assert_eq!(project.property("due").unwrap().raw_value, "2025-03-31");
    println!("TEST 03 — Dashboard nesting: PASS");
}

// ═══════════════════════════════════════════════════════
// REQUEST PREPARATION
// ═══════════════════════════════════════════════════════

#[test]
fn test_04_prepare_add_to_cart() {
    let doc = HtmlDocument::parse(STOREFRONT);
    let agent = AgentDom::new(doc.root());
    let action = agent.get_action("add_to_cart", Some("SKU-USB-C-2M")).unwrap();
    let prepared = agent.prepare_action(&action, None);

    assert_json_eq!(
        serde_json::to_value(&prepared).unwrap(),
        json!({
            "method": "POST",
            "url": "/cart/add",
            "headers": {"Accept": "application/json"},
            "body": {
                "product_id": "SKU-USB-C-2M",
                "quantity": 1,
                "options": {"color": "white", "gift": false}
            },
            "confirmationRequired": false,
            "warnings": []
        })
    );
    println!("TEST 04 — Prepare add_to_cart: PASS");
}

#[test]
fn test_05_prepare_dangerous_delete() {
    let doc = HtmlDocument::parse(DASHBOARD);
    let agent = AgentDom::new(doc.root());
    let delete = agent.get_action("delete", None).unwrap();

    let mut values = Map::new();
    values.insert("confirm".into(), Value::Bool(true));
    let prepared = agent.prepare_action(&delete, Some(values));

    assert!(prepared.confirmation_required);
    assert_eq!(
        prepared.warnings,
        vec![
            "High risk action",
            "Irreversible action",
            "Human confirmation preferred",
            "Cost: 5 EUR",
            "Danger action",
        ]
    );
    assert_json_eq!(Value::Object(prepared.body), json!({"confirm": true}));
    println!("TEST 05 — Prepare dangerous delete: PASS");
}

// ═══════════════════════════════════════════════════════
// OBSERVATION
// ═══════════════════════════════════════════════════════

#[test]
fn test_06_live_stock_update() {
    let doc = HtmlDocument::parse(STOREFRONT);
    let agent = AgentDom::new(doc.root());
    assert_eq!(
        agent.get_resource("SKU-USB-C-2M").unwrap().property("stock").unwrap().value,
        json!(42)
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let observer = agent
        .observe(move |batch: &[AgentMutation]| sink.lock().unwrap().extend_from_slice(batch))
        .unwrap();

    let stock = doc.select_first("#stock").unwrap().unwrap();
    doc.set_text(&stock, "41").unwrap();
    doc.flush();

    {
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let json = serde_json::to_value(&events[0]).unwrap();
        assert_json_include!(
            actual: json,
            expected: json!({
                "type": "property-changed",
                "resourceId": "SKU-USB-C-2M",
                "previousValue": "42",
                "property": {"name": "stock", "rawValue": "41", "value": 41}
            })
        );
    }
    assert_eq!(
        agent.get_resource("SKU-USB-C-2M").unwrap().property("stock").unwrap().value,
        json!(41)
    );

    observer.disconnect();
    println!("TEST 06 — Live stock update: PASS");
}

#[test]
fn test_07_new_task_appears() {
    let doc = HtmlDocument::parse(DASHBOARD);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _observer = observe(&doc.root(), move |batch: &[AgentMutation]| {
        sink.lock().unwrap().extend(batch.iter().map(AgentMutation::kind))
    })
    .unwrap();

    let tasks = doc.select_first("#tasks").unwrap().unwrap();
    doc.append_html(
        &tasks,
        r#"<li data-agent="resource" data-agent-type="task" data-agent-id="TSK-2">
             <span data-agent-prop="title">Build</span>
           </li>"#,
    )
    .unwrap();
    doc.flush();

    assert_eq!(*events.lock().unwrap(), vec![MutationKind::ResourceAdded]);
    println!("TEST 07 — New nested task: PASS");
}

#[test]
fn test_08_trust_flip_removes_resource() {
    let doc = HtmlDocument::parse(DASHBOARD);
    let mut differ = SnapshotDiffer::new(&doc.root());

    let task = doc.select_first("[data-agent-id=TSK-1]").unwrap().unwrap();
    doc.set_attribute(&task, "data-agent-trust", "untrusted").unwrap();

    let kinds: Vec<MutationKind> = differ.diff(&doc.root()).iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![MutationKind::ResourceRemoved]);
    println!("TEST 08 — Trust flip removes resource: PASS");
}
