//! Action parameters and nested request bodies.

use serde_json::{Map, Value};

use crate::coerce::coerce_value;
use crate::dom::AgentNode;
use crate::selector::AttrSelector;
use crate::trust;
use crate::types::{Parameter, TypeHint};
use crate::vocab;

/// Parameter-marked descendants of `action`, in document order.
///
/// Parameters inside an untrusted or ignored region are left out.
pub fn extract_parameters<N: AgentNode>(action: &N) -> Vec<Parameter> {
    action
        .query_selector_all(vocab::param_selector())
        .into_iter()
        .filter_map(|node| {
            let name = node.attr(vocab::PARAM).filter(|n| !n.is_empty())?;
            if trust::should_skip(&node) {
                tracing::trace!("Skipping parameter '{name}' in untrusted region");
                return None;
            }
            Some(Parameter {
                type_hint: TypeHint::resolve(node.attr(vocab::TYPEHINT).as_deref()),
                required: node.has_attr(vocab::NATIVE_REQUIRED)
                    || node.attr(vocab::REQUIRED).as_deref() == Some("true")
                    || node.attr(vocab::ARIA_REQUIRED).as_deref() == Some("true"),
                disabled: node.has_attr(vocab::NATIVE_DISABLED),
                value: input_value(&node),
                element: node.key(),
                name,
            })
        })
        .collect()
}

/// Current value of an input-like node.
///
/// Selection lists yield the selected option (or the first one), checkboxes
/// yield `"true"`/`"false"`, everything else its `value` attribute.
pub fn input_value<N: AgentNode>(node: &N) -> Option<String> {
    if node.tag_name().eq_ignore_ascii_case("select") {
        let option = AttrSelector::tag("option");
        let selected = option.clone().with_attr("selected", None);
        return node
            .query_selector(&selected)
            .or_else(|| node.query_selector(&option))
            .map(|opt| opt.attr(vocab::NATIVE_VALUE).unwrap_or_else(|| opt.text_content()));
    }

    let is_checkbox = node
        .attr("type")
        .is_some_and(|t| t.eq_ignore_ascii_case("checkbox"));
    if is_checkbox {
        let checked = if node.has_attr("checked") { "true" } else { "false" };
        return Some(checked.to_string());
    }

    node.attr(vocab::NATIVE_VALUE)
}

/// Assemble a nested body from dotted parameter names.
///
/// Disabled and valueless parameters are skipped. When an earlier parameter
/// left a plain value where a later one needs an object, the later one wins
/// and replaces it with a fresh object.
pub fn build_nested_params(params: &[Parameter]) -> Map<String, Value> {
    let mut body = Map::new();

    for param in params {
        if param.disabled {
            continue;
        }
        let Some(raw) = param.value.as_deref() else {
            continue;
        };
        let coerced = coerce_value(raw, param.type_hint);

        let mut segments: Vec<&str> = param.name.split('.').collect();
        let leaf = segments.pop().unwrap_or_default();
        let mut current = Some(&mut body);
        for segment in segments {
            current = current.and_then(|map| {
                let slot = map
                    .entry(segment.to_string())
                    .and_modify(|v| {
                        if !v.is_object() {
                            *v = Value::Object(Map::new());
                        }
                    })
                    .or_insert_with(|| Value::Object(Map::new()));
                match slot {
                    Value::Object(inner) => Some(inner),
                    _ => None,
                }
            });
        }
        if let Some(map) = current {
            map.insert(leaf.to_string(), coerced);
        }
    }

    body
}
