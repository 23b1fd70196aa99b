//! Interaction-risk classification.

use crate::coerce::parse_float_prefix;
use crate::dom::AgentNode;
use crate::types::{InteractionHints, RiskLevel, Role};
use crate::vocab;

/// Read the hint markers set directly on `node`. Nothing is inherited.
pub fn extract_hints<N: AgentNode>(node: &N) -> InteractionHints {
    let mut hints = InteractionHints {
        human_preferred: node.attr(vocab::HUMAN_PREFERRED).as_deref() == Some("true"),
        ..InteractionHints::default()
    };

    hints.role = node.attr(vocab::ROLE).and_then(|v| v.parse::<Role>().ok());
    hints.risk = node.attr(vocab::RISK).and_then(|v| v.parse::<RiskLevel>().ok());
    hints.reversible = match node.attr(vocab::REVERSIBLE).as_deref() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    };

    if let Some(cost) = node.attr(vocab::COST).as_deref().and_then(parse_float_prefix) {
        hints.cost = Some(cost);
        hints.cost_currency = node
            .attr(vocab::COST_CURRENCY)
            .filter(|c| !c.is_empty());
    }

    hints
}

/// Whether an agent must ask before running an action with these hints.
///
/// Medium risk, `reversible=true` or a zero cost alone do not qualify.
pub fn requires_confirmation(hints: &InteractionHints) -> bool {
    hints.risk == Some(RiskLevel::High)
        || hints.cost.is_some_and(|c| c > 0.0)
        || hints.reversible == Some(false)
        || hints.role == Some(Role::Danger)
}

/// Human-readable warnings for a prepared request, in a fixed order.
pub fn warnings(hints: &InteractionHints) -> Vec<String> {
    let mut out = Vec::new();
    match hints.risk {
        Some(RiskLevel::High) => out.push("High risk action".to_string()),
        Some(RiskLevel::Medium) => out.push("Medium risk action".to_string()),
        _ => {}
    }
    if hints.reversible == Some(false) {
        out.push("Irreversible action".to_string());
    }
    if hints.human_preferred {
        out.push("Human confirmation preferred".to_string());
    }
    if let Some(cost) = hints.cost.filter(|c| *c > 0.0) {
        match &hints.cost_currency {
            Some(currency) => out.push(format!("Cost: {cost} {currency}")),
            None => out.push(format!("Cost: {cost}")),
        }
    }
    if hints.role == Some(Role::Danger) {
        out.push("Danger action".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::HtmlDocument;
    use crate::selector::AttrSelector;

    fn hints_of(markup: &str) -> InteractionHints {
        let doc = HtmlDocument::parse_fragment(markup);
        let node = doc
            .root()
            .query_selector(&AttrSelector::tag("button"))
            .expect("fixture has a button");
        extract_hints(&node)
    }

    #[test]
    fn test_reads_all_markers() {
        let hints = hints_of(
            r#"<button data-agent-role="danger" data-agent-risk="high"
                data-agent-human-preferred="true" data-agent-reversible="false"
                data-agent-cost="9.99" data-agent-cost-currency="EUR">Delete</button>"#,
        );
        assert_eq!(hints.role, Some(Role::Danger));
        assert_eq!(hints.risk, Some(RiskLevel::High));
        assert!(hints.human_preferred);
        assert_eq!(hints.reversible, Some(false));
        assert_eq!(hints.cost, Some(9.99));
        assert_eq!(hints.cost_currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_invalid_values_are_unset() {
        let hints = hints_of(
            r#"<button data-agent-role="tertiary" data-agent-risk="extreme"
                data-agent-reversible="maybe" data-agent-cost="free"
                data-agent-cost-currency="EUR">Go</button>"#,
        );
        assert_eq!(hints, InteractionHints::default());
    }

    #[test]
    fn test_not_inherited_from_ancestors() {
        let hints = hints_of(r#"<div data-agent-risk="high"><button>Go</button></div>"#);
        assert_eq!(hints.risk, None);
    }

    #[test]
    fn test_requires_confirmation() {
        let yes = [
            InteractionHints {
                risk: Some(RiskLevel::High),
                ..Default::default()
            },
            InteractionHints {
                cost: Some(10.0),
                ..Default::default()
            },
            InteractionHints {
                reversible: Some(false),
                ..Default::default()
            },
            InteractionHints {
                role: Some(Role::Danger),
                ..Default::default()
            },
        ];
        for hints in &yes {
            assert!(requires_confirmation(hints), "{hints:?}");
        }

        let no = [
            InteractionHints {
                risk: Some(RiskLevel::Medium),
                ..Default::default()
            },
            InteractionHints {
                reversible: Some(true),
                ..Default::default()
            },
            InteractionHints {
                cost: Some(0.0),
                ..Default::default()
            },
            InteractionHints {
                human_preferred: true,
                ..Default::default()
            },
        ];
        for hints in &no {
            assert!(!requires_confirmation(hints), "{hints:?}");
        }
    }

    #[test]
    fn test_warning_order() {
        let hints = InteractionHints {
            role: Some(Role::Danger),
            risk: Some(RiskLevel::High),
            human_preferred: true,
            reversible: Some(false),
            cost: Some(10.0),
            cost_currency: Some("EUR".into()),
        };
        assert_eq!(
            warnings(&hints),
            vec![
                "High risk action",
                "Irreversible action",
                "Human confirmation preferred",
                "Cost: 10 EUR",
                "Danger action",
            ]
        );
        assert!(warnings(&InteractionHints::default()).is_empty());
    }
}
