//! The attribute vocabulary. These names are the wire format and must not
//! change.

use std::sync::OnceLock;

use crate::selector::AttrSelector;

pub const AGENT: &str = "data-agent";
pub const RESOURCE: &str = "resource";
pub const ACTION: &str = "action";

pub const TYPE: &str = "data-agent-type";
pub const ID: &str = "data-agent-id";
pub const PROP: &str = "data-agent-prop";
pub const VALUE: &str = "data-agent-value";
pub const TYPEHINT: &str = "data-agent-typehint";
pub const CURRENCY: &str = "data-agent-currency";

pub const NAME: &str = "data-agent-name";
pub const TARGET: &str = "data-agent-target";
pub const METHOD: &str = "data-agent-method";
pub const ENDPOINT: &str = "data-agent-endpoint";
pub const HEADERS: &str = "data-agent-headers";
pub const DESCRIPTION: &str = "data-agent-description";
pub const PARAMS: &str = "data-agent-params";

pub const ROLE: &str = "data-agent-role";
pub const RISK: &str = "data-agent-risk";
pub const HUMAN_PREFERRED: &str = "data-agent-human-preferred";
pub const REVERSIBLE: &str = "data-agent-reversible";
pub const COST: &str = "data-agent-cost";
pub const COST_CURRENCY: &str = "data-agent-cost-currency";

pub const TRUST: &str = "data-agent-trust";
pub const IGNORE: &str = "data-agent-ignore";

pub const PARAM: &str = "data-agent-param";
pub const REQUIRED: &str = "data-agent-required";

pub const META: &str = "data-agent-meta";

// Native attributes the engine reads.
pub const NATIVE_REQUIRED: &str = "required";
pub const NATIVE_DISABLED: &str = "disabled";
pub const NATIVE_VALUE: &str = "value";
pub const ARIA_REQUIRED: &str = "aria-required";
pub const ARIA_LABEL: &str = "aria-label";
pub const TITLE: &str = "title";

/// Attribute changes outside this list do not start a diff round.
pub const OBSERVED_ATTRIBUTES: &[&str] = &[
    AGENT,
    TYPE,
    ID,
    PROP,
    VALUE,
    TYPEHINT,
    NAME,
    TARGET,
    METHOD,
    ENDPOINT,
    ROLE,
    RISK,
    HUMAN_PREFERRED,
    REVERSIBLE,
    COST,
    TRUST,
    IGNORE,
    NATIVE_DISABLED,
    NATIVE_VALUE,
    NATIVE_REQUIRED,
];

pub fn resource_selector() -> &'static AttrSelector {
    static SEL: OnceLock<AttrSelector> = OnceLock::new();
    SEL.get_or_init(|| AttrSelector::attr_eq(AGENT, RESOURCE))
}

pub fn action_selector() -> &'static AttrSelector {
    static SEL: OnceLock<AttrSelector> = OnceLock::new();
    SEL.get_or_init(|| AttrSelector::attr_eq(AGENT, ACTION))
}

pub fn property_selector() -> &'static AttrSelector {
    static SEL: OnceLock<AttrSelector> = OnceLock::new();
    SEL.get_or_init(|| AttrSelector::attr(PROP))
}

pub fn param_selector() -> &'static AttrSelector {
    static SEL: OnceLock<AttrSelector> = OnceLock::new();
    SEL.get_or_init(|| AttrSelector::attr(PARAM))
}

pub fn trust_selector() -> &'static AttrSelector {
    static SEL: OnceLock<AttrSelector> = OnceLock::new();
    SEL.get_or_init(|| AttrSelector::attr(TRUST))
}

pub fn ignore_selector() -> &'static AttrSelector {
    static SEL: OnceLock<AttrSelector> = OnceLock::new();
    SEL.get_or_init(|| AttrSelector::attr(IGNORE))
}

pub fn meta_selector() -> &'static AttrSelector {
    static SEL: OnceLock<AttrSelector> = OnceLock::new();
    SEL.get_or_init(|| AttrSelector::tag("script").with_attr(META, None))
}
