//! Core data types: the extracted page model and the attribute enums.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dom::NodeKey;

/// Declares a closed string enum read from an attribute.
///
/// `FromStr` accepts only the listed spellings; callers resolve the
/// unrecognized case to a documented default at the boundary. Enums with a
/// default derive `Default` and mark the variant `#[default]`.
macro_rules! attr_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnrecognizedValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnrecognizedValue(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// An attribute value outside its closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedValue(pub String);

attr_enum! {
    /// Declared semantic type of a raw string value.
    #[derive(Default)]
    TypeHint {
        #[default]
        String => "string",
        Number => "number",
        Integer => "integer",
        Boolean => "boolean",
        Currency => "currency",
        Date => "date",
        DateTime => "datetime",
        Url => "url",
        Email => "email",
        Enum => "enum",
        Json => "json",
    }
}

attr_enum! {
    /// Visual/semantic role of an action.
    Role {
        Primary => "primary",
        Secondary => "secondary",
        Danger => "danger",
    }
}

attr_enum! {
    RiskLevel {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

attr_enum! {
    /// Trust assigned to a region of the tree.
    #[derive(Default)]
    TrustLevel {
        #[default]
        System => "system",
        Untrusted => "untrusted",
        Verified => "verified",
    }
}

attr_enum! {
    #[derive(Default)]
    HttpMethod {
        Get => "GET",
        #[default]
        Post => "POST",
        Put => "PUT",
        Patch => "PATCH",
        Delete => "DELETE",
        Head => "HEAD",
        Options => "OPTIONS",
    }
}

impl TypeHint {
    /// Missing or unknown hints mean `string`.
    pub fn resolve(attr: Option<&str>) -> Self {
        attr.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    /// Hints whose coercion is a pass-through, so a string result is expected.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            TypeHint::String
                | TypeHint::Enum
                | TypeHint::Url
                | TypeHint::Email
                | TypeHint::Date
                | TypeHint::DateTime
        )
    }
}

impl TrustLevel {
    /// Missing or unknown trust markers mean `system`.
    pub fn resolve(attr: Option<&str>) -> Self {
        attr.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl HttpMethod {
    /// Case-insensitive; missing or unknown methods mean `POST`.
    pub fn resolve(attr: Option<&str>) -> Self {
        attr.and_then(|v| v.to_ascii_uppercase().parse().ok())
            .unwrap_or_default()
    }
}

/// A typed property of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    pub raw_value: String,
    pub type_hint: TypeHint,
    /// Result of coercing `raw_value`; the raw string when coercion failed.
    pub value: Value,
    pub currency: Option<String>,
    pub element: NodeKey,
}

/// An input of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// May contain `.`-separated segments that nest the value in the body.
    pub name: String,
    pub type_hint: TypeHint,
    pub required: bool,
    pub disabled: bool,
    pub value: Option<String>,
    pub element: NodeKey,
}

/// Risk and role metadata for one action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionHints {
    pub role: Option<Role>,
    pub risk: Option<RiskLevel>,
    /// Defaults to `false`.
    pub human_preferred: bool,
    /// `None` when the marker is absent or not a literal boolean.
    pub reversible: Option<bool>,
    pub cost: Option<f64>,
    /// Only set together with `cost`.
    pub cost_currency: Option<String>,
}

/// An operation a client can invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    /// Explicit target, else the id of the nearest enclosing resource.
    pub target: Option<String>,
    pub method: HttpMethod,
    pub endpoint: Option<String>,
    pub params: Vec<Parameter>,
    /// Names listed in the comma-separated declaration attribute.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declared_params: Vec<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub description: Option<String>,
    pub hints: InteractionHints,
    pub element: NodeKey,
}

/// A semantic entity with properties, owned actions and nested resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub properties: IndexMap<String, Property>,
    pub actions: Vec<Action>,
    pub children: Vec<Resource>,
    pub element: NodeKey,
}

impl Resource {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// This resource followed by all nested resources, depth-first.
    pub fn walk(&self) -> Vec<&Resource> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    pub name: Option<String>,
    pub jurisdiction: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageDefaults {
    pub currency: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageInfo {
    #[serde(rename = "type")]
    pub page_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub requests_per_minute: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPolicies {
    pub rate_limit: Option<RateLimit>,
    pub require_auth: Option<bool>,
    pub auth_method: Option<String>,
}

/// Page-level metadata. Every section is optional; absence is never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<PageDefaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_policies: Option<AgentPolicies>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<BTreeMap<String, String>>,
}

impl PageMeta {
    pub fn is_empty(&self) -> bool {
        *self == PageMeta::default()
    }
}

/// Everything one extraction pass produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub meta: PageMeta,
    /// Top-level resources only; nested ones hang off `children`.
    pub resources: Vec<Resource>,
    /// Standalone actions only.
    pub actions: Vec<Action>,
}

/// A request descriptor ready to be sent by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedAction {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Map<String, Value>,
    pub confirmation_required: bool,
    pub warnings: Vec<String>,
}

/// Errors that can occur in the extraction engine.
///
/// Data-shape problems never surface here; they degrade to defaults.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("Observation requires a host with mutation-observation support")]
    ObservationUnsupported,

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeKey),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_resolution_falls_back() {
        assert_eq!(TypeHint::resolve(Some("integer")), TypeHint::Integer);
        assert_eq!(TypeHint::resolve(Some("INTEGER")), TypeHint::String);
        assert_eq!(TypeHint::resolve(None), TypeHint::String);
        assert_eq!(TrustLevel::resolve(Some("bogus")), TrustLevel::System);
        assert_eq!(HttpMethod::resolve(Some("delete")), HttpMethod::Delete);
        assert_eq!(HttpMethod::resolve(Some("FETCH")), HttpMethod::Post);
        assert_eq!("danger".parse::<Role>(), Ok(Role::Danger));
        assert!("critical".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_default_variants() {
        assert_eq!(TypeHint::default(), TypeHint::String);
        assert_eq!(TrustLevel::default(), TrustLevel::System);
        assert_eq!(HttpMethod::default(), HttpMethod::Post);
    }

    #[test]
    fn test_serialized_shape_is_camel_case() {
        let meta = PageMeta {
            agent_policies: Some(AgentPolicies {
                rate_limit: Some(RateLimit {
                    requests_per_minute: Some(60),
                }),
                require_auth: Some(true),
                auth_method: None,
            }),
            ..PageMeta::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["agentPolicies"]["rateLimit"]["requestsPerMinute"], 60);
        assert_eq!(json["agentPolicies"]["requireAuth"], true);
        assert!(json.get("provider").is_none());
        assert_eq!(serde_json::to_value(HttpMethod::Patch).unwrap(), "PATCH");
        assert_eq!(serde_json::to_value(TypeHint::DateTime).unwrap(), "datetime");
    }
}
