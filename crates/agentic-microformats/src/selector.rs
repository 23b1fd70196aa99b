//! Tag and attribute predicates used for the vocabulary lookups.
//!
//! The engine only ever asks "does this element carry `data-agent-*`
//! (with this value)?", optionally restricted to a tag. Free-form CSS is the
//! host's business; the HTML host hands it to `scraper`.

use std::borrow::Cow;

/// Read access to one element, as needed by [`AttrSelector::matches`].
pub trait ElementView {
    fn tag(&self) -> Cow<'_, str>;

    fn attribute(&self, name: &str) -> Option<Cow<'_, str>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

/// An optional tag name plus attribute presence/equality tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrSelector {
    tag: Option<String>,
    attrs: Vec<AttrTest>,
}

impl AttrSelector {
    /// Match elements carrying `name`, whatever its value.
    pub fn attr(name: &str) -> Self {
        Self::default().with_attr(name, None)
    }

    /// Match elements whose `name` attribute equals `value` exactly.
    pub fn attr_eq(name: &str, value: &str) -> Self {
        Self::default().with_attr(name, Some(value))
    }

    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_ascii_lowercase()),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: Option<&str>) -> Self {
        self.attrs.push(AttrTest {
            name: name.to_string(),
            value: value.map(str::to_string),
        });
        self
    }

    pub fn matches(&self, el: &impl ElementView) -> bool {
        if let Some(tag) = &self.tag {
            if !el.tag().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.attrs.iter().all(|test| match el.attribute(&test.name) {
            None => false,
            Some(actual) => test.value.as_deref().map_or(true, |want| actual == want),
        })
    }
}
