//! The capability sum type and its handler-free listing projection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::prompt::Prompt;
use super::resource::{Resource, ResourceTemplate};
use super::tool::Tool;

/// Free-form capability tags, kept sorted.
pub type Tags = BTreeSet<String>;

/// Key/value behavior hints attached to a capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(BTreeMap<String, Value>);

impl Annotations {
    /// Human-readable title.
    pub const TITLE: &'static str = "title";
    /// The capability has no side effects.
    pub const READ_ONLY: &'static str = "readOnlyHint";
    /// Repeated calls with the same input yield the same result.
    pub const IDEMPOTENT: &'static str = "idempotentHint";
    /// The capability may destroy data.
    pub const DESTRUCTIVE: &'static str = "destructiveHint";
    /// The capability reaches outside the server.
    pub const OPEN_WORLD: &'static str = "openWorldHint";

    /// Insert or replace a hint.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a hint.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether no hints are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate hints in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// The read-only hint, false when absent.
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.flag(Self::READ_ONLY)
    }

    /// The idempotent hint, false when absent.
    #[must_use]
    pub fn idempotent(&self) -> bool {
        self.flag(Self::IDEMPOTENT)
    }

    /// The destructive hint, false when absent.
    #[must_use]
    pub fn destructive(&self) -> bool {
        self.flag(Self::DESTRUCTIVE)
    }

    /// The title hint.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.0.get(Self::TITLE).and_then(Value::as_str)
    }
}

/// The four kinds of capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// A callable tool.
    Tool,
    /// A static resource.
    Resource,
    /// A resource template.
    ResourceTemplate,
    /// A prompt.
    Prompt,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Resource => write!(f, "resource"),
            Self::ResourceTemplate => write!(f, "resource template"),
            Self::Prompt => write!(f, "prompt"),
        }
    }
}

/// A capability descriptor of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Capability {
    /// A tool.
    Tool(Tool),
    /// A static resource.
    Resource(Resource),
    /// A resource template.
    ResourceTemplate(ResourceTemplate),
    /// A prompt.
    Prompt(Prompt),
}

impl Capability {
    /// The capability kind.
    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Tool(_) => CapabilityKind::Tool,
            Self::Resource(_) => CapabilityKind::Resource,
            Self::ResourceTemplate(_) => CapabilityKind::ResourceTemplate,
            Self::Prompt(_) => CapabilityKind::Prompt,
        }
    }

    /// The lookup key: tool/prompt name, resource identifier or template text.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Tool(t) => &t.name,
            Self::Resource(r) => &r.uri,
            Self::ResourceTemplate(t) => &t.uri_template,
            Self::Prompt(p) => &p.name,
        }
    }

    /// The display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Tool(t) => &t.name,
            Self::Resource(r) => &r.name,
            Self::ResourceTemplate(t) => &t.name,
            Self::Prompt(p) => &p.name,
        }
    }

    /// The description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Tool(t) => t.description.as_deref(),
            Self::Resource(r) => r.description.as_deref(),
            Self::ResourceTemplate(t) => t.description.as_deref(),
            Self::Prompt(p) => p.description.as_deref(),
        }
    }

    /// The tags.
    #[must_use]
    pub fn tags(&self) -> &Tags {
        match self {
            Self::Tool(t) => &t.tags,
            Self::Resource(r) => &r.tags,
            Self::ResourceTemplate(t) => &t.tags,
            Self::Prompt(p) => &p.tags,
        }
    }

    /// The annotations.
    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        match self {
            Self::Tool(t) => &t.annotations,
            Self::Resource(r) => &r.annotations,
            Self::ResourceTemplate(t) => &t.annotations,
            Self::Prompt(p) => &p.annotations,
        }
    }

    /// Replace the lookup key, keeping every other field.
    #[must_use]
    pub fn with_key(mut self, key: String) -> Self {
        match &mut self {
            Self::Tool(t) => t.name = key,
            Self::Resource(r) => r.uri = key,
            Self::ResourceTemplate(t) => t.uri_template = key,
            Self::Prompt(p) => p.name = key,
        }
        self
    }

    /// The handler-free projection used for listings.
    #[must_use]
    pub fn summary(&self) -> CapabilitySummary {
        CapabilitySummary {
            kind: self.kind(),
            key: self.key().to_string(),
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            tags: self.tags().clone(),
            annotations: self.annotations().clone(),
        }
    }
}

impl From<Tool> for Capability {
    fn from(tool: Tool) -> Self {
        Self::Tool(tool)
    }
}

impl From<Resource> for Capability {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<ResourceTemplate> for Capability {
    fn from(template: ResourceTemplate) -> Self {
        Self::ResourceTemplate(template)
    }
}

impl From<Prompt> for Capability {
    fn from(prompt: Prompt) -> Self {
        Self::Prompt(prompt)
    }
}

/// Metadata of one listed capability, without its handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySummary {
    /// The capability kind.
    pub kind: CapabilityKind,
    /// Lookup key (qualified when listed through a mount).
    pub key: String,
    /// Display name.
    pub name: String,
    /// Description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    /// Annotations.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

/// A restartable listing of capabilities.
///
/// Clones share the same backing slice; every call to [`iter`](Self::iter)
/// starts over from the first entry.
#[derive(Debug, Clone, Default)]
pub struct CapabilityList {
    items: Arc<[Capability]>,
}

impl CapabilityList {
    /// Iterate summaries in listing order.
    pub fn iter(&self) -> impl Iterator<Item = CapabilitySummary> + '_ {
        self.items.iter().map(Capability::summary)
    }

    /// The full descriptors in listing order.
    #[must_use]
    pub fn descriptors(&self) -> &[Capability] {
        &self.items
    }

    /// Number of listed capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the listing is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys of the listed capabilities of one kind, in order.
    #[must_use]
    pub fn keys(&self, kind: CapabilityKind) -> Vec<&str> {
        self.items
            .iter()
            .filter(|c| c.kind() == kind)
            .map(Capability::key)
            .collect()
    }

    /// The listed tools.
    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.items.iter().filter_map(|c| match c {
            Capability::Tool(t) => Some(t),
            _ => None,
        })
    }

    /// The listed static resources.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.items.iter().filter_map(|c| match c {
            Capability::Resource(r) => Some(r),
            _ => None,
        })
    }

    /// The listed resource templates.
    pub fn templates(&self) -> impl Iterator<Item = &ResourceTemplate> {
        self.items.iter().filter_map(|c| match c {
            Capability::ResourceTemplate(t) => Some(t),
            _ => None,
        })
    }

    /// The listed prompts.
    pub fn prompts(&self) -> impl Iterator<Item = &Prompt> {
        self.items.iter().filter_map(|c| match c {
            Capability::Prompt(p) => Some(p),
            _ => None,
        })
    }
}

impl From<Vec<Capability>> for CapabilityList {
    fn from(items: Vec<Capability>) -> Self {
        Self {
            items: items.into(),
        }
    }
}
