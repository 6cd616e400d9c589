//! Mount edges and prefix rewriting.
//!
//! A parent server attaches child providers under a prefix. Tool and prompt
//! names are qualified as `prefix_name`; resource identifiers embed the
//! prefix according to [`ResourcePrefixFormat`]:
//!
//! | format     | child identifier        | parent identifier            |
//! |------------|-------------------------|------------------------------|
//! | `Path`     | `weather://oslo/current` | `weather://wx/oslo/current`  |
//! | `Protocol` | `weather://oslo/current` | `wx+weather://oslo/current`  |

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use mcpmesh_core::error::McpError;
use mcpmesh_core::template::{QueryPolicy, UriTemplate};
use mcpmesh_core::types::{
    Capability, CapabilityKind, Prompt, Resource, ResourceTemplate, Tool,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::warn;

use crate::config::ResourcePrefixFormat;
use crate::provider::{Provider, ResourceMatch};

/// How a mounted child is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    /// Re-query the child on every call.
    #[default]
    Live,
    /// Resolve against a copy of the child's catalog taken at mount time.
    Imported,
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Imported => write!(f, "imported"),
        }
    }
}

/// One edge of the composition tree.
pub(crate) struct MountNode {
    pub(crate) prefix: String,
    pub(crate) mode: MountMode,
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) snapshot: Option<Snapshot>,
}

impl MountNode {
    pub(crate) fn live(prefix: String, provider: Arc<dyn Provider>) -> Self {
        Self {
            prefix,
            mode: MountMode::Live,
            provider,
            snapshot: None,
        }
    }

    pub(crate) fn imported(prefix: String, provider: Arc<dyn Provider>, snapshot: Snapshot) -> Self {
        Self {
            prefix,
            mode: MountMode::Imported,
            provider,
            snapshot: Some(snapshot),
        }
    }

    /// The child's descriptors, unqualified.
    pub(crate) async fn capabilities(&self) -> Result<Vec<Capability>, McpError> {
        match &self.snapshot {
            Some(snapshot) => Ok(snapshot.capabilities().to_vec()),
            None => self.provider.capabilities().await,
        }
    }

    /// Resolve a child-local tool name. `Ok(None)` when the child lacks it.
    pub(crate) async fn resolve_tool(&self, name: &str) -> Result<Option<Tool>, McpError> {
        match &self.snapshot {
            Some(snapshot) => Ok(snapshot.tool(name).cloned()),
            None => not_found_as_none(self.provider.lookup_tool(name).await),
        }
    }

    /// Resolve a child-local prompt name.
    pub(crate) async fn resolve_prompt(&self, name: &str) -> Result<Option<Prompt>, McpError> {
        match &self.snapshot {
            Some(snapshot) => Ok(snapshot.prompt(name).cloned()),
            None => not_found_as_none(self.provider.lookup_prompt(name).await),
        }
    }

    /// Resolve a child-local resource identifier.
    pub(crate) async fn resolve_resource(
        &self,
        uri: &str,
        policy: QueryPolicy,
    ) -> Result<Option<ResourceMatch>, McpError> {
        match &self.snapshot {
            Some(snapshot) => Ok(snapshot.lookup_resource(uri, policy)),
            None => not_found_as_none(self.provider.lookup_resource(uri).await),
        }
    }
}

fn not_found_as_none<T>(result: Result<T, McpError>) -> Result<Option<T>, McpError> {
    match result {
        Ok(found) => Ok(Some(found)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// A copy of a provider's catalog. Handlers are not copied: invocations
/// still forward to the provider the snapshot was taken from.
pub(crate) struct Snapshot {
    capabilities: Vec<Capability>,
    tools: IndexMap<String, Tool>,
    prompts: IndexMap<String, Prompt>,
    resources: IndexMap<String, Resource>,
    templates: Vec<(UriTemplate, ResourceTemplate)>,
}

impl Snapshot {
    pub(crate) fn new(capabilities: Vec<Capability>) -> Self {
        let mut snapshot = Self {
            capabilities: Vec::with_capacity(capabilities.len()),
            tools: IndexMap::new(),
            prompts: IndexMap::new(),
            resources: IndexMap::new(),
            templates: Vec::new(),
        };
        for capability in capabilities {
            match &capability {
                Capability::Tool(tool) => {
                    snapshot.tools.insert(tool.name.clone(), tool.clone());
                }
                Capability::Prompt(prompt) => {
                    snapshot.prompts.insert(prompt.name.clone(), prompt.clone());
                }
                Capability::Resource(resource) => {
                    snapshot
                        .resources
                        .insert(resource.uri.clone(), resource.clone());
                }
                Capability::ResourceTemplate(template) => {
                    let parsed = UriTemplate::parse(&template.uri_template)
                        .and_then(|t| t.with_defaults(template.defaults.clone()));
                    match parsed {
                        Ok(pattern) => snapshot.templates.push((pattern, template.clone())),
                        Err(err) => {
                            warn!(
                                template = %template.uri_template,
                                error = %err,
                                "skipping unparseable template in snapshot"
                            );
                            continue;
                        }
                    }
                }
            }
            snapshot.capabilities.push(capability);
        }
        snapshot
    }

    pub(crate) fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub(crate) fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub(crate) fn prompt(&self, name: &str) -> Option<&Prompt> {
        self.prompts.get(name)
    }

    pub(crate) fn lookup_resource(&self, uri: &str, policy: QueryPolicy) -> Option<ResourceMatch> {
        if let Some(resource) = self.resources.get(uri) {
            return Some(ResourceMatch {
                capability: resource.clone().into(),
                params: Map::new(),
            });
        }
        let mut best: Option<(&UriTemplate, &ResourceTemplate, Map<_, _>)> = None;
        for (pattern, template) in &self.templates {
            let Some(m) = pattern.matches(uri, policy) else {
                continue;
            };
            let better = best
                .as_ref()
                .is_none_or(|(current, _, _)| pattern.specificity() > current.specificity());
            if better {
                best = Some((pattern, template, m.into_params()));
            }
        }
        best.map(|(_, template, params)| ResourceMatch {
            capability: template.clone().into(),
            params,
        })
    }
}

// ============================================================================
// Prefix rewriting
// ============================================================================

/// `prefix_name`.
#[must_use]
pub fn qualify_name(prefix: &str, name: &str) -> String {
    format!("{prefix}_{name}")
}

/// Inverse of [`qualify_name`].
#[must_use]
pub fn strip_name<'a>(prefix: &str, name: &'a str) -> Option<&'a str> {
    name.strip_prefix(prefix)?
        .strip_prefix('_')
        .filter(|rest| !rest.is_empty())
}

/// Embed `prefix` in a resource identifier or template.
#[must_use]
pub fn qualify_uri(prefix: &str, uri: &str, format: ResourcePrefixFormat) -> String {
    match (uri.split_once("://"), format) {
        (Some((scheme, rest)), ResourcePrefixFormat::Path) => format!("{scheme}://{prefix}/{rest}"),
        (Some((scheme, rest)), ResourcePrefixFormat::Protocol) => {
            format!("{prefix}+{scheme}://{rest}")
        }
        (None, _) => format!("{prefix}/{uri}"),
    }
}

/// Inverse of [`qualify_uri`].
#[must_use]
pub fn strip_uri(prefix: &str, uri: &str, format: ResourcePrefixFormat) -> Option<String> {
    match (uri.split_once("://"), format) {
        (Some((scheme, rest)), ResourcePrefixFormat::Path) => {
            let rest = rest.strip_prefix(prefix)?.strip_prefix('/')?;
            Some(format!("{scheme}://{rest}"))
        }
        (Some((scheme, rest)), ResourcePrefixFormat::Protocol) => {
            let scheme = scheme.strip_prefix(prefix)?.strip_prefix('+')?;
            Some(format!("{scheme}://{rest}"))
        }
        (None, _) => uri
            .strip_prefix(prefix)?
            .strip_prefix('/')
            .map(str::to_string),
    }
}

/// Rewrite a child descriptor to its caller-visible key.
#[must_use]
pub fn qualify_capability(
    prefix: &str,
    capability: Capability,
    format: ResourcePrefixFormat,
) -> Capability {
    let key = match capability.kind() {
        CapabilityKind::Tool | CapabilityKind::Prompt => qualify_name(prefix, capability.key()),
        CapabilityKind::Resource | CapabilityKind::ResourceTemplate => {
            qualify_uri(prefix, capability.key(), format)
        }
    };
    capability.with_key(key)
}

/// Two mount prefixes collide when either is a string prefix of the other.
#[must_use]
pub fn prefixes_overlap(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
