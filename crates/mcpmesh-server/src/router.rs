//! Request routing at the wire-shape boundary.
//!
//! [`dispatch`] maps a protocol method and its JSON parameters onto a
//! [`Provider`] and renders the result in the shape a protocol peer
//! expects. Errors keep their [`McpError`] form so the caller can derive a
//! JSON-RPC code with [`McpError::code`].
//!
//! # Method Categories
//!
//! - **Tools**: `tools/list`, `tools/call`
//! - **Resources**: `resources/list`, `resources/templates/list`, `resources/read`
//! - **Prompts**: `prompts/list`, `prompts/get`
//! - **Health**: `ping`

use mcpmesh_core::error::McpError;
use mcpmesh_core::protocol::RequestId;
use mcpmesh_core::types::{Capability, CapabilityKind};
use serde_json::{Map, Value, json};

use crate::context::SessionContext;
use crate::provider::Provider;
use crate::proxy::{RemoteEvent, RemoteEventKind};
use crate::sink::{LogLevel, LogRecord, ProgressUpdate};

/// Protocol method names.
pub mod methods {
    /// Ping to check if the connection is alive.
    pub const PING: &str = "ping";

    /// List available tools.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Call a specific tool with arguments.
    pub const TOOLS_CALL: &str = "tools/call";

    /// List available resources.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// List available resource templates.
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    /// Read the contents of a resource.
    pub const RESOURCES_READ: &str = "resources/read";

    /// List available prompts.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Get a specific prompt with arguments.
    pub const PROMPTS_GET: &str = "prompts/get";
}

/// Protocol notification names.
pub mod notifications {
    /// Sent when a request is cancelled.
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Sent to report progress on a long-running operation.
    pub const PROGRESS: &str = "notifications/progress";
    /// Sent to deliver a log message.
    pub const MESSAGE: &str = "notifications/message";
    /// Sent when the list of available tools has changed.
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    /// Sent when the list of available resources has changed.
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    /// Sent when the list of available prompts has changed.
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
}

/// Entries per page of a list result.
pub const PAGE_SIZE: usize = 100;

/// A parsed request with typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRequest {
    /// `ping`
    Ping,
    /// A list method for one capability kind.
    List {
        /// Which kind is listed.
        kind: CapabilityKind,
        /// Pagination cursor.
        cursor: Option<String>,
    },
    /// `tools/call`
    CallTool {
        /// Tool name.
        name: String,
        /// Tool arguments.
        arguments: Value,
    },
    /// `resources/read`
    ReadResource {
        /// Resource identifier.
        uri: String,
    },
    /// `prompts/get`
    GetPrompt {
        /// Prompt name.
        name: String,
        /// Prompt arguments.
        arguments: Map<String, Value>,
    },
}

/// The list method for a capability kind.
#[must_use]
pub fn list_method(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => methods::TOOLS_LIST,
        CapabilityKind::Resource => methods::RESOURCES_LIST,
        CapabilityKind::ResourceTemplate => methods::RESOURCES_TEMPLATES_LIST,
        CapabilityKind::Prompt => methods::PROMPTS_LIST,
    }
}

/// The field holding the entries of a list result.
#[must_use]
pub fn list_field(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => "tools",
        CapabilityKind::Resource => "resources",
        CapabilityKind::ResourceTemplate => "resourceTemplates",
        CapabilityKind::Prompt => "prompts",
    }
}

/// Parse a request into a typed representation.
pub fn parse_request(method: &str, params: &Value) -> Result<ParsedRequest, McpError> {
    let cursor = || {
        params
            .get("cursor")
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match method {
        methods::PING => Ok(ParsedRequest::Ping),
        methods::TOOLS_LIST => Ok(ParsedRequest::List {
            kind: CapabilityKind::Tool,
            cursor: cursor(),
        }),
        methods::RESOURCES_LIST => Ok(ParsedRequest::List {
            kind: CapabilityKind::Resource,
            cursor: cursor(),
        }),
        methods::RESOURCES_TEMPLATES_LIST => Ok(ParsedRequest::List {
            kind: CapabilityKind::ResourceTemplate,
            cursor: cursor(),
        }),
        methods::PROMPTS_LIST => Ok(ParsedRequest::List {
            kind: CapabilityKind::Prompt,
            cursor: cursor(),
        }),
        methods::TOOLS_CALL => Ok(ParsedRequest::CallTool {
            name: required_str(method, params, "name")?,
            arguments: params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        }),
        methods::RESOURCES_READ => Ok(ParsedRequest::ReadResource {
            uri: required_str(method, params, "uri")?,
        }),
        methods::PROMPTS_GET => {
            let arguments = match params.get("arguments") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map.clone(),
                Some(_) => {
                    return Err(McpError::invalid_request(format!(
                        "{method}: arguments must be an object"
                    )));
                }
            };
            Ok(ParsedRequest::GetPrompt {
                name: required_str(method, params, "name")?,
                arguments,
            })
        }
        other => Err(McpError::method_not_found(other)),
    }
}

fn required_str(method: &str, params: &Value, field: &str) -> Result<String, McpError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| McpError::invalid_request(format!("{method}: missing {field}")))
}

/// Route a request to `provider` and render the result.
pub async fn dispatch(
    provider: &dyn Provider,
    method: &str,
    params: Value,
    session: &SessionContext,
) -> Result<Value, McpError> {
    match parse_request(method, &params)? {
        ParsedRequest::Ping => Ok(json!({})),
        ParsedRequest::List { kind, cursor } => {
            let all: Vec<Capability> = provider
                .capabilities()
                .await?
                .into_iter()
                .filter(|c| c.kind() == kind)
                .collect();
            list_page(kind, all, cursor.as_deref())
        }
        ParsedRequest::CallTool { name, arguments } => {
            let output = provider.call_tool(&name, arguments, session).await?;
            Ok(serde_json::to_value(output)?)
        }
        ParsedRequest::ReadResource { uri } => {
            let contents = provider.read_resource(&uri, session).await?;
            Ok(json!({ "contents": [contents] }))
        }
        ParsedRequest::GetPrompt { name, arguments } => {
            let result = provider.get_prompt(&name, arguments, session).await?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

fn list_page(
    kind: CapabilityKind,
    all: Vec<Capability>,
    cursor: Option<&str>,
) -> Result<Value, McpError> {
    let start = match cursor {
        Some(cursor) => cursor
            .parse::<usize>()
            .map_err(|_| McpError::invalid_request(format!("invalid cursor '{cursor}'")))?,
        None => 0,
    };
    let total = all.len();
    let end = total.min(start.saturating_add(PAGE_SIZE));
    let page = all
        .into_iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .map(|c| match c {
            Capability::Tool(t) => serde_json::to_value(t),
            Capability::Resource(r) => serde_json::to_value(r),
            Capability::ResourceTemplate(t) => serde_json::to_value(t),
            Capability::Prompt(p) => serde_json::to_value(p),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Map::new();
    let more = end < total;
    result.insert(list_field(kind).to_string(), Value::Array(page));
    if more {
        result.insert("nextCursor".to_string(), Value::String(end.to_string()));
    }
    Ok(Value::Object(result))
}

// ============================================================================
// Notifications
// ============================================================================

/// The list-changed notification for a capability kind.
#[must_use]
pub fn list_changed_notification(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => notifications::TOOLS_LIST_CHANGED,
        CapabilityKind::Resource | CapabilityKind::ResourceTemplate => {
            notifications::RESOURCES_LIST_CHANGED
        }
        CapabilityKind::Prompt => notifications::PROMPTS_LIST_CHANGED,
    }
}

/// Render a progress notification.
#[must_use]
pub fn progress_notification(token: &RequestId, update: &ProgressUpdate) -> (&'static str, Value) {
    let mut params = json!({
        "progressToken": token,
        "progress": update.progress,
    });
    if let Some(total) = update.total {
        params["total"] = json!(total);
    }
    if let Some(message) = &update.message {
        params["message"] = json!(message);
    }
    (notifications::PROGRESS, params)
}

/// Render a log notification correlated with `request_id`.
#[must_use]
pub fn log_notification(request_id: &RequestId, record: &LogRecord) -> (&'static str, Value) {
    let mut data = json!({ "message": record.message });
    if let Some(extra) = &record.data {
        data["data"] = extra.clone();
    }
    let mut params = json!({
        "level": record.level,
        "data": data,
        "_meta": { "requestId": request_id },
    });
    if let Some(logger) = &record.logger {
        params["logger"] = json!(logger);
    }
    (notifications::MESSAGE, params)
}

/// Parse a notification into a remote event.
///
/// Returns `Ok(None)` for notifications that carry no event, such as
/// cancellation acknowledgements.
pub fn parse_notification(method: &str, params: &Value) -> Result<Option<RemoteEvent>, McpError> {
    let event = match method {
        notifications::PROGRESS => {
            let token: RequestId = params
                .get("progressToken")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .ok_or_else(|| McpError::invalid_request("progress without progressToken"))?;
            let progress = params
                .get("progress")
                .and_then(Value::as_f64)
                .ok_or_else(|| McpError::invalid_request("progress without a value"))?;
            let update = ProgressUpdate::new(
                progress,
                params.get("total").and_then(Value::as_f64),
                params
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            );
            RemoteEvent::progress(token, update)
        }
        notifications::MESSAGE => {
            let level: LogLevel = params
                .get("level")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default();
            let data = params.get("data").cloned().unwrap_or(Value::Null);
            let (message, extra) = match data {
                Value::String(message) => (message, None),
                Value::Object(mut map) => match map.remove("message") {
                    Some(Value::String(message)) => (message, map.remove("data")),
                    Some(other) => (other.to_string(), map.remove("data")),
                    None => (Value::Object(map).to_string(), None),
                },
                other => (other.to_string(), None),
            };
            let mut record = LogRecord::new(level, message);
            if let Some(logger) = params.get("logger").and_then(Value::as_str) {
                record = record.with_logger(logger);
            }
            if let Some(extra) = extra {
                record = record.with_data(extra);
            }
            let request_id: Option<RequestId> = params
                .pointer("/_meta/requestId")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?;
            RemoteEvent {
                request_id,
                kind: RemoteEventKind::Log(record),
            }
        }
        notifications::TOOLS_LIST_CHANGED => RemoteEvent::list_changed(CapabilityKind::Tool),
        notifications::RESOURCES_LIST_CHANGED => {
            RemoteEvent::list_changed(CapabilityKind::Resource)
        }
        notifications::PROMPTS_LIST_CHANGED => RemoteEvent::list_changed(CapabilityKind::Prompt),
        notifications::CANCELLED => return Ok(None),
        other => return Err(McpError::method_not_found(other)),
    };
    Ok(Some(event))
}
