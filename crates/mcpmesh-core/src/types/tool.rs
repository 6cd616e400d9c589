//! Tool descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::capability::{Annotations, Tags};
use super::content::Content;

/// A tool definition.
///
/// # Example
///
/// ```rust
/// use mcpmesh_core::types::Tool;
///
/// let tool = Tool::new("search")
///     .description("Search the database")
///     .with_string_param("query", "What to look for", true)
///     .read_only(true);
/// assert!(tool.annotations.read_only());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique name of the tool within its provider.
    pub name: String,
    /// Human-readable description of what the tool does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema defining the tool's input parameters.
    pub input_schema: Value,
    /// JSON Schema of the structured output, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    /// Behavior hints.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl Tool {
    /// Create a new tool with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            output_schema: None,
            tags: Tags::new(),
            annotations: Annotations::default(),
        }
    }

    /// Set the tool's description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the tool's input schema.
    #[must_use]
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the tool's output schema.
    #[must_use]
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set an annotation.
    #[must_use]
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(key, value);
        self
    }

    /// Set the read-only hint.
    #[must_use]
    pub fn read_only(self, read_only: bool) -> Self {
        self.annotation(Annotations::READ_ONLY, read_only)
    }

    /// Set the idempotent hint.
    #[must_use]
    pub fn idempotent(self, idempotent: bool) -> Self {
        self.annotation(Annotations::IDEMPOTENT, idempotent)
    }

    /// Set the destructive hint.
    #[must_use]
    pub fn destructive(self, destructive: bool) -> Self {
        self.annotation(Annotations::DESTRUCTIVE, destructive)
    }

    /// Add a string parameter to the input schema.
    #[must_use]
    pub fn with_string_param(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.with_param(name.into(), "string", description.into(), required)
    }

    /// Add a number parameter to the input schema.
    #[must_use]
    pub fn with_number_param(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.with_param(name.into(), "number", description.into(), required)
    }

    /// Add an integer parameter to the input schema.
    #[must_use]
    pub fn with_integer_param(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.with_param(name.into(), "integer", description.into(), required)
    }

    /// Add a boolean parameter to the input schema.
    #[must_use]
    pub fn with_boolean_param(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.with_param(name.into(), "boolean", description.into(), required)
    }

    fn with_param(mut self, name: String, ty: &str, description: String, required: bool) -> Self {
        if !self.input_schema.is_object() {
            self.input_schema = serde_json::json!({"type": "object"});
        }
        if self.input_schema.get("properties").is_none() {
            self.input_schema["properties"] = serde_json::json!({});
        }
        self.input_schema["properties"][&name] = serde_json::json!({
            "type": ty,
            "description": description
        });
        if required {
            match self.input_schema.get_mut("required").and_then(Value::as_array_mut) {
                Some(list) => list.push(Value::String(name)),
                None => self.input_schema["required"] = serde_json::json!([name]),
            }
        }
        self
    }
}

/// The result of calling a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Content blocks.
    #[serde(default)]
    pub content: Vec<Content>,
    /// Structured result matching the output schema, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the tool reports a recoverable error to the caller.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolOutput {
    /// A single text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            ..Self::default()
        }
    }

    /// A structured result, mirrored as a JSON text block.
    #[must_use]
    pub fn json(value: Value) -> Self {
        Self {
            content: vec![Content::text(value.to_string())],
            structured_content: Some(value),
            is_error: false,
        }
    }

    /// A recoverable error the caller can correct by changing its input.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            structured_content: None,
            is_error: true,
        }
    }

    /// The first text block, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(Content::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_tool_serializes_with_mcp_names() {
        let tool = Tool::new("get_forecast")
            .description("Forecast for a city")
            .with_string_param("city", "City name", true)
            .tag("weather")
            .read_only(true);

        assert_eq!(
            serde_json::to_value(&tool).unwrap(),
            json!({
                "name": "get_forecast",
                "description": "Forecast for a city",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "city": {"type": "string", "description": "City name"}
                    },
                    "required": ["city"]
                },
                "tags": ["weather"],
                "annotations": {"readOnlyHint": true}
            })
        );
    }

    #[test]
    fn test_tool_deserializes_minimal_descriptor() {
        let tool: Tool =
            serde_json::from_value(json!({"name": "ping", "inputSchema": {"type": "object"}}))
                .unwrap();
        assert_eq!(tool.name, "ping");
        assert!(tool.tags.is_empty());
        assert!(tool.annotations.is_empty());
    }

    #[test]
    fn test_tool_output_helpers() {
        let out = ToolOutput::json(json!({"temp": 21}));
        assert_eq!(out.first_text(), Some("{\"temp\":21}"));
        assert!(!out.is_error);
        assert!(ToolOutput::error("nope").is_error);
    }
}
