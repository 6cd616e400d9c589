//! Argument validation against declared JSON Schemas.
//!
//! Validation is a collaborator of the registry: it is handed the
//! capability's schema and the raw arguments and returns the arguments a
//! handler should see. [`JsonSchemaValidator`] coerces top-level string
//! values to the scalar type their property declares before validating,
//! which is what lets `data://42?version=3` reach a handler as `version: 3`.
//!
//! Schemas are compiled once with [`SchemaValidator::compile`] and the
//! resulting [`CompiledSchema`] is reused for every invocation.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

/// Arguments were rejected by a schema.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Summary of the failure.
    pub message: String,
    /// Individual validator messages.
    pub errors: Vec<String>,
}

impl ValidationError {
    /// A failure with a single message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            errors: vec![message.clone()],
            message,
        }
    }
}

/// A schema prepared for repeated validation.
pub trait CompiledSchema: Send + Sync {
    /// Validate `arguments`, returning the arguments to pass on.
    fn validate(&self, arguments: Value) -> Result<Value, ValidationError>;
}

/// Validates (and possibly normalizes) arguments against a schema.
pub trait SchemaValidator: Send + Sync {
    /// Prepare `schema` for repeated use.
    ///
    /// A schema that cannot be compiled still yields a [`CompiledSchema`];
    /// it rejects every call with the compilation error.
    fn compile(&self, schema: &Value) -> Arc<dyn CompiledSchema>;

    /// Validate `arguments` against `schema` once.
    fn validate(&self, schema: &Value, arguments: Value) -> Result<Value, ValidationError> {
        self.compile(schema).validate(arguments)
    }
}

/// A validator that accepts everything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn compile(&self, _schema: &Value) -> Arc<dyn CompiledSchema> {
        Arc::new(PassThrough)
    }
}

struct PassThrough;

impl CompiledSchema for PassThrough {
    fn validate(&self, arguments: Value) -> Result<Value, ValidationError> {
        Ok(arguments)
    }
}

/// A validator backed by the `jsonschema` crate.
#[derive(Debug, Clone)]
pub struct JsonSchemaValidator {
    coerce_strings: bool,
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self {
            coerce_strings: true,
        }
    }
}

impl JsonSchemaValidator {
    /// A validator that coerces string arguments to declared scalar types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator that never rewrites arguments.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            coerce_strings: false,
        }
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn compile(&self, schema: &Value) -> Arc<dyn CompiledSchema> {
        Arc::new(CompiledJsonSchema {
            validator: jsonschema::validator_for(schema)
                .map_err(|e| ValidationError::new(format!("invalid schema: {e}"))),
            schema: schema.clone(),
            coerce_strings: self.coerce_strings,
        })
    }
}

struct CompiledJsonSchema {
    validator: Result<jsonschema::Validator, ValidationError>,
    schema: Value,
    coerce_strings: bool,
}

impl CompiledSchema for CompiledJsonSchema {
    fn validate(&self, arguments: Value) -> Result<Value, ValidationError> {
        let validator = self.validator.as_ref().map_err(Clone::clone)?;
        let mut arguments = if arguments.is_null() {
            Value::Object(Map::new())
        } else {
            arguments
        };
        if self.coerce_strings {
            coerce_strings(&self.schema, &mut arguments);
        }

        let errors: Vec<String> = validator
            .iter_errors(&arguments)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(arguments)
        } else {
            Err(ValidationError {
                message: errors.join("; "),
                errors,
            })
        }
    }
}

fn coerce_strings(schema: &Value, arguments: &mut Value) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let Some(object) = arguments.as_object_mut() else {
        return;
    };
    for (name, value) in object.iter_mut() {
        let Value::String(text) = value else {
            continue;
        };
        let Some(property) = properties.get(name) else {
            continue;
        };
        if let Some(coerced) = coerce_scalar(property, text) {
            *value = coerced;
        }
    }
}

fn coerce_scalar(schema: &Value, text: &str) -> Option<Value> {
    let types: Vec<&str> = match schema.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };
    if types.contains(&"string") {
        return None;
    }
    for ty in types {
        match ty {
            "integer" => {
                if let Ok(n) = text.parse::<i64>() {
                    return Some(Value::from(n));
                }
            }
            "number" => {
                if let Ok(n) = text.parse::<i64>() {
                    return Some(Value::from(n));
                }
                if let Some(n) = text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                    return Some(Value::Number(n));
                }
            }
            "boolean" => match text {
                "true" => return Some(Value::Bool(true)),
                "false" => return Some(Value::Bool(false)),
                _ => {}
            },
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "version": {"type": "integer"},
                "ratio": {"type": "number"},
                "verbose": {"type": "boolean"}
            },
            "required": ["id"]
        })
    }

    #[test]
    fn test_coerces_declared_scalars() {
        let out = JsonSchemaValidator::new()
            .validate(
                &schema(),
                json!({"id": "42", "version": "3", "ratio": "0.5", "verbose": "true"}),
            )
            .unwrap();
        assert_eq!(out, json!({"id": "42", "version": 3, "ratio": 0.5, "verbose": true}));
    }

    #[test]
    fn test_rejects_uncoercible_values() {
        let err = JsonSchemaValidator::new()
            .validate(&schema(), json!({"id": "42", "version": "three"}))
            .unwrap_err();
        assert_eq!(err.errors.len(), 1);
    }

    #[test]
    fn test_missing_required_argument() {
        let err = JsonSchemaValidator::new()
            .validate(&schema(), Value::Null)
            .unwrap_err();
        assert!(err.message.contains("id"), "{}", err.message);
    }

    #[test]
    fn test_strict_does_not_coerce() {
        assert!(
            JsonSchemaValidator::strict()
                .validate(&schema(), json!({"id": "1", "version": "3"}))
                .is_err()
        );
    }

    #[test]
    fn test_compiled_schema_is_reusable() {
        let compiled = JsonSchemaValidator::new().compile(&schema());
        assert_eq!(
            compiled.validate(json!({"id": "a", "version": "1"})).unwrap(),
            json!({"id": "a", "version": 1})
        );
        assert!(compiled.validate(json!({"version": 2})).is_err());
        assert_eq!(
            compiled.validate(json!({"id": "b"})).unwrap(),
            json!({"id": "b"})
        );
    }

    #[test]
    fn test_invalid_schema_rejects_every_call() {
        let compiled = JsonSchemaValidator::new().compile(&json!({"type": 12}));
        for _ in 0..2 {
            let err = compiled.validate(json!({})).unwrap_err();
            assert!(err.message.starts_with("invalid schema"), "{}", err.message);
        }
    }

    #[test]
    fn test_accept_all_passes_through() {
        let args = json!({"anything": [1, 2]});
        assert_eq!(AcceptAll.validate(&schema(), args.clone()).unwrap(), args);
    }
}
