//! Integration tests for resource template resolution.

use std::sync::Arc;

use mcpmesh::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// Every handler echoes its parameters back as JSON.
fn echo_server(config: ServerConfig) -> Result<Server, McpError> {
    let server = Server::builder("files").config(config).build();
    for (template, name) in [
        ("files://{path*}", "any_file"),
        ("files://docs/{name}", "doc"),
        ("data://{id}{?format,version}", "record"),
    ] {
        server.add_template(ResourceTemplate::new(template, name), |req, _session| async move {
            Ok(ResourceContents::json(req.uri, &Value::Object(req.params)))
        })?;
    }
    server.add_resource(Resource::new("files://docs/index", "index"), |req, _session| async move {
        Ok(ResourceContents::text(req.uri, "static index"))
    })?;
    Ok(server)
}

fn params(contents: &ResourceContents) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_str(contents.text.as_deref().ok_or("no text")?)?)
}

// =============================================================================
// Precedence
// =============================================================================

#[tokio::test]
async fn test_static_resource_beats_templates() -> Result<(), Box<dyn std::error::Error>> {
    let server = echo_server(ServerConfig::default())?;
    let session = SessionContext::new(1u64);

    let contents = server.read_resource("files://docs/index", &session).await?;
    assert_eq!(contents.text.as_deref(), Some("static index"));
    Ok(())
}

#[tokio::test]
async fn test_longer_literal_prefix_wins() -> Result<(), Box<dyn std::error::Error>> {
    let server = echo_server(ServerConfig::default())?;
    let session = SessionContext::new(1u64);

    let found = server.lookup_resource("files://docs/readme").await?;
    assert_eq!(found.capability.name(), "doc");

    let contents = server.read_resource("files://docs/readme", &session).await?;
    assert_eq!(params(&contents)?, json!({"name": "readme"}));
    Ok(())
}

#[tokio::test]
async fn test_wildcard_captures_remaining_segments() -> Result<(), Box<dyn std::error::Error>> {
    let server = echo_server(ServerConfig::default())?;
    let session = SessionContext::new(1u64);

    let contents = server.read_resource("files://src/bin/main.rs", &session).await?;
    assert_eq!(params(&contents)?, json!({"path": "src/bin/main.rs"}));
    assert_eq!(contents.uri, "files://src/bin/main.rs");
    Ok(())
}

#[tokio::test]
async fn test_wildcard_requires_a_segment() -> Result<(), Box<dyn std::error::Error>> {
    let server = echo_server(ServerConfig::default())?;

    let err = server.lookup_resource("files://").await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_tied_templates_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let server = echo_server(ServerConfig::default())?;

    let err = server
        .add_template(
            ResourceTemplate::new("files://docs/{title}", "doc_by_title"),
            |req, _session| async move { Ok(ResourceContents::text(req.uri, "")) },
        )
        .unwrap_err();
    assert!(err.is_structural());
    assert!(!server.registry().contains(CapabilityKind::ResourceTemplate, "files://docs/{title}"));
    Ok(())
}

// =============================================================================
// Query parameters
// =============================================================================

#[tokio::test]
async fn test_query_params_optional() -> Result<(), Box<dyn std::error::Error>> {
    let server = echo_server(ServerConfig::default())?;
    let session = SessionContext::new(1u64);

    let contents = server.read_resource("data://42", &session).await?;
    assert_eq!(params(&contents)?, json!({"id": "42"}));

    let contents = server.read_resource("data://42?format=csv", &session).await?;
    assert_eq!(params(&contents)?, json!({"id": "42", "format": "csv"}));
    Ok(())
}

#[tokio::test]
async fn test_query_defaults_fill_missing() -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::new("reports");
    server.add_template(
        ResourceTemplate::new("report://{id}{?format}", "report").default_value("format", "json"),
        |req, _session| async move {
            Ok(ResourceContents::json(req.uri, &Value::Object(req.params)))
        },
    )?;
    let session = SessionContext::new(1u64);

    let contents = server.read_resource("report://7", &session).await?;
    assert_eq!(params(&contents)?, json!({"id": "7", "format": "json"}));

    let contents = server.read_resource("report://7?format=pdf", &session).await?;
    assert_eq!(params(&contents)?, json!({"id": "7", "format": "pdf"}));
    Ok(())
}

#[tokio::test]
async fn test_unknown_query_keys_by_policy() -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionContext::new(1u64);

    let lenient = echo_server(ServerConfig::default())?;
    let contents = lenient.read_resource("data://42?bogus=1", &session).await?;
    assert_eq!(params(&contents)?, json!({"id": "42"}));

    let strict = echo_server(ServerConfig::default().unknown_query_params(QueryPolicy::Reject))?;
    let err = strict.read_resource("data://42?bogus=1", &session).await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

// =============================================================================
// Through a mount
// =============================================================================

#[tokio::test]
async fn test_wildcard_under_mount_prefix() -> Result<(), Box<dyn std::error::Error>> {
    let child = Arc::new(Server::new("files"));
    child.add_template(ResourceTemplate::new("path://{filepath*}", "file"), |req, _session| async move {
        let path = req.param("filepath").unwrap_or_default().to_string();
        Ok(ResourceContents::text(req.uri, path))
    })?;
    let root = Server::new("root");
    root.mount("fs", child, MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let contents = root.read_resource("path://fs/a/b/c", &session).await?;
    assert_eq!(contents.text.as_deref(), Some("a/b/c"));
    assert_eq!(contents.uri, "path://fs/a/b/c");

    let listed = root.list().await?;
    assert_eq!(listed.keys(CapabilityKind::ResourceTemplate), vec!["path://fs/{filepath*}"]);
    Ok(())
}
