//! Integration tests for mounting servers under prefixes.
//!
//! These tests verify:
//! - Prefixed names and identifiers route to the mounted child
//! - Live mounts see child changes, imported mounts see a snapshot
//! - Invalid mounts leave the mount table untouched
//! - Errors surface under the caller-visible name and parent masking

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mcpmesh::prelude::*;
use mcpmesh_testing::fixtures::{search_server, weather_server};
use mcpmesh_testing::{assert_handler_error, assert_tool_text, recording_session};
use pretty_assertions::assert_eq;
use serde_json::{Map, json};

fn echo_tool(server: &Server, name: &str, reply: &'static str) -> Result<(), McpError> {
    server.add_tool(Tool::new(name), move |_args, _session| async move {
        Ok(ToolOutput::text(reply))
    })
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test]
async fn test_mounted_capabilities_are_namespaced() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("weather", weather_server(), MountMode::Live).await?;
    let (session, sink) = recording_session(7u64);

    let out = root
        .call_tool("weather_get_forecast", json!({"city": "Lima"}), &session)
        .await?;
    assert_tool_text(&out, "Lima");
    assert_eq!(sink.progress().len(), 2);

    let contents = root
        .read_resource("weather://weather/Lima/current", &session)
        .await?;
    assert_eq!(contents.uri, "weather://weather/Lima/current");

    let mut args = Map::new();
    args.insert("city".to_string(), json!("Lima"));
    let prompt = root
        .get_prompt("weather_forecast_summary", args, &session)
        .await?;
    assert_eq!(prompt.messages.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unprefixed_child_names_not_visible() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("weather", weather_server(), MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let err = root
        .call_tool("get_forecast", json!({"city": "Lima"}), &session)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = root
        .read_resource("weather://Lima/current", &session)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_siblings_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
    let left = Arc::new(Server::new("left"));
    let right = Arc::new(Server::new("right"));
    echo_tool(&left, "hello", "from left")?;
    echo_tool(&right, "hello", "from right")?;

    let root = Server::new("root");
    root.mount("left", left, MountMode::Live).await?;
    root.mount("right", right, MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let out = root.call_tool("left_hello", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("from left"));
    let out = root.call_tool("right_hello", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("from right"));

    let listed = root.list().await?;
    assert_eq!(listed.keys(CapabilityKind::Tool), vec!["left_hello", "right_hello"]);
    Ok(())
}

#[tokio::test]
async fn test_nested_mounts_stack_prefixes() -> Result<(), Box<dyn std::error::Error>> {
    let middle = Arc::new(Server::new("middle"));
    middle.mount("weather", weather_server(), MountMode::Live).await?;
    let root = Server::new("root");
    root.mount("eu", middle, MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let out = root
        .call_tool("eu_weather_get_forecast", json!({"city": "Rome"}), &session)
        .await?;
    assert_tool_text(&out, "Rome");

    let contents = root
        .read_resource("weather://eu/weather/Rome/current", &session)
        .await?;
    assert_eq!(contents.uri, "weather://eu/weather/Rome/current");
    Ok(())
}

#[tokio::test]
async fn test_protocol_prefix_format() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::builder("root")
        .config(ServerConfig::default().resource_prefix_format(ResourcePrefixFormat::Protocol))
        .build();
    root.mount("search", search_server(), MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let listed = root.list().await?;
    assert!(
        listed
            .keys(CapabilityKind::ResourceTemplate)
            .contains(&"search+search://web/{query}")
    );

    let contents = root.read_resource("search+search://web/rust", &session).await?;
    assert_eq!(contents.uri, "search+search://web/rust");
    Ok(())
}

#[tokio::test]
async fn test_mounted_static_resource_beats_local_template() -> Result<(), Box<dyn std::error::Error>> {
    let child = Arc::new(Server::new("child"));
    child.add_resource(Resource::new("a://p/b", "pinned"), |req, _session| async move {
        Ok(ResourceContents::text(req.uri, "child static"))
    })?;
    let root = Server::new("root");
    root.add_template(ResourceTemplate::new("a://{x}/{y}/{z}", "catch_all"), |req, _session| async move {
        Ok(ResourceContents::text(req.uri, "root template"))
    })?;
    root.mount("m", child, MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let found = root.lookup_resource("a://m/p/b").await?;
    assert_eq!(found.capability.kind(), CapabilityKind::Resource);
    assert_eq!(found.capability.key(), "a://m/p/b");

    let contents = root.read_resource("a://m/p/b", &session).await?;
    assert_eq!(contents.text.as_deref(), Some("child static"));

    // Nothing in the child answers this one.
    let contents = root.read_resource("a://m/p/q", &session).await?;
    assert_eq!(contents.text.as_deref(), Some("root template"));
    Ok(())
}

// =============================================================================
// Live and imported mounts
// =============================================================================

#[tokio::test]
async fn test_live_mount_sees_later_registrations() -> Result<(), Box<dyn std::error::Error>> {
    let child = Arc::new(Server::new("child"));
    let root = Server::new("root");
    root.mount("kid", child.clone(), MountMode::Live).await?;

    echo_tool(&child, "late", "here")?;
    let session = SessionContext::new(1u64);
    let out = root.call_tool("kid_late", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("here"));
    Ok(())
}

#[tokio::test]
async fn test_imported_mount_is_a_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let child = Arc::new(Server::new("child"));
    echo_tool(&child, "early", "before")?;
    let root = Server::new("root");
    root.mount("kid", child.clone(), MountMode::Imported).await?;

    echo_tool(&child, "late", "after")?;
    let session = SessionContext::new(1u64);

    let out = root.call_tool("kid_early", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("before"));
    let err = root.call_tool("kid_late", json!({}), &session).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(root.list().await?.keys(CapabilityKind::Tool), vec!["kid_early"]);

    root.reimport("kid").await?;
    let out = root.call_tool("kid_late", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("after"));
    assert_eq!(
        root.list().await?.keys(CapabilityKind::Tool),
        vec!["kid_early", "kid_late"]
    );
    Ok(())
}

#[tokio::test]
async fn test_unmount_removes_namespace() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("weather", weather_server(), MountMode::Live).await?;
    let detached = root.unmount("weather").await?;
    assert_eq!(detached.name(), "weather");
    assert!(root.mounts().is_empty());

    let session = SessionContext::new(1u64);
    let err = root
        .call_tool("weather_get_forecast", json!({"city": "Oslo"}), &session)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = root.unmount("weather").await.unwrap_err();
    assert!(matches!(err, McpError::MountNotFound { .. }));
    Ok(())
}

// =============================================================================
// Rejected mounts
// =============================================================================

#[tokio::test]
async fn test_cyclic_mount_leaves_tree_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let a = Arc::new(Server::new("a"));
    let b = Arc::new(Server::new("b"));
    a.mount("b", b.clone(), MountMode::Live).await?;

    let err = b.mount("a", a.clone(), MountMode::Live).await.unwrap_err();
    assert!(matches!(err, McpError::CyclicMount { .. }));
    assert!(b.mounts().is_empty());
    assert_eq!(a.mounts(), vec![("b".to_string(), MountMode::Live)]);

    let err = a.mount("self", a.clone(), MountMode::Live).await.unwrap_err();
    assert!(matches!(err, McpError::CyclicMount { .. }));
    assert_eq!(a.mounts().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_overlapping_prefixes_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("weather", weather_server(), MountMode::Live).await?;

    for prefix in ["weather", "weath", "weatherx"] {
        let err = root
            .mount(prefix, search_server(), MountMode::Live)
            .await
            .unwrap_err();
        assert!(err.is_structural(), "{prefix}: {err}");
    }
    assert_eq!(root.mounts().len(), 1);

    let err = root
        .mount("bad/prefix", search_server(), MountMode::Live)
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::InvalidRequest { .. }));
    Ok(())
}

// =============================================================================
// Errors through mounts
// =============================================================================

fn failing_child() -> Result<Arc<Server>, McpError> {
    let child = Server::new("calc");
    child.add_tool(Tool::new("divide"), |_args, _session| async move {
        Err(McpError::internal("division by zero at row 17"))
    })?;
    child.add_tool(Tool::new("explain"), |_args, _session| async move {
        Err(McpError::tool_error("need two numbers"))
    })?;
    Ok(Arc::new(child))
}

#[tokio::test]
async fn test_child_errors_use_qualified_name() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("calc", failing_child()?, MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let err = root.call_tool("calc_divide", json!({}), &session).await.unwrap_err();
    assert_handler_error(&err, ErrorOrigin::Local, "division by zero");
    assert_eq!(err.handler_details().map(|d| d.capability.as_str()), Some("calc_divide"));
    Ok(())
}

#[tokio::test]
async fn test_parent_masks_child_errors() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::builder("root")
        .config(ServerConfig::default().mask_error_details(true))
        .build();
    root.mount("calc", failing_child()?, MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let err = root.call_tool("calc_divide", json!({}), &session).await.unwrap_err();
    assert_handler_error(&err, ErrorOrigin::Local, "Error calling tool 'calc_divide'");
    assert!(!err.to_string().contains("row 17"));

    let err = root.call_tool("calc_explain", json!({}), &session).await.unwrap_err();
    assert_handler_error(&err, ErrorOrigin::Local, "need two numbers");
    Ok(())
}

// =============================================================================
// Registration policies
// =============================================================================

#[tokio::test]
async fn test_duplicate_policies() -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionContext::new(1u64);

    let strict = Server::new("strict");
    echo_tool(&strict, "dup", "first")?;
    let err = echo_tool(&strict, "dup", "second").unwrap_err();
    assert!(matches!(err, McpError::NameConflict { .. }));

    let keep = Server::builder("keep")
        .config(ServerConfig::default().on_duplicate(DuplicatePolicy::Ignore))
        .build();
    echo_tool(&keep, "dup", "first")?;
    echo_tool(&keep, "dup", "second")?;
    let out = keep.call_tool("dup", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("first"));

    let replace = Server::builder("replace")
        .config(ServerConfig::default().on_duplicate(DuplicatePolicy::Replace))
        .build();
    echo_tool(&replace, "dup", "first")?;
    echo_tool(&replace, "other", "x")?;
    echo_tool(&replace, "dup", "second")?;
    let out = replace.call_tool("dup", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("second"));
    assert_eq!(replace.list().await?.keys(CapabilityKind::Tool), vec!["dup", "other"]);
    Ok(())
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancelled_before_dispatch_skips_handler() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let child = Arc::new(Server::new("child"));
    {
        let calls = calls.clone();
        child.add_tool(Tool::new("count"), move |_args, _session| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ToolOutput::text("counted"))
            }
        })?;
    }
    let root = Server::new("root");
    root.mount("kid", child, MountMode::Live).await?;

    let session = SessionContext::new(1u64);
    session.cancel();
    let err = root.call_tool("kid_count", json!({}), &session).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_result_before_cancel_is_kept() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("weather", weather_server(), MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let out = root
        .call_tool("weather_get_forecast", json!({"city": "Oslo"}), &session)
        .await?;
    session.cancel();
    assert_tool_text(&out, "Oslo");
    Ok(())
}
