//! Integration tests for proxying remote providers.

use std::sync::Arc;
use std::time::Duration;

use mcpmesh::prelude::*;
use mcpmesh::server::router::{self, methods};
use mcpmesh_testing::fixtures::{search_server, weather_server};
use mcpmesh_testing::mock::{MockReply, MockTransport};
use mcpmesh_testing::{RecordingSink, assert_handler_error, assert_tool_text, recording_session};
use pretty_assertions::assert_eq;
use serde_json::json;

fn loopback(target: Arc<Server>) -> Arc<ProxyBridge> {
    Arc::new(ProxyBridge::new(
        "upstream",
        Arc::new(LoopbackTransport::new(target)),
    ))
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("condition not reached in time"));
}

fn hanging_mock() -> MockTransport {
    MockTransport::new()
        .with_capabilities([Capability::Tool(Tool::new("slow"))])
        .on("tools/call:slow", MockReply::Hang)
}

// =============================================================================
// Loopback
// =============================================================================

#[tokio::test]
async fn test_progress_and_logs_relayed() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = loopback(weather_server());
    let (session, sink) = recording_session(99u64);

    let out = bridge
        .call_tool("get_forecast", json!({"city": "Oslo"}), &session)
        .await?;
    assert_tool_text(&out, "Oslo");

    let progress = sink.progress();
    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0].progress, 0.0);
    assert_eq!(progress[0].total, Some(1.0));
    assert_eq!(progress[0].message.as_deref(), Some("looking up station"));
    assert_eq!(progress[1].progress, 1.0);

    let logs = sink.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "forecast requested for Oslo");
    assert!(sink.events().iter().all(|e| *e.request_id() == RequestId::from(99u64)));
    Ok(())
}

#[tokio::test]
async fn test_proxy_mounted_like_a_local_server() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("ddg", loopback(search_server()), MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let listed = root.list().await?;
    assert_eq!(
        listed.keys(CapabilityKind::Tool),
        vec!["ddg_web_search", "ddg_news_search"]
    );

    let out = root
        .call_tool("ddg_web_search", json!({"query": "rust", "max_results": 2}), &session)
        .await?;
    let body = out.structured_content.ok_or("no structured content")?;
    assert_eq!(body["results_count"], 2);
    assert_eq!(body["region"], "cn-zh");

    let contents = root.read_resource("search://ddg/news/rust", &session).await?;
    assert_eq!(contents.uri, "search://ddg/news/rust");
    let body: serde_json::Value = serde_json::from_str(contents.text.as_deref().ok_or("no text")?)?;
    assert_eq!(body["type"], "news_search");
    assert_eq!(body["timelimit"], "w");
    Ok(())
}

#[tokio::test]
async fn test_remote_validation_failure_is_upstream() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = loopback(search_server());
    let session = SessionContext::new(1u64);

    let err = bridge
        .call_tool("web_search", json!({"query": "rust", "max_results": 0}), &session)
        .await
        .unwrap_err();
    assert_eq!(err.origin(), Some(ErrorOrigin::Upstream));
    Ok(())
}

#[tokio::test]
async fn test_masking_applies_to_proxied_errors() -> Result<(), Box<dyn std::error::Error>> {
    let remote = Server::new("remote");
    remote.add_tool(Tool::new("leaky"), |_args, _session| async move {
        Err(McpError::internal("token=abc123"))
    })?;
    let root = Server::builder("root")
        .config(ServerConfig::default().mask_error_details(true))
        .build();
    root.mount("up", loopback(Arc::new(remote)), MountMode::Live).await?;

    let err = root
        .call_tool("up_leaky", json!({}), &SessionContext::new(1u64))
        .await
        .unwrap_err();
    assert_handler_error(&err, ErrorOrigin::Upstream, "Error calling tool 'up_leaky'");
    assert!(!err.to_string().contains("abc123"));
    Ok(())
}

// =============================================================================
// Scripted transport
// =============================================================================

#[tokio::test]
async fn test_catalog_follows_cursors() -> Result<(), Box<dyn std::error::Error>> {
    let mock = Arc::new(MockTransport::new().with_pages(
        CapabilityKind::Tool,
        vec![
            vec![Capability::Tool(Tool::new("one")), Capability::Tool(Tool::new("two"))],
            vec![Capability::Tool(Tool::new("three"))],
        ],
    ));
    let bridge = ProxyBridge::new("paged", mock.clone());

    let listed = bridge.list().await?;
    assert_eq!(listed.keys(CapabilityKind::Tool), vec!["one", "two", "three"]);

    let pages = mock.requests_for(methods::TOOLS_LIST);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].params["cursor"], "page-1");

    // Cached: no further list requests.
    bridge.lookup_tool("three").await?;
    assert_eq!(mock.requests_for(methods::TOOLS_LIST).len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_scripted_events_relayed_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let tool_result = serde_json::to_value(ToolOutput::text("done"))?;
    let mock = MockTransport::new()
        .with_capabilities([Capability::Tool(Tool::new("job"))])
        .emit(
            "tools/call:job",
            RemoteEventKind::Progress(ProgressUpdate::new(1.0, Some(3.0), None)),
        )
        .emit(
            "tools/call:job",
            RemoteEventKind::Log(LogRecord::new(LogLevel::Info, "step two")),
        )
        .emit(
            "tools/call:job",
            RemoteEventKind::Progress(ProgressUpdate::new(3.0, Some(3.0), Some("done".into()))),
        )
        .on("tools/call", MockReply::Ok(tool_result));
    let mock = Arc::new(mock);
    let bridge = ProxyBridge::new("jobs", mock.clone());
    let (session, sink) = recording_session(5u64);

    let out = bridge.call_tool("job", json!({}), &session).await?;
    assert_eq!(out.first_text(), Some("done"));

    let events = sink.events();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], SessionEvent::Progress { update, .. } if update.progress == 1.0));
    assert!(matches!(&events[1], SessionEvent::Log { record, .. } if record.message == "step two"));
    assert!(matches!(&events[2], SessionEvent::Progress { update, .. } if update.total == Some(3.0)));

    let calls = mock.requests_for(methods::TOOLS_CALL);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].params["_meta"]["progressToken"], json!(calls[0].id));
    Ok(())
}

#[tokio::test]
async fn test_remote_error_reply() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockTransport::new()
        .with_capabilities([Capability::Tool(Tool::new("quota"))])
        .on("tools/call:quota", MockReply::error(-32000, "quota exceeded"));
    let bridge = ProxyBridge::new("limited", Arc::new(mock));

    let err = bridge
        .call_tool("quota", json!({}), &SessionContext::new(1u64))
        .await
        .unwrap_err();
    assert_handler_error(&err, ErrorOrigin::Upstream, "quota exceeded");
    Ok(())
}

#[tokio::test]
async fn test_read_keeps_first_of_several_contents() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockTransport::new()
        .with_capabilities([Capability::Resource(Resource::new("doc://a", "a"))])
        .on(
            "resources/read:doc://a",
            MockReply::Ok(json!({"contents": [
                {"uri": "doc://a", "text": "first"},
                {"uri": "doc://a#2", "text": "second"}
            ]})),
        );
    let bridge = ProxyBridge::new("docs", Arc::new(mock));

    let contents = bridge
        .read_resource("doc://a", &SessionContext::new(1u64))
        .await?;
    assert_eq!(contents.uri, "doc://a");
    assert_eq!(contents.text.as_deref(), Some("first"));
    Ok(())
}

#[tokio::test]
async fn test_catalog_failure_is_upstream() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockTransport::new().on("tools/list", MockReply::error(-32603, "link down"));
    let bridge = Arc::new(ProxyBridge::new("dead", Arc::new(mock)));

    let err = bridge
        .call_tool("anything", json!({}), &SessionContext::new(1u64))
        .await
        .unwrap_err();
    assert_handler_error(&err, ErrorOrigin::Upstream, "link down");

    let root = Server::new("root");
    root.mount("dead", bridge, MountMode::Live).await?;
    let err = root.list().await.unwrap_err();
    assert_eq!(err.origin(), Some(ErrorOrigin::Upstream));
    Ok(())
}

#[tokio::test]
async fn test_unlisted_kinds_are_empty() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockTransport::new().with_capabilities([Capability::Tool(Tool::new("only"))]);
    let bridge = ProxyBridge::new("tools-only", Arc::new(mock));

    let listed = bridge.list().await?;
    assert_eq!(listed.len(), 1);
    assert!(listed.prompts().next().is_none());
    Ok(())
}

#[tokio::test]
async fn test_loopback_to_ancestor_is_cyclic() -> Result<(), Box<dyn std::error::Error>> {
    let root = Arc::new(Server::new("root"));
    let err = root
        .mount("loop", loopback(root.clone()), MountMode::Live)
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::CyclicMount { .. }));

    let child = Arc::new(Server::new("child"));
    root.mount("child", child.clone(), MountMode::Live).await?;
    let err = child
        .mount("up", loopback(root.clone()), MountMode::Live)
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::CyclicMount { .. }));
    assert!(child.mounts().is_empty());

    // Still listable: no cycle was formed.
    let _listed = tokio::time::timeout(Duration::from_secs(5), root.list()).await??;
    Ok(())
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_in_flight_reaches_remote() -> Result<(), Box<dyn std::error::Error>> {
    let mock = Arc::new(hanging_mock());
    let bridge = Arc::new(ProxyBridge::new("remote", mock.clone()));
    let sink = Arc::new(RecordingSink::new());
    let session = SessionContext::builder(3u64).sink(sink.clone()).build();

    let call = {
        let bridge = bridge.clone();
        let session = session.clone();
        tokio::spawn(async move { bridge.call_tool("slow", json!({}), &session).await })
    };
    wait_until(|| mock.pending() == 1).await;
    let id = mock.requests_for(methods::TOOLS_CALL)[0].id.clone();

    mock.publish(RemoteEvent::progress(
        RequestId::string("someone-else"),
        ProgressUpdate::new(9.0, None, None),
    ));
    mock.publish(RemoteEvent::progress(
        id.clone(),
        ProgressUpdate::new(0.25, Some(1.0), None),
    ));
    wait_until(|| !sink.progress().is_empty()).await;

    session.cancel();
    let err = call.await?.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(mock.cancels(), vec![id]);
    wait_until(|| mock.pending() == 0).await;

    let progress = sink.progress();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].progress, 0.25);
    Ok(())
}

#[tokio::test]
async fn test_cancel_without_remote_support() -> Result<(), Box<dyn std::error::Error>> {
    let mock = Arc::new(hanging_mock().without_cancellation());
    let bridge = Arc::new(ProxyBridge::new("remote", mock.clone()));
    let session = SessionContext::new(4u64);

    let call = {
        let bridge = bridge.clone();
        let session = session.clone();
        tokio::spawn(async move { bridge.call_tool("slow", json!({}), &session).await })
    };
    wait_until(|| mock.pending() == 1).await;

    session.cancel();
    let err = call.await?.unwrap_err();
    assert!(err.is_cancelled());
    assert!(mock.cancels().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_session_sends_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mock = Arc::new(hanging_mock());
    let bridge = ProxyBridge::new("remote", mock.clone());
    let session = SessionContext::new(5u64);
    session.cancel();

    let err = bridge.call_tool("slow", json!({}), &session).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(mock.requests().is_empty());
    Ok(())
}

// =============================================================================
// Wire dispatch
// =============================================================================

#[tokio::test]
async fn test_dispatch_shapes() -> Result<(), Box<dyn std::error::Error>> {
    let root = Server::new("root");
    root.mount("weather", weather_server(), MountMode::Live).await?;
    let session = SessionContext::new(1u64);

    let listed = router::dispatch(&root, methods::TOOLS_LIST, json!({}), &session).await?;
    assert_eq!(listed["tools"][0]["name"], "weather_get_forecast");
    assert!(listed.get("nextCursor").is_none());

    let templates =
        router::dispatch(&root, methods::RESOURCES_TEMPLATES_LIST, json!({}), &session).await?;
    assert_eq!(
        templates["resourceTemplates"][0]["uriTemplate"],
        "weather://weather/{city}/current"
    );

    let read = router::dispatch(
        &root,
        methods::RESOURCES_READ,
        json!({"uri": "weather://weather/Oslo/current"}),
        &session,
    )
    .await?;
    assert_eq!(read["contents"][0]["uri"], "weather://weather/Oslo/current");

    let err = router::dispatch(&root, "tools/destroy", json!({}), &session)
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::MethodNotFound { .. }));
    Ok(())
}
