//! Pre-built servers for common testing scenarios.
//!
//! Every handler is deterministic and in-memory.

use std::sync::Arc;

use mcpmesh_core::error::McpError;
use mcpmesh_core::types::{
    GetPromptResult, Prompt, PromptMessage, ResourceContents, ResourceTemplate, Tool, ToolOutput,
};
use mcpmesh_server::capability::ResourceRequest;
use mcpmesh_server::context::SessionContext;
use mcpmesh_server::server::Server;
use serde_json::{Map, Value, json};

/// A weather server.
///
/// - tool `get_forecast(city, days?)`, reports progress twice
/// - template `weather://{city}/current`
/// - prompt `forecast_summary(city)`
#[must_use]
pub fn weather_server() -> Arc<Server> {
    let server = Server::new("weather");
    let registered = (|| -> Result<(), McpError> {
        server.add_tool(
            Tool::new("get_forecast")
                .description("Get the forecast for a city")
                .with_string_param("city", "City name", true)
                .with_integer_param("days", "Number of days", false)
                .read_only(true),
            |args: Value, session: SessionContext| async move {
                let city = args["city"].as_str().unwrap_or_default().to_string();
                let days = args["days"].as_u64().unwrap_or(1);
                session.report_progress(0.0, Some(1.0), Some("looking up station"));
                session.info(format!("forecast requested for {city}"));
                session.report_progress(1.0, Some(1.0), None);
                Ok(ToolOutput::text(format!("{city}: sunny for {days} day(s)")))
            },
        )?;
        server.add_template(
            ResourceTemplate::new("weather://{city}/current", "current_conditions")
                .description("Current conditions for a city")
                .mime_type("application/json"),
            |req: ResourceRequest, _session: SessionContext| async move {
                let city = req.param("city").unwrap_or_default().to_string();
                Ok(ResourceContents::json(
                    req.uri,
                    &json!({ "city": city, "conditions": "sunny", "temperature_c": 21 }),
                ))
            },
        )?;
        server.add_prompt(
            Prompt::new("forecast_summary")
                .description("Summarize the forecast")
                .argument("city", "City name", true),
            |args: Map<String, Value>, _session: SessionContext| async move {
                let city = args.get("city").and_then(Value::as_str).unwrap_or_default();
                Ok(GetPromptResult::new(vec![PromptMessage::user(format!(
                    "Summarize the weather forecast for {city}."
                ))]))
            },
        )?;
        Ok(())
    })();
    debug_assert!(registered.is_ok(), "weather fixture failed to register: {registered:?}");
    Arc::new(server)
}

const DEFAULT_REGION: &str = "cn-zh";
const DEFAULT_BACKEND: &str = "auto";
const DEFAULT_NEWS_TIMELIMIT: &str = "w";
const RESOURCE_RESULTS: u64 = 5;

fn fake_results(kind: &str, query: &str, count: u64) -> Vec<Value> {
    (1..=count)
        .map(|i| {
            json!({
                "title": format!("{query} {kind} result {i}"),
                "href": format!("https://example.com/{kind}/{i}"),
                "body": format!("Snippet {i} about {query}"),
            })
        })
        .collect()
}

fn search_tool(name: &str, description: &str) -> Tool {
    Tool::new(name)
        .description(description)
        .input_schema(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query string" },
                "region": { "type": "string", "default": DEFAULT_REGION },
                "max_results": { "type": "integer", "minimum": 1, "maximum": 100, "default": 10 },
                "timelimit": { "type": ["string", "null"], "enum": ["d", "w", "m", "y", null] },
                "backend": { "type": "string", "default": DEFAULT_BACKEND }
            },
            "required": ["query"]
        }))
        .read_only(true)
}

/// A metasearch server backed by canned results.
///
/// - tools `web_search` and `news_search(query, region?, max_results?, timelimit?, backend?)`
/// - templates `search://web/{query}` and `search://news/{query}{?timelimit}`,
///   where `timelimit` defaults to `"w"`
#[must_use]
pub fn search_server() -> Arc<Server> {
    let server = Server::new("search");
    let registered = (|| -> Result<(), McpError> {
        server.add_tool(
            search_tool("web_search", "Perform web search"),
            |args: Value, _session: SessionContext| async move {
                let query = args["query"].as_str().unwrap_or_default();
                let max_results = args["max_results"].as_u64().unwrap_or(10);
                let results = fake_results("web", query, max_results);
                Ok(ToolOutput::json(json!({
                    "query": query,
                    "region": args["region"].as_str().unwrap_or(DEFAULT_REGION),
                    "backend": args["backend"].as_str().unwrap_or(DEFAULT_BACKEND),
                    "results_count": results.len(),
                    "results": results,
                })))
            },
        )?;
        server.add_tool(
            search_tool("news_search", "Search for news articles"),
            |args: Value, _session: SessionContext| async move {
                let query = args["query"].as_str().unwrap_or_default();
                let max_results = args["max_results"].as_u64().unwrap_or(10);
                let results = fake_results("news", query, max_results);
                Ok(ToolOutput::json(json!({
                    "query": query,
                    "timelimit": args.get("timelimit").cloned().unwrap_or(Value::Null),
                    "backend": args["backend"].as_str().unwrap_or(DEFAULT_BACKEND),
                    "results_count": results.len(),
                    "results": results,
                })))
            },
        )?;
        server.add_template(
            ResourceTemplate::new("search://web/{query}", "web_search_resource")
                .description("Web search results as a JSON resource")
                .mime_type("application/json"),
            |req: ResourceRequest, _session: SessionContext| async move {
                let query = req.param("query").unwrap_or_default().to_string();
                let results = fake_results("web", &query, RESOURCE_RESULTS);
                Ok(ResourceContents::json(
                    req.uri,
                    &json!({ "query": query, "type": "web_search", "results": results }),
                ))
            },
        )?;
        server.add_template(
            ResourceTemplate::new("search://news/{query}{?timelimit}", "news_search_resource")
                .description("News search results with an optional time limit")
                .mime_type("application/json")
                .default_value("timelimit", DEFAULT_NEWS_TIMELIMIT),
            |req: ResourceRequest, _session: SessionContext| async move {
                let query = req.param("query").unwrap_or_default().to_string();
                let timelimit = req
                    .param("timelimit")
                    .unwrap_or(DEFAULT_NEWS_TIMELIMIT)
                    .to_string();
                let results = fake_results("news", &query, RESOURCE_RESULTS);
                Ok(ResourceContents::json(
                    req.uri,
                    &json!({
                        "query": query,
                        "type": "news_search",
                        "timelimit": timelimit,
                        "results": results,
                    }),
                ))
            },
        )?;
        Ok(())
    })();
    debug_assert!(registered.is_ok(), "search fixture failed to register: {registered:?}");
    Arc::new(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_server::provider::Provider;
    use pretty_assertions::assert_eq;

    fn body(contents: &ResourceContents) -> Value {
        serde_json::from_str(contents.text.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_news_resource_timelimit_default() {
        let server = search_server();
        let session = SessionContext::new(1u64);

        let contents = server.read_resource("search://news/rust", &session).await.unwrap();
        assert_eq!(body(&contents)["timelimit"], "w");

        let contents = server
            .read_resource("search://news/rust?timelimit=d", &session)
            .await
            .unwrap();
        let body = body(&contents);
        assert_eq!(body["timelimit"], "d");
        assert_eq!(body["results"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_web_search_bounds() {
        let server = search_server();
        let session = SessionContext::new(1u64);

        let out = server
            .call_tool("web_search", json!({"query": "mcp", "max_results": 3}), &session)
            .await
            .unwrap();
        assert_eq!(out.structured_content.unwrap()["results_count"], 3);

        let err = server
            .call_tool("web_search", json!({"query": "mcp", "max_results": 500}), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments(_)));
    }
}
