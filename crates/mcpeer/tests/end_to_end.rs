#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcpeer::tools::mcp::testing::{FakeConnector, FakeServer};
use mcpeer::tools::mcp::{ToolDescriptor, ToolOutput};
use mcpeer::{
    AgentEvent, Config, McpAgent, McpClient, McpConfig, OpenAIClient, RetryConfig, RunOutcome,
    ServerConfig,
};

fn weather_client() -> (Arc<McpClient>, FakeServer) {
    let server = FakeServer::new("weather").with_tool(
        ToolDescriptor::new(
            "forecast",
            "Forecast for a city",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        ),
        |args| Ok(ToolOutput::text(format!("Sunny in {}", args["city"].as_str().unwrap_or("?")))),
    );
    let config = McpConfig::new(vec![ServerConfig::stdio(
        "weather",
        "weather-mcp",
        Vec::<String>::new(),
    )])
    .unwrap();
    let connector = FakeConnector::new().with_server(server.clone());
    (
        Arc::new(McpClient::with_connector(config, Arc::new(connector))),
        server,
    )
}

fn openai(server: &MockServer) -> OpenAIClient {
    OpenAIClient::new(
        Config::new("openai", "gpt-4o")
            .with_api_key("test-key")
            .with_base_url(server.uri())
            .with_retry_config(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            }),
    )
    .unwrap()
}

fn completion(message: &serde_json::Value, finish_reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_677_652_288,
        "model": "gpt-4o",
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}]
    }))
}

async fn mount_forecast_then_answer(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{"type": "function", "function": {"name": "forecast"}}]
        })))
        .respond_with(completion(
            &json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "forecast", "arguments": "{\"city\":\"Lisbon\"}"}
                }]
            }),
            "tool_calls",
        ))
        .up_to_n_times(1)
        .expect(1)
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(
            &json!({"role": "assistant", "content": "It will be sunny in Lisbon."}),
            "stop",
        ))
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_one_server_run() {
    let mock_server = MockServer::start().await;
    mount_forecast_then_answer(&mock_server).await;
    let (client, server) = weather_client();

    let agent = McpAgent::builder(openai(&mock_server), client.clone()).build();
    let outcome = agent.run("Weather in Lisbon?", None).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            answer: "It will be sunny in Lisbon.".into(),
            steps: 2
        }
    );
    assert_eq!(
        server.stats().calls(),
        vec![("forecast".to_string(), json!({"city": "Lisbon"}))]
    );

    let requests = mock_server.received_requests().await.unwrap();
    let second: serde_json::Value = requests[1].body_json().unwrap();
    let last = second["messages"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["role"], "tool");
    assert_eq!(last["tool_call_id"], "call_1");
    assert_eq!(last["content"], "Sunny in Lisbon");

    client.close_all().await.unwrap();
    assert!(client.active_sessions().await.is_empty());
}

fn sse(events: &[&str]) -> ResponseTemplate {
    let body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    ResponseTemplate::new(200)
        .set_body_raw(body, "text/event-stream")
}

#[tokio::test]
async fn test_one_server_stream() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse(&[
            r#"{"id":"s1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"call_1","function":{"name":"forecast","arguments":"{\"city\":"}}]}}]}"#,
            r#"{"id":"s1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Porto\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ]))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse(&[
            r#"{"id":"s2","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Sunny "}}]}"#,
            r#"{"id":"s2","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"in Porto."},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]))
        .mount(&mock_server)
        .await;
    let (client, server) = weather_client();

    let agent = McpAgent::builder(openai(&mock_server), client).build();
    let events: Vec<AgentEvent> = agent
        .astream("Weather in Porto?")
        .map(Result::unwrap)
        .collect()
        .await;

    assert!(matches!(events.first(), Some(AgentEvent::StepStarted { step: 1, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::ToolCall { server: Some(server), .. } if server == "weather"
    )));
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::TextDelta { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Sunny in Porto.");
    assert_eq!(
        events.last(),
        Some(&AgentEvent::Finished(RunOutcome::Completed {
            answer: "Sunny in Porto.".into(),
            steps: 2
        }))
    );
    assert_eq!(
        server.stats().calls(),
        vec![("forecast".to_string(), json!({"city": "Porto"}))]
    );
}
