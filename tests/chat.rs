use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};

use dashboard_ai::api::{chat, chat_stream};
use dashboard_ai::config::ProviderConfig;
use dashboard_ai::protocol::canonical::{ChatMessage, ChatRequest, Role, ToolCall, ToolDefinition};
use dashboard_ai::store::{MemoryCache, MemorySecretStore, MemoryStateStore};
use dashboard_ai::{ProviderError, ProviderState};

const CHAT_PATH: &str = "/api/v3/organisations/42/ai/chat";
const CHAT_STREAM_PATH: &str = "/api/v3/organisations/42/ai/chat/stream";

fn build_state(base_url: String) -> ProviderState {
    let config = ProviderConfig::new(base_url, "42", "dashboard_api_key");
    let secrets = Arc::new(MemorySecretStore::new().with_value("dashboard_api_key", "secret-key"));
    ProviderState::new(
        config,
        secrets,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryStateStore::new()),
    )
    .unwrap()
}

async fn spawn_upstream(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

fn weather_request(messages: Vec<ChatMessage>) -> ChatRequest {
    ChatRequest::new("amazon.nova-lite", messages).with_tools(vec![ToolDefinition::new(
        "get_weather",
    )
    .with_description("Current weather for a city")
    .with_schema(json!({
        "type": "object",
        "properties": {"city": {"type": "string"}},
        "required": ["city"]
    }))])
}

#[tokio::test]
async fn test_nested_and_flat_responses_decode_identically() {
    let nested = Router::new().route(
        CHAT_PATH,
        post(|| async {
            Json(json!({
                "response": {
                    "role": "assistant",
                    "content": [{"text": "Sunny"}, {"text": " today"}],
                    "stopReason": "end_turn",
                    "usage": {"inputTokens": 12, "outputTokens": 3, "totalTokens": 15}
                }
            }))
        }),
    );
    let flat = Router::new().route(
        CHAT_PATH,
        post(|| async {
            Json(json!({
                "role": "assistant",
                "content": "Sunny today",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 3, "total_tokens": 15}
            }))
        }),
    );
    let (nested_url, nested_server) = spawn_upstream(nested).await;
    let (flat_url, flat_server) = spawn_upstream(flat).await;

    let request = ChatRequest::new("amazon.nova-lite", vec![ChatMessage::user("Weather?")]);
    let a = chat(&build_state(nested_url), &request).await.unwrap();
    let b = chat(&build_state(flat_url), &request).await.unwrap();

    assert_eq!(a.message, b.message);
    assert_eq!(a.message.text, "Sunny today");
    assert_eq!(a.message.role, Role::Assistant);
    assert_eq!(a.stop_reason, b.stop_reason);
    assert_eq!(a.usage, b.usage);
    assert_eq!(a.usage.total_tokens, Some(15));
    assert!(a.tool_calls.is_empty() && b.tool_calls.is_empty());

    nested_server.abort();
    flat_server.abort();
}

#[tokio::test]
async fn test_tool_round_trip_wire_shape() {
    let seen: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_by_handler = Arc::clone(&seen);
    let app = Router::new().route(
        CHAT_PATH,
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let seen = Arc::clone(&seen_by_handler);
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                seen.lock().push((auth, body));
                Json(json!({
                    "response": {
                        "content": [
                            {"text": "Checking."},
                            {"toolUse": {"name": "get_weather", "input": {"city": "Paris"}}}
                        ],
                        "stopReason": "tool_use"
                    }
                }))
            }
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url);

    let request = weather_request(vec![
        ChatMessage::system("Be brief."),
        ChatMessage::user("Weather in Oslo?"),
        ChatMessage::assistant("").with_tool_call(ToolCall::new(
            "call-1",
            "get_weather",
            json!("{\"city\":\"Oslo\"}"),
        )),
        ChatMessage::tool_result("call-1", ""),
        ChatMessage::user("And Paris?"),
    ])
    .with_system_prompt("You are a weather bot.");

    let response = chat(&state, &request).await.unwrap();
    assert_eq!(response.message.text, "Checking.");
    assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    assert_eq!(response.tool_calls.len(), 1);
    let call = &response.tool_calls[0];
    assert!(call.call.id.starts_with("tooluse_"));
    assert_eq!(call.call.arguments, json!({"city": "Paris"}));
    assert_eq!(
        call.definition.as_ref().map(|tool| tool.name.as_str()),
        Some("get_weather")
    );

    let seen = seen.lock();
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer secret-key"));
    assert_eq!(
        body["system"],
        json!([{"text": "You are a weather bot."}, {"text": "Be brief."}])
    );
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(
        messages[1],
        json!({"role": "assistant", "content": [
            {"toolUse": {"toolUseId": "call-1", "name": "get_weather", "input": {"city": "Oslo"}}}
        ]})
    );
    assert_eq!(
        messages[2],
        json!({"role": "user", "content": [
            {"toolResult": {"toolUseId": "call-1", "content": [{"text": "Tool Result"}]}}
        ]})
    );
    assert_eq!(
        body["toolConfig"]["tools"][0]["toolSpec"]["name"],
        json!("get_weather")
    );
    assert!(body.get("stream").is_none());

    drop(seen);
    server.abort();
}

#[tokio::test]
async fn test_orphan_tool_result_rejected_before_network() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_by_handler = Arc::clone(&hits);
    let app = Router::new().route(
        CHAT_PATH,
        post(move || {
            hits_by_handler.fetch_add(1, Ordering::SeqCst);
            async { Json(json!({"content": "unreachable"})) }
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url);

    let request = ChatRequest::new(
        "amazon.nova-lite",
        vec![
            ChatMessage::user("hi"),
            ChatMessage::tool_result("never-issued", "42"),
        ],
    );
    let err = chat(&state, &request).await.err().unwrap();
    assert!(matches!(err, ProviderError::InvalidRequest(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    server.abort();
}

#[tokio::test]
async fn test_upstream_error_surfaces_status_and_message() {
    let app = Router::new().route(
        CHAT_PATH,
        post(|| async {
            Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("content-type", "application/json")
                .body(Body::from(r#"{"error":{"message":"model not enabled"}}"#))
                .unwrap()
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url);

    let request = ChatRequest::new("nope", vec![ChatMessage::user("hi")]);
    let err = chat(&state, &request).await.err().unwrap();
    match err {
        ProviderError::Upstream { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "model not enabled");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }

    server.abort();
}

#[tokio::test]
async fn test_stream_yields_deltas_and_stops_at_complete() {
    let app = Router::new().route(
        CHAT_STREAM_PATH,
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["stream"], json!(true));
            let sse = concat!(
                "data: {\"delta\":\"Hel\",\"role\":\"assistant\"}\n",
                ": keep-alive\n",
                "data: {not json}\n",
                "data: {\"delta\":{\"text\":\"lo\"},\"usage\":{\"inputTokens\":4,\"outputTokens\":2}}\n",
                "data: {\"toolUse\":{\"toolUseId\":\"t-1\",\"name\":\"get_weather\",\"input\":{\"city\":\"Oslo\"}},\"stopReason\":\"tool_use\"}\n",
                "data: {\"complete\":true}\n",
                "data: {\"delta\":\"ignored\"}\n",
            );
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .body(Body::from(sse))
                .unwrap()
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url);

    let request = weather_request(vec![ChatMessage::user("Say hello")]);
    let chunks: Vec<_> = chat_stream(&state, &request)
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(chunks.len(), 3);
    let text: String = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    assert_eq!(text, "Hello");
    assert_eq!(chunks[1].usage.input_tokens, Some(4));
    let call = chunks[2].tool_call.as_ref().unwrap();
    assert_eq!(call.id, "t-1");
    assert_eq!(call.arguments, json!({"city": "Oslo"}));
    assert_eq!(chunks[2].stop_reason.as_deref(), Some("tool_use"));

    server.abort();
}

#[tokio::test]
async fn test_stream_without_complete_ends_at_eof() {
    let app = Router::new().route(
        CHAT_STREAM_PATH,
        post(|| async {
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .body(Body::from("data: {\"delta\":\"Hel\"}\ndata: {\"delta\":\"lo\"}"))
                .unwrap()
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url);

    let request = ChatRequest::new("amazon.nova-lite", vec![ChatMessage::user("hi")]);
    let texts: Vec<String> = chat_stream(&state, &request)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().text)
        .collect()
        .await;
    assert_eq!(texts, vec!["Hel".to_string(), "lo".to_string()]);

    server.abort();
}
