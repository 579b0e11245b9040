use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use voxrelay_gateway::{ChatMessage, ConversationGateway, GatewayClient, GatewayConfig, GatewayError};
use voxrelay_types::{AssistantSnapshot, MessageRules};

/// Requests seen by the mock gateway: (authorization header, session header, body).
type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Starts a gateway that answers `/tools/invoke` by tool name.
async fn mock_gateway(seen: Seen) -> String {
    let tools_seen = seen.clone();
    let chat_seen = seen;

    let router = Router::new()
        .route(
            "/tools/invoke",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = tools_seen.clone();
                async move {
                    let auth = header(&headers, "authorization").unwrap_or_default();
                    seen.lock().unwrap().push((auth.clone(), None, body.clone()));

                    if auth != "Bearer good" {
                        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
                    }
                    match body["tool"].as_str() {
                        Some("sessions_history") => Json(json!({
                            "ok": true,
                            "result": {
                                "messages": [
                                    { "role": "user", "content": "🎤 turn off the lights", "timestamp": 10 },
                                    { "role": "assistant", "content": [{ "type": "text", "text": "Lights are off." }], "timestamp": 11 },
                                    { "role": "assistant", "content": "⚡ Lights are off.", "timestamp": 12 },
                                    { "role": "assistant", "content": "HEARTBEAT_OK", "timestamp": 13 }
                                ]
                            }
                        }))
                        .into_response(),
                        Some("sessions_send") => "accepted".into_response(),
                        Some("message") => Json(json!({ "ok": true, "result": { "sent": true } })).into_response(),
                        _ => Json(json!({ "ok": false, "error": { "message": "unknown tool" } })).into_response(),
                    }
                }
            }),
        )
        .route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = chat_seen.clone();
                async move {
                    let auth = header(&headers, "authorization").unwrap_or_default();
                    let session = header(&headers, "x-clawdbot-session-key");
                    seen.lock().unwrap().push((auth, session, body));
                    Json(json!({
                        "choices": [{ "message": { "role": "assistant", "content": "  It is sunny.  " } }]
                    }))
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(url: String, echo_target: &str) -> GatewayClient {
    let config = GatewayConfig {
        url,
        echo_target: echo_target.to_string(),
        ..GatewayConfig::default()
    };
    GatewayClient::new(config, Arc::new(MessageRules::default())).unwrap()
}

#[tokio::test]
async fn history_is_fetched_and_classified() {
    let seen = Seen::default();
    let gateway = client(mock_gateway(seen.clone()).await, "");

    let history = gateway.fetch_history("good", 20).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(
        AssistantSnapshot::latest(&history),
        AssistantSnapshot::new("Lights are off.", 11)
    );

    let requests = seen.lock().unwrap();
    let (auth, _, body) = &requests[0];
    assert_eq!(auth, "Bearer good");
    assert_eq!(body["tool"], "sessions_history");
    assert_eq!(body["args"]["sessionKey"], "agent:main:main");
    assert_eq!(body["args"]["limit"], 20);
    assert_eq!(body["args"]["includeTools"], false);
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    let gateway = client(mock_gateway(Seen::default()).await, "");

    let err = gateway.fetch_history("bad", 20).await.unwrap_err();
    assert!(err.is_unauthorized(), "got {:?}", err);

    let err = gateway.send_message("bad", "hello").await.unwrap_err();
    assert!(matches!(err, GatewayError::Unauthorized));
}

#[tokio::test]
async fn non_json_success_body_is_kept_as_text() {
    let seen = Seen::default();
    let gateway = client(mock_gateway(seen.clone()).await, "");

    let value = gateway.send_message("good", "turn off the lights").await.unwrap();
    assert_eq!(value, Value::String("accepted".to_string()));

    let requests = seen.lock().unwrap();
    assert_eq!(requests[0].2["tool"], "sessions_send");
    assert_eq!(requests[0].2["args"]["message"], "turn off the lights");
}

#[tokio::test]
async fn tool_failure_envelope_is_an_error() {
    let gateway = client(mock_gateway(Seen::default()).await, "");

    match gateway.invoke_tool("no_such_tool", json!({}), "good").await {
        Err(GatewayError::Tool { tool, message }) => {
            assert_eq!(tool, "no_such_tool");
            assert_eq!(message, "unknown tool");
        }
        other => panic!("expected tool error, got {:?}", other),
    }
}

#[tokio::test]
async fn chat_completion_returns_trimmed_content() {
    let seen = Seen::default();
    let gateway = client(mock_gateway(seen.clone()).await, "");

    let reply = gateway
        .chat_complete(
            "good",
            &[ChatMessage::user("weather?")],
            Some("agent:main:main"),
        )
        .await
        .unwrap();
    assert_eq!(reply.as_deref(), Some("It is sunny."));

    let requests = seen.lock().unwrap();
    let (auth, session, body) = &requests[0];
    assert_eq!(auth, "Bearer good");
    assert_eq!(session.as_deref(), Some("agent:main:main"));
    assert_eq!(body["model"], "clawdbot:main");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["content"], "weather?");
}

#[tokio::test]
async fn echo_is_skipped_without_target() {
    let seen = Seen::default();
    let gateway = client(mock_gateway(seen.clone()).await, "");

    gateway.echo("good", "🎤 hello").await.unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn echo_sends_message_tool() {
    let seen = Seen::default();
    let gateway = client(mock_gateway(seen.clone()).await, "12345");

    gateway.echo("good", "🎤 hello").await.unwrap();

    let requests = seen.lock().unwrap();
    let body = &requests[0].2;
    assert_eq!(body["tool"], "message");
    assert_eq!(body["args"]["action"], "send");
    assert_eq!(body["args"]["channel"], "telegram");
    assert_eq!(body["args"]["target"], "12345");
    assert_eq!(body["args"]["message"], "🎤 hello");
}

#[tokio::test]
async fn reset_sends_reset_command() {
    let seen = Seen::default();
    let gateway = client(mock_gateway(seen.clone()).await, "");

    gateway.reset_session("good").await.unwrap();

    let requests = seen.lock().unwrap();
    assert_eq!(requests[0].2["tool"], "sessions_send");
    assert_eq!(requests[0].2["args"]["message"], "/reset");
}

#[tokio::test]
async fn unreachable_gateway_is_transport_error() {
    let gateway = client("http://127.0.0.1:9".to_string(), "");
    let err = gateway.fetch_history("good", 20).await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_) | GatewayError::Timeout));
}
