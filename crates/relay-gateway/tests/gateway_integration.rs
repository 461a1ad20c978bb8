#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use relay_backends::{
    BackendRegistry, BackendStream, ChatBackend, FailoverOrchestrator, StatsTracker, StreamEvent,
};
use relay_core::{ChatMessage, RelayError, RelayResult};
use relay_gateway::GatewayServer;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

/// What a scripted backend does on every call.
#[derive(Clone)]
enum Script {
    Reply(Vec<&'static str>),
    FailAfter(Vec<&'static str>, &'static str),
    Refuse(&'static str),
}

struct Scripted {
    name: &'static str,
    script: Script,
}

#[async_trait]
impl ChatBackend for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn chat_stream(&self, _messages: &[ChatMessage]) -> RelayResult<BackendStream> {
        let (texts, failure) = match self.script.clone() {
            Script::Refuse(msg) => return Err(RelayError::backend(self.name, msg)),
            Script::Reply(texts) => (texts, None),
            Script::FailAfter(texts, msg) => (texts, Some(msg)),
        };
        Ok(BackendStream::spawn(8, move |tx| async move {
            for text in texts {
                let _ = tx.send(StreamEvent::Fragment { text: text.into() }).await;
            }
            match failure {
                Some(msg) => {
                    let _ = tx.send(StreamEvent::Error { message: msg.into() }).await;
                }
                None => {
                    let _ = tx.send(StreamEvent::Done).await;
                }
            }
            Ok(())
        }))
    }
}

fn backend(name: &'static str, script: Script) -> Arc<dyn ChatBackend> {
    Arc::new(Scripted { name, script })
}

/// Helper: serve the gateway on a random port, returning its base URL.
async fn start_test_server(backends: Vec<Arc<dyn ChatBackend>>) -> String {
    let registry = Arc::new(BackendRegistry::new(backends).unwrap());
    let orchestrator = FailoverOrchestrator::new(registry, Arc::new(StatsTracker::new()));
    let app = GatewayServer::build(Arc::new(orchestrator));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn chat_body(content: &str) -> Value {
    json!({ "messages": [{ "role": "user", "content": content }] })
}

async fn health(base: &str) -> Value {
    reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

// ── Test 1: Health endpoint ──

#[tokio::test]
async fn test_health_endpoint() {
    let base = start_test_server(vec![backend("A", Script::Reply(vec!["hi"]))]).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(timestamp.ends_with('Z'), "{timestamp}");
    assert_eq!(body["stats"]["uptime"], "0s");
    assert_eq!(body["stats"]["services"], json!({}));
}

// ── Test 2: Successful chat streams unframed text ──

#[tokio::test]
async fn test_chat_streams_text() {
    let base = start_test_server(vec![backend("A", Script::Reply(vec!["Hello", ", world"]))]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&chat_body("Say hello"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["cache-control"], "no-cache");
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.text().await.unwrap(), "Hello, world");
}

// ── Test 3: Failover keeps the partial output and appends the next backend ──

#[tokio::test]
async fn test_chat_mid_stream_failover() {
    let base = start_test_server(vec![
        backend("A", Script::FailAfter(vec!["Par"], "connection reset")),
        backend("B", Script::Reply(vec!["Full answer"])),
    ])
    .await;

    let text = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&chat_body("q"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "ParFull answer");

    let stats = health(&base).await;
    assert_eq!(stats["stats"]["services"]["A"], json!({ "count": 1, "failures": 1 }));
    assert_eq!(stats["stats"]["services"]["B"], json!({ "count": 1, "failures": 0 }));
}

// ── Test 4: Exhaustion ends a 200 stream with a trailing error line ──

#[tokio::test]
async fn test_chat_all_backends_fail() {
    let base = start_test_server(vec![
        backend("A", Script::Refuse("down")),
        backend("B", Script::Refuse("rate limited")),
    ])
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&chat_body("q"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        "\n\nError: All services failed. Last error: B service error: rate limited"
    );

    // The server keeps serving after a failed session.
    let stats = health(&base).await;
    assert_eq!(stats["status"], "ok");
    assert_eq!(stats["stats"]["services"]["A"]["failures"], 1);
    assert_eq!(stats["stats"]["services"]["B"]["failures"], 1);
}

// ── Test 5: Validation errors ──

#[tokio::test]
async fn test_chat_validation_errors() {
    let base = start_test_server(vec![backend("A", Script::Reply(vec!["x"]))]).await;
    let client = reqwest::Client::new();

    let cases = [
        (json!([1, 2]), "Request body must be a JSON object".to_string()),
        (json!({}), "Request must include 'messages' array".to_string()),
        (
            json!({ "messages": "hi" }),
            "Request must include 'messages' array".to_string(),
        ),
        (
            json!({ "messages": [] }),
            "Messages array cannot be empty".to_string(),
        ),
        (
            json!({ "messages": [{ "role": "user", "content": "a" }, { "role": "user" }] }),
            "Message at index 1 missing 'role' or 'content'".to_string(),
        ),
        (
            json!({ "messages": [{ "role": "bot", "content": "x" }] }),
            "Invalid role 'bot' at index 0. Must be 'system', 'user', or 'assistant'".to_string(),
        ),
        (
            json!({ "messages": [{ "role": "user", "content": 42 }] }),
            "Content at index 0 must be a string".to_string(),
        ),
    ];

    for (payload, expected) in cases {
        let resp = client
            .post(format!("{base}/chat"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{payload}");
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "error": expected }));
    }

    // Rejected requests never reach a backend.
    assert_eq!(health(&base).await["stats"]["services"], json!({}));
}

// ── Test 6: Malformed JSON ──

#[tokio::test]
async fn test_chat_malformed_json() {
    let base = start_test_server(vec![backend("A", Script::Reply(vec!["x"]))]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .header("content-type", "application/json")
        .body("{\"messages\": [")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Error processing request" }));
}

// ── Test 7: Unknown routes and CORS preflight ──

#[tokio::test]
async fn test_not_found_and_preflight() {
    let base = start_test_server(vec![backend("A", Script::Reply(vec!["x"]))]).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/v1/models")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Not Found" }));

    let resp = client
        .request(reqwest::Method::OPTIONS, format!("{base}/chat"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.headers()["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(resp.headers()["access-control-allow-headers"], "Content-Type");
}

// ── Test 8: Round robin across requests is visible in health counts ──

#[tokio::test]
async fn test_requests_rotate_across_backends() {
    let base = start_test_server(vec![
        backend("A", Script::Reply(vec!["a"])),
        backend("B", Script::Reply(vec!["b"])),
    ])
    .await;
    let client = reqwest::Client::new();

    let mut bodies = Vec::new();
    for _ in 0..4 {
        let text = client
            .post(format!("{base}/chat"))
            .json(&chat_body("q"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        bodies.push(text);
    }
    assert_eq!(bodies, ["a", "b", "a", "b"]);

    let stats = health(&base).await;
    assert_eq!(stats["stats"]["services"]["A"], json!({ "count": 2, "failures": 0 }));
    assert_eq!(stats["stats"]["services"]["B"], json!({ "count": 2, "failures": 0 }));
}

// ── Test 9: Health counters only grow across calls ──

fn uptime_secs(health: &Value) -> u64 {
    health["stats"]["uptime"]
        .as_str()
        .unwrap()
        .trim_end_matches('s')
        .parse()
        .unwrap()
}

async fn post_chat(client: &reqwest::Client, base: &str) -> String {
    client
        .post(format!("{base}/chat"))
        .json(&chat_body("q"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_is_monotonic_across_sessions() {
    let base = start_test_server(vec![
        backend("A", Script::Refuse("down")),
        backend("B", Script::Reply(vec!["ok"])),
    ])
    .await;
    let client = reqwest::Client::new();

    assert_eq!(post_chat(&client, &base).await, "ok");
    let before = health(&base).await;
    assert_eq!(before["stats"]["services"]["A"], json!({ "count": 1, "failures": 1 }));
    assert_eq!(before["stats"]["services"]["B"], json!({ "count": 1, "failures": 0 }));

    assert_eq!(post_chat(&client, &base).await, "ok");
    let after = health(&base).await;

    assert!(uptime_secs(&after) >= uptime_secs(&before));

    let earlier = before["stats"]["services"].as_object().unwrap();
    let later = after["stats"]["services"].as_object().unwrap();
    for (name, counts) in earlier {
        for field in ["count", "failures"] {
            assert!(
                later[name][field].as_u64().unwrap() >= counts[field].as_u64().unwrap(),
                "{name}.{field} decreased"
            );
        }
    }

    // Each session draws A first, fails over to B, and leaves the cursor back on A.
    assert_eq!(later["A"], json!({ "count": 2, "failures": 2 }));
    assert_eq!(later["B"], json!({ "count": 2, "failures": 0 }));

    let last = health(&base).await;
    assert!(uptime_secs(&last) >= uptime_secs(&after));
    assert_eq!(last["stats"]["services"], after["stats"]["services"]);
}
