//! Transport tests against an in-process streaming server.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    AgentError, AgentMessage, EventKind, ExchangeOutcome, Payload, RunAgentStreamRequest,
    SessionId, StreamEvent, TransportError,
};
use agent_runtime::{run_exchange, StreamClient, StreamConfig, StreamHandle};
use axum::body::Body;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_stream::StreamExt;

const STREAM_PATH: &str = "/api/ai/agent/run/stream";
const WAIT: Duration = Duration::from_secs(5);

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

/// Serve `chunks` as the response body; optionally keep the body open afterwards
async fn serve_chunks(chunks: Vec<Vec<u8>>, hold_open: bool) -> String {
    let app = Router::new().route(
        STREAM_PATH,
        post(move || {
            let chunks = chunks.clone();
            async move {
                let head = tokio_stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
                if hold_open {
                    Body::from_stream(head.chain(tokio_stream::pending()))
                } else {
                    Body::from_stream(head)
                }
            }
        }),
    );
    serve(app).await
}

fn client(base_url: &str) -> StreamClient {
    let config = StreamConfig::new(base_url).with_close_grace(Duration::from_millis(150));
    StreamClient::new(config).unwrap()
}

fn request() -> RunAgentStreamRequest {
    let session = SessionId::from_string("session_test");
    RunAgentStreamRequest::new("secret", AgentMessage::user(42, &session, "hi"))
}

fn line(kind: &str, data: &Value) -> String {
    format!("data: {}\n", json!({ "type": kind, "data": data.to_string() }))
}

fn hello_body() -> String {
    [
        line("content", &json!({"content": "Hel"})),
        line("content", &json!({"content": "lo"})),
        line("message_end", &json!({})),
    ]
    .concat()
}

/// Run one exchange with the default request, ignoring updates
async fn exchange(base: &str) -> agent_core::Result<ExchangeOutcome> {
    timeout(WAIT, run_exchange(&client(base), request(), |_| {}))
        .await
        .expect("exchange never ended")
}

#[derive(Debug)]
enum Seen {
    Message(Payload),
    Error(TransportError),
    Close,
}

fn record(handle: &StreamHandle) -> mpsc::UnboundedReceiver<Seen> {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = tx.clone();
    handle.add_event_listener(EventKind::Message, move |event| {
        if let StreamEvent::Message(payload) = event {
            let _ = sender.send(Seen::Message(payload.clone()));
        }
    });
    let sender = tx.clone();
    handle.add_event_listener(EventKind::Error, move |event| {
        if let StreamEvent::Error(error) = event {
            let _ = sender.send(Seen::Error(error.clone()));
        }
    });
    handle.add_event_listener(EventKind::Close, move |_| {
        let _ = tx.send(Seen::Close);
    });
    rx
}

/// Drain events until the bus is torn down
async fn drain(mut rx: mpsc::UnboundedReceiver<Seen>) -> Vec<Seen> {
    let mut seen = Vec::new();
    while let Some(event) = timeout(WAIT, rx.recv()).await.expect("exchange never ended") {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_hello_example_end_to_end() {
    let base = serve_chunks(vec![hello_body().into_bytes()], true).await;

    let mut snapshots = Vec::new();
    let client = client(&base);
    let exchange = run_exchange(&client, request(), |m| {
        snapshots.push(m.content.clone());
    });
    let outcome = timeout(WAIT, exchange).await.unwrap().unwrap();

    assert_eq!(outcome.into_completed().unwrap().content, "Hello");
    assert_eq!(snapshots, ["Hel", "Hello"]);
}

#[tokio::test]
async fn test_arbitrary_read_boundaries() {
    let body = [
        line("message_start", &json!({})),
        line("reasoning", &json!({"content": "思考中…"})),
        line("content", &json!({"content": "héllo "})),
        line("tool_call", &json!({"tool_id": "t1", "name": "search", "arguments": "{\"q\":"})),
        line("tool_call_chunk", &json!({"tool_id": "t1", "args_chunk": "\"世界\"}"})),
        line("tool_result", &json!({"tool_id": "t1", "result": "🦀 found"})),
        line("content", &json!({"content": "世界 🦀"})),
        line("message_end", &json!({})),
    ]
    .concat()
    .into_bytes();

    // Three-byte reads split lines and multi-byte characters alike.
    let chunks: Vec<Vec<u8>> = body.chunks(3).map(<[u8]>::to_vec).collect();
    let base = serve_chunks(chunks, false).await;

    let outcome = exchange(&base).await.unwrap();
    let message = outcome.into_completed().unwrap();
    assert_eq!(message.reasoning, "思考中…");
    assert_eq!(message.content, "héllo 世界 🦀");

    let call = message.tool("t1").unwrap();
    assert_eq!(call.name, "search");
    assert_eq!(call.arguments, "{\"q\":\"世界\"}");
    assert_eq!(call.result.as_deref(), Some("🦀 found"));
}

#[tokio::test]
async fn test_message_end_closes_after_grace_delay() {
    let base = serve_chunks(vec![hello_body().into_bytes()], true).await;
    let handle = client(&base).connect(request());
    let mut rx = record(&handle);
    handle.start();

    let mut end_seen_at = None;
    let mut closed_at = None;
    while let Some(event) = timeout(WAIT, rx.recv()).await.unwrap() {
        match event {
            Seen::Message(payload) if payload.frame_type() == Some("message_end") => {
                end_seen_at = Some(Instant::now());
            }
            Seen::Message(_) => {}
            Seen::Close => closed_at = Some(Instant::now()),
            Seen::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    let waited = closed_at.unwrap() - end_seen_at.unwrap();
    assert!(waited >= Duration::from_millis(100), "closed after {waited:?}");
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_close_event_line_shuts_down() {
    let base = serve_chunks(vec![b"event: close\n".to_vec()], true).await;
    let handle = client(&base).connect(request());
    let rx = record(&handle);
    handle.start();

    let seen = drain(rx).await;
    assert!(matches!(seen.as_slice(), [Seen::Close]), "{seen:?}");
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let body = line("content", &json!({"content": "x"}));
    let base = serve_chunks(vec![body.into_bytes()], true).await;
    let handle = client(&base).connect(request());
    let rx = record(&handle);
    handle.start();

    handle.close();
    handle.close();
    assert!(handle.is_closed());

    let seen = drain(rx).await;
    let closes = seen.iter().filter(|s| matches!(s, Seen::Close)).count();
    assert_eq!(closes, 1);
    assert!(!seen.iter().any(|s| matches!(s, Seen::Error(_))));
}

#[tokio::test]
async fn test_trailing_fragment_without_newline() {
    let mut body = line("content", &json!({"content": "tail"}));
    body.push_str(line("message_end", &json!({})).trim_end());
    let base = serve_chunks(vec![body.into_bytes()], false).await;

    let outcome = exchange(&base).await.unwrap();
    assert_eq!(outcome.into_completed().unwrap().content, "tail");
}

#[tokio::test]
async fn test_unparseable_line_is_delivered_raw() {
    let body = format!("data: not-json\n{}", hello_body());
    let base = serve_chunks(vec![body.clone().into_bytes()], false).await;

    let handle = client(&base).connect(request());
    let rx = record(&handle);
    handle.start();
    let seen = drain(rx).await;
    assert!(matches!(&seen[0], Seen::Message(Payload::Raw(raw)) if raw == "not-json"));
    assert!(matches!(seen.last(), Some(Seen::Close)));

    // The exchange carries on past the bad line.
    let base = serve_chunks(vec![body.into_bytes()], false).await;
    let outcome = exchange(&base).await.unwrap();
    assert_eq!(outcome.into_completed().unwrap().content, "Hello");
}

#[tokio::test]
async fn test_stream_end_without_terminal_frame() {
    let body = line("content", &json!({"content": "cut"}));
    let base = serve_chunks(vec![body.into_bytes()], false).await;

    let outcome = exchange(&base).await.unwrap();
    let ExchangeOutcome::Incomplete(Some(last)) = outcome else {
        panic!("expected incomplete outcome");
    };
    assert_eq!(last.content, "cut");
}

#[tokio::test]
async fn test_upstream_error_frame() {
    let body = [
        line("content", &json!({"content": "par"})),
        line("error", &json!({"message": "quota exceeded"})),
    ]
    .concat();
    let base = serve_chunks(vec![body.into_bytes()], true).await;

    let outcome = exchange(&base).await.unwrap();
    let ExchangeOutcome::Failed(failure) = outcome else {
        panic!("expected failed outcome");
    };
    assert_eq!(failure.message(), "quota exceeded");
    assert_eq!(failure.partial.unwrap().content, "par");
}

#[tokio::test]
async fn test_error_status_reported_once() {
    let app = Router::new().route(
        STREAM_PATH,
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = serve(app).await;

    let handle = client(&base).connect(request());
    let rx = record(&handle);
    handle.start();
    let seen = drain(rx).await;
    assert!(
        matches!(
            seen.as_slice(),
            [Seen::Error(TransportError::Status { status: 500, body })] if body == "boom"
        ),
        "{seen:?}"
    );

    // Closing after a failure dispatches nothing further.
    handle.close();

    let err = exchange(&base).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, AgentError::Transport(TransportError::Status { status: 500, .. })));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = exchange(&format!("http://{addr}")).await.unwrap_err();
    assert!(matches!(err, AgentError::Transport(TransportError::Connection(_))));
}

#[tokio::test]
async fn test_request_body_shape() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        STREAM_PATH,
        post(move |Json(body): Json<Value>| {
            let _ = tx.send(body);
            async { hello_body() }
        }),
    );
    let base = serve(app).await;

    let request = request().with_replacement("name", "Ada");
    timeout(WAIT, run_exchange(&client(&base), request, |_| {}))
        .await
        .unwrap()
        .unwrap();

    let body = rx.recv().await.unwrap();
    assert_eq!(body["agent_id"], 42);
    assert_eq!(body["api_key"], "secret");
    assert_eq!(body["agent_message"]["message_content"], "hi");
    assert_eq!(body["agent_message"]["role"], "user");
    assert_eq!(body["prompt_replacement"]["name"], "Ada");
}

#[tokio::test]
async fn test_close_from_listener_delivers_rest_of_read() {
    let body = [
        line("content", &json!({"content": "A"})),
        line("content", &json!({"content": "B"})),
    ]
    .concat();
    let base = serve_chunks(vec![body.into_bytes()], true).await;

    let handle = Arc::new(client(&base).connect(request()));
    let rx = record(&handle);
    let weak = Arc::downgrade(&handle);
    handle.add_event_listener(EventKind::Message, move |_| {
        if let Some(handle) = weak.upgrade() {
            handle.close();
        }
    });
    handle.start();

    let seen = drain(rx).await;
    let messages = seen.iter().filter(|s| matches!(s, Seen::Message(_))).count();
    let closes = seen.iter().filter(|s| matches!(s, Seen::Close)).count();
    assert_eq!(messages, 2, "{seen:?}");
    assert_eq!(closes, 1);
    assert!(!seen.iter().any(|s| matches!(s, Seen::Error(_))));
}

#[tokio::test]
async fn test_read_failure_reported_once_without_close() {
    let first = line("content", &json!({"content": "par"})).into_bytes();
    let app = Router::new().route(
        STREAM_PATH,
        post(move || {
            let first = first.clone();
            async move {
                let failing = futures::stream::once(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(std::io::Error::other("upstream reset"))
                });
                Body::from_stream(tokio_stream::once(Ok(first)).chain(failing))
            }
        }),
    );
    let base = serve(app).await;

    let handle = client(&base).connect(request());
    let rx = record(&handle);
    handle.start();

    let seen = drain(rx).await;
    assert!(
        matches!(
            seen.as_slice(),
            [Seen::Message(_), Seen::Error(TransportError::Connection(_))]
        ),
        "{seen:?}"
    );
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_dropped_handle_cancels_silently() {
    let body = line("content", &json!({"content": "x"}));
    let base = serve_chunks(vec![body.into_bytes()], true).await;

    let handle = client(&base).connect(request());
    let mut rx = record(&handle);
    handle.start();

    let first = timeout(WAIT, rx.recv()).await.unwrap();
    assert!(matches!(first, Some(Seen::Message(_))));

    drop(handle);
    let rest = drain(rx).await;
    assert!(rest.is_empty(), "{rest:?}");
}
