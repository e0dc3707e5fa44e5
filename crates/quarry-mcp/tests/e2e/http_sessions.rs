//! Streamable HTTP transport and session lifecycle tests.

use super::common::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use quarry_core::McpConfig;
use quarry_mcp::SESSION_HEADER;
use serde_json::json;
use std::time::Duration;

fn delete_request(session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri("/mcp");
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER, id);
    }
    builder.body(Body::empty()).unwrap()
}

async fn insert_note(http: &HttpFixture, session: Option<&str>) -> StatusCode {
    http.post(
        session,
        json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {
                "name": "execute",
                "arguments": { "sql": "INSERT INTO notes (body) VALUES ('sneaky')" }
            }
        }),
    )
    .await
    .status()
}

pub async fn test_initialize_creates_session(ctx: &TestContext) {
    println!("  🧪 test_initialize_creates_session");
    let http = ctx.http("http_init", McpConfig::default());

    let response = http.post(None, initialize_message()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = session_id(&response).expect("session header");
    let body = body_json(response).await;
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(body["result"]["serverInfo"]["name"], "quarry");

    let listed = http
        .post(Some(&id), json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
        .await;
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(session_id(&listed).as_deref(), Some(id.as_str()));
    let tools = body_json(listed).await["result"]["tools"]
        .as_array()
        .map(Vec::len);
    assert_eq!(tools, Some(15));

    assert_eq!(http.state.sessions().len().await, 1);
    println!("     ✓ initialize returns a session id that later requests reuse");
}

pub async fn test_session_errors(ctx: &TestContext) {
    println!("  🧪 test_session_errors");
    let http = ctx.http("http_errors", McpConfig::default());

    let missing = http
        .post(None, json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let unknown = http
        .post(
            Some("not-a-session"),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(unknown).await["error"]["code"], -32001);

    // An initialize naming an unknown session does not open a new one.
    let stale = http.post(Some("not-a-session"), initialize_message()).await;
    assert_eq!(stale.status(), StatusCode::NOT_FOUND);
    assert!(http.state.sessions().is_empty().await);

    let id = http.initialize(&[]).await;
    http.call_tool(
        &id,
        "create_table",
        json!({ "table": "notes", "columns": [{ "name": "body", "type": "TEXT" }] }),
    )
    .await;

    assert_eq!(
        insert_note(&http, Some("not-a-session")).await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(insert_note(&http, None).await, StatusCode::BAD_REQUEST);

    let count = http
        .call_tool(&id, "query", json!({ "sql": "SELECT COUNT(*) AS n FROM notes" }))
        .await;
    assert_eq!(envelope_payload(&count)["rows"][0]["n"], 0);
    assert_eq!(http.state.sessions().len().await, 1);
    println!("     ✓ Missing session is 400, unknown session is 404, and neither executes");
}

pub async fn test_invalid_initialize_opens_no_session(ctx: &TestContext) {
    println!("  🧪 test_invalid_initialize_opens_no_session");
    let http = ctx.http("http_bad_init", McpConfig::default());

    let mut wrong_version = initialize_message();
    wrong_version["jsonrpc"] = json!("1.0");
    let response = http.post(None, wrong_version).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(session_id(&response).is_none());
    assert_eq!(body_json(response).await["error"]["code"], -32600);

    let mut without_id = initialize_message();
    without_id.as_object_mut().unwrap().remove("id");
    let response = http.post(None, without_id).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(session_id(&response).is_none());

    assert!(http.state.sessions().is_empty().await);
    println!("     ✓ Malformed initialize calls are 400 and create no session");
}

pub async fn test_notifications_are_accepted(ctx: &TestContext) {
    println!("  🧪 test_notifications_are_accepted");
    let http = ctx.http("http_notify", McpConfig::default());
    let id = http.initialize(&[]).await;

    let response = http
        .post(
            Some(&id),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    println!("     ✓ Notifications get 202 with no body");
}

pub async fn test_tool_calls_share_target(ctx: &TestContext) {
    println!("  🧪 test_tool_calls_share_target");
    let http = ctx.http("http_shared", McpConfig::default());
    let first = http.initialize(&[]).await;
    let second = http.initialize(&[]).await;
    assert_ne!(first, second);

    let created = http
        .call_tool(
            &first,
            "create_table",
            json!({ "table": "notes", "columns": [{ "name": "body", "type": "TEXT" }] }),
        )
        .await;
    assert_eq!(envelope_payload(&created)["created"], true);

    let listed = http.call_tool(&second, "list_tables", json!({})).await;
    assert_eq!(
        envelope_payload(&listed)["tables"],
        json!([{ "name": "notes", "type": "table", "rowCount": 0 }])
    );

    let failed = http
        .call_tool(&second, "query", json!({ "sql": "SELECT * FROM nowhere" }))
        .await;
    assert_eq!(failed["isError"], true);
    assert!(http.registry.is_empty());
    println!("     ✓ Sessions on the same target see each other's writes");
}

pub async fn test_target_headers(ctx: &TestContext) {
    println!("  🧪 test_target_headers");
    let other = ctx.db_path("http_header_target");
    let other_path = other.display().to_string();

    let locked = ctx.http("http_locked", McpConfig::default());
    let id = locked
        .initialize(&[("x-database-path", other_path.as_str())])
        .await;
    locked
        .call_tool(
            &id,
            "create_table",
            json!({ "table": "ignored", "columns": [{ "name": "x", "type": "TEXT" }] }),
        )
        .await;
    assert!(!other.exists(), "headers must be ignored unless allowed");

    let open = ctx.http(
        "http_open",
        McpConfig {
            allow_target_headers: true,
            ..Default::default()
        },
    );

    // Header paths never create files.
    let early = open
        .initialize(&[("x-database-path", other_path.as_str())])
        .await;
    let failed = open.call_tool(&early, "list_tables", json!({})).await;
    assert_eq!(failed["isError"], true);
    assert!(!other.exists(), "a header path must not create a database");

    std::fs::File::create(&other).expect("create target file");
    let id = open
        .initialize(&[("x-database-path", other_path.as_str())])
        .await;
    let created = open
        .call_tool(
            &id,
            "create_table",
            json!({ "table": "routed", "columns": [{ "name": "x", "type": "TEXT" }] }),
        )
        .await;
    assert_eq!(envelope_payload(&created)["table"], "routed");
    assert_eq!(open.registry.len(), 1);

    let default_session = open.initialize(&[]).await;
    let listed = open.call_tool(&default_session, "list_tables", json!({})).await;
    assert_eq!(envelope_payload(&listed)["tables"], json!([]));

    // The shared resolver goes away with the last session that uses it.
    assert_eq!(open.send(delete_request(Some(&early))).await.status(), StatusCode::OK);
    assert_eq!(open.registry.len(), 1);
    assert_eq!(open.send(delete_request(Some(&id))).await.status(), StatusCode::OK);
    assert!(open.registry.is_empty());
    println!("     ✓ Per-session target headers honoured only when enabled");
}

pub async fn test_delete_ends_session(ctx: &TestContext) {
    println!("  🧪 test_delete_ends_session");
    let http = ctx.http("http_delete", McpConfig::default());
    let id = http.initialize(&[]).await;

    let stream = http
        .send(
            Request::builder()
                .uri("/mcp")
                .header(SESSION_HEADER, &id)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(stream.status(), StatusCode::OK);

    assert_eq!(http.send(delete_request(Some(&id))).await.status(), StatusCode::OK);
    assert_eq!(
        http.send(delete_request(Some(&id))).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        http.send(delete_request(None)).await.status(),
        StatusCode::BAD_REQUEST
    );

    let events = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(stream.into_body(), usize::MAX),
    )
    .await
    .expect("event stream should end with the session")
    .expect("event stream body");
    let events = String::from_utf8_lossy(&events);
    assert!(events.contains("event: close"), "got: {events}");

    let after = http
        .post(Some(&id), json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }))
        .await;
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
    assert!(http.state.sessions().is_empty().await);
    println!("     ✓ DELETE closes the event stream; later requests get 404");
}

pub async fn test_dropped_stream_ends_session(ctx: &TestContext) {
    println!("  🧪 test_dropped_stream_ends_session");
    let http = ctx.http("http_stream_drop", McpConfig::default());
    let id = http.initialize(&[]).await;

    let stream = http
        .send(
            Request::builder()
                .uri("/mcp")
                .header(SESSION_HEADER, &id)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(stream.status(), StatusCode::OK);
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !http.state.sessions().is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session should end with its event stream");

    let after = http
        .post(Some(&id), json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }))
        .await;
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
    println!("     ✓ Dropping the event stream closes the session");
}

pub async fn test_idle_sessions_expire(ctx: &TestContext) {
    println!("  🧪 test_idle_sessions_expire");
    let target = ctx.db_path("http_idle_target");
    std::fs::File::create(&target).expect("create target file");
    let target = target.display().to_string();

    let http = ctx.http(
        "http_idle",
        McpConfig {
            allow_target_headers: true,
            ..Default::default()
        },
    );
    let id = http.initialize(&[("x-database-path", target.as_str())]).await;
    assert_eq!(http.registry.len(), 1);

    assert_eq!(http.state.expire_idle(Duration::from_secs(3600)).await, 0);
    assert_eq!(http.state.expire_idle(Duration::ZERO).await, 1);
    assert!(http.state.sessions().is_empty().await);
    assert!(http.registry.is_empty());

    let after = http
        .post(Some(&id), json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }))
        .await;
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
    println!("     ✓ Idle sessions expire and release their resolver");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n📦 HTTP SESSIONS");
    test_initialize_creates_session(ctx).await;
    test_session_errors(ctx).await;
    test_invalid_initialize_opens_no_session(ctx).await;
    test_notifications_are_accepted(ctx).await;
    test_tool_calls_share_target(ctx).await;
    test_target_headers(ctx).await;
    test_delete_ends_session(ctx).await;
    test_dropped_stream_ends_session(ctx).await;
    test_idle_sessions_expire(ctx).await;
}
