use std::sync::Arc;

use serde_json::{json, Value};

use switchboard_mcp::{
    Dispatcher, McpServer, Registry, TokenGate, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR, UNAUTHORIZED,
};
use switchboard_test_support::fixtures::{request_line, sample_registry};
use switchboard_test_support::{Journal, McpTestHarness};

fn harness(journal: &Journal) -> McpTestHarness {
    McpTestHarness::new(Dispatcher::new(Arc::new(sample_registry(journal))))
}

fn error_code(response: &Value) -> i64 {
    response["error"]["code"].as_i64().expect("response has no error code")
}

// ---------------------------------------------------------------------------
// JSON-RPC envelope handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_echoes_version_and_id() {
    let mut h = harness(&Journal::new());
    let resp = h.send_request("abc-1", "ping", json!({})).await;
    assert_eq!(resp["jsonrpc"], "2.0");
    assert_eq!(resp["id"], "abc-1");
    assert_eq!(resp["result"], json!({}));
    assert!(resp.get("error").is_none());
}

#[tokio::test]
async fn unknown_method_returns_method_not_found() {
    let mut h = harness(&Journal::new());
    let resp = h.send_request(1, "tools/explode", json!({})).await;
    assert_eq!(error_code(&resp), METHOD_NOT_FOUND as i64);
    assert!(resp.get("result").is_none());
}

#[tokio::test]
async fn malformed_json_returns_parse_error_with_null_id() {
    let mut h = harness(&Journal::new());
    h.send_line("{\"jsonrpc\": \"2.0\", \"id\": 1,").await;
    let resp = h.recv_json().await;
    assert_eq!(error_code(&resp), PARSE_ERROR as i64);
    assert_eq!(resp["id"], Value::Null);
}

#[tokio::test]
async fn wrong_version_returns_invalid_request() {
    let mut h = harness(&Journal::new());
    h.send_line(r#"{"jsonrpc":"1.0","id":9,"method":"ping"}"#).await;
    let resp = h.recv_json().await;
    assert_eq!(error_code(&resp), INVALID_REQUEST as i64);
    assert_eq!(resp["id"], 9);
}

#[tokio::test]
async fn missing_method_returns_invalid_request() {
    let mut h = harness(&Journal::new());
    h.send_line(r#"{"jsonrpc":"2.0","id":3}"#).await;
    let resp = h.recv_json().await;
    assert_eq!(error_code(&resp), INVALID_REQUEST as i64);
}

#[tokio::test]
async fn notification_gets_no_response_but_runs() {
    let journal = Journal::new();
    let mut h = harness(&journal);
    h.send_line(r#"{"jsonrpc":"2.0","id":null,"method":"tools/call","params":{"name":"ordered"}}"#)
        .await;
    // The next response must belong to the follow-up request.
    let resp = h.send_request(2, "ping", json!({})).await;
    assert_eq!(resp["id"], 2);

    let responses = h.finish().await;
    assert!(responses.is_empty());
    assert_eq!(journal.count("handler:ordered"), 1);
}

#[tokio::test]
async fn oversized_message_rejected() {
    let server = McpServer::new(Arc::new(Dispatcher::new(Arc::new(Registry::new()))))
        .with_max_message_size(64);
    let mut h = McpTestHarness::with_server(server);
    let padding = "x".repeat(100);
    h.send_line(&request_line(1, "ping", json!({ "padding": padding })))
        .await;
    let resp = h.recv_json().await;
    assert_eq!(error_code(&resp), INVALID_REQUEST as i64);
    assert_eq!(resp["id"], Value::Null);
}

#[tokio::test]
async fn server_keeps_serving_after_oversized_line() {
    let server = McpServer::new(Arc::new(Dispatcher::new(Arc::new(Registry::new()))))
        .with_max_message_size(64);
    let mut h = McpTestHarness::with_server(server);
    let padding = "x".repeat(10_000);
    h.send_line(&request_line(1, "ping", json!({ "padding": padding })))
        .await;
    let rejected = h.recv_json().await;
    assert_eq!(error_code(&rejected), INVALID_REQUEST as i64);

    let resp = h.send_request(2, "ping", json!({})).await;
    assert_eq!(resp["id"], 2);
    assert_eq!(resp["result"], json!({}));
}

#[tokio::test]
async fn invalid_utf8_line_is_parse_error_and_stream_continues() {
    let mut h = harness(&Journal::new());
    h.send_bytes(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"p\xffing\"}\n")
        .await;
    let resp = h.recv_json().await;
    assert_eq!(error_code(&resp), PARSE_ERROR as i64);
    assert_eq!(resp["id"], Value::Null);

    let resp = h.send_request(2, "ping", json!({})).await;
    assert_eq!(resp["id"], 2);
    assert!(h.finish().await.is_empty());
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let mut h = harness(&Journal::new());
    h.send_line("").await;
    h.send_line("   ").await;
    let resp = h.send_request(1, "ping", json!({})).await;
    assert_eq!(resp["id"], 1);
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_answers_in_request_order() {
    let mut h = harness(&Journal::new());
    h.send_line(
        concat!(
            r#"[{"jsonrpc":"2.0","id":1,"method":"tools/list"},"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}]"#,
        ),
    )
    .await;
    let resp = h.recv_json().await;
    let items = resp.as_array().expect("batch response is an array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], 1);
    assert!(items[0]["result"]["tools"].is_array());
    assert_eq!(items[1]["id"], 2);
    assert!(items[1]["result"]["resources"].is_array());
}

#[tokio::test]
async fn batch_member_failure_is_contained() {
    let mut h = harness(&Journal::new());
    h.send_line(
        r#"[{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"nope"}},
            {"jsonrpc":"2.0","id":"b","method":"tools/call",
             "params":{"name":"add","arguments":{"a":1,"b":2}}},
            42,
            {"jsonrpc":"2.0","method":"notifications/initialized"}]"#
            .replace('\n', "")
            .as_str(),
    )
    .await;
    let resp = h.recv_json().await;
    let items = resp.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(error_code(&items[0]), METHOD_NOT_FOUND as i64);
    assert_eq!(items[1]["result"]["content"][0]["text"], "3");
    assert_eq!(error_code(&items[2]), INVALID_REQUEST as i64);
    assert_eq!(items[2]["id"], Value::Null);
}

#[tokio::test]
async fn empty_batch_is_invalid_request() {
    let mut h = harness(&Journal::new());
    h.send_line("[]").await;
    let resp = h.recv_json().await;
    assert!(resp.is_object());
    assert_eq!(error_code(&resp), INVALID_REQUEST as i64);
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_returns_capabilities() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "0.1.0" }
            }),
        )
        .await;
    let result = &resp["result"];
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "switchboard");
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["prompts"].is_object());
    assert_eq!(result["capabilities"]["resources"]["subscribe"], true);
}

#[tokio::test]
async fn tools_call_add_returns_sum() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(1, "tools/call", json!({"name": "add", "arguments": {"a": 5, "b": 3}}))
        .await;
    assert_eq!(resp["result"]["content"][0]["type"], "text");
    assert_eq!(resp["result"]["content"][0]["text"], "8");
}

#[tokio::test]
async fn tools_list_is_stable_and_lists_guarded_tools() {
    let mut h = harness(&Journal::new());
    let first = h.send_request(1, "tools/list", json!({})).await;
    let second = h.send_request(2, "tools/list", json!({})).await;
    assert_eq!(first["result"], second["result"]);

    let names: Vec<&str> = first["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add", "ordered", "guarded", "health", "flaky", "lookup"]);
    assert_eq!(first["result"]["tools"][0]["inputSchema"]["required"], json!(["a", "b"]));
}

#[tokio::test]
async fn tools_call_missing_argument_returns_invalid_params() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(1, "tools/call", json!({"name": "add", "arguments": {"a": 5}}))
        .await;
    assert_eq!(error_code(&resp), INVALID_PARAMS as i64);
    assert_eq!(resp["error"]["data"]["field"], "b");
}

#[tokio::test]
async fn unknown_tool_returns_method_not_found() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(1, "tools/call", json!({"name": "nonexistent_tool", "arguments": {}}))
        .await;
    assert_eq!(error_code(&resp), METHOD_NOT_FOUND as i64);
    assert_eq!(resp["error"]["message"], "Tool not found: nonexistent_tool");
}

#[tokio::test]
async fn handler_error_is_classified_by_message() {
    let mut h = harness(&Journal::new());
    let resp = h.send_request(1, "tools/call", json!({"name": "lookup"})).await;
    assert_eq!(error_code(&resp), METHOD_NOT_FOUND as i64);
    assert_eq!(resp["error"]["message"], "record not found");
}

#[tokio::test]
async fn resource_template_read_extracts_variable() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(1, "resources/read", json!({"uri": "file:///notes.md"}))
        .await;
    let contents = &resp["result"]["contents"][0];
    assert_eq!(contents["uri"], "file:///notes.md");
    assert_eq!(contents["mimeType"], "text/plain");
    assert_eq!(contents["text"], "contents of notes.md");
}

#[tokio::test]
async fn template_handler_validation_failure_is_invalid_params() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(1, "resources/read", json!({"uri": "user:///abc/profile"}))
        .await;
    assert_eq!(error_code(&resp), INVALID_PARAMS as i64);
}

#[tokio::test]
async fn extra_segment_does_not_match_template() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(1, "resources/read", json!({"uri": "file:///a/b"}))
        .await;
    assert_eq!(error_code(&resp), METHOD_NOT_FOUND as i64);
    assert_eq!(
        resp["error"]["data"]["availableTemplates"],
        json!(["file:///{filename}", "user:///{userId}/profile"])
    );
}

#[tokio::test]
async fn resource_templates_are_listed() {
    let mut h = harness(&Journal::new());
    let resp = h.send_request(1, "resources/templates/list", json!({})).await;
    let templates = resp["result"]["resourceTemplates"].as_array().unwrap();
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[1]["uriTemplate"], "user:///{userId}/profile");
}

#[tokio::test]
async fn prompt_get_builds_messages() {
    let mut h = harness(&Journal::new());
    let resp = h
        .send_request(1, "prompts/get", json!({"name": "greeting", "arguments": {"name": "Ada"}}))
        .await;
    let result = &resp["result"];
    assert_eq!(result["description"], "Greet someone by name");
    assert_eq!(result["messages"][0]["content"]["text"], "Please greet Ada warmly.");
}

// ---------------------------------------------------------------------------
// Guards and interceptors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interceptors_run_onion_style() {
    let journal = Journal::new();
    let mut h = harness(&journal);
    let resp = h.send_request(1, "tools/call", json!({"name": "ordered"})).await;
    assert_eq!(resp["result"]["content"][0]["text"], "done");
    assert_eq!(
        journal.entries(),
        vec!["A:before", "B:before", "handler:ordered", "B:after", "A:after"]
    );
}

#[tokio::test]
async fn denying_guard_blocks_interceptors_and_handler() {
    let journal = Journal::new();
    let mut h = harness(&journal);
    let resp = h.send_request(1, "tools/call", json!({"name": "guarded"})).await;
    assert_eq!(error_code(&resp), UNAUTHORIZED as i64);
    assert_eq!(resp["error"]["data"]["guard"], "second");
    assert!(resp.get("result").is_none());
    assert_eq!(journal.entries(), vec!["guard:first", "guard:second"]);
}

#[tokio::test]
async fn retry_interceptor_recovers_flaky_handler() {
    let mut h = harness(&Journal::new());
    let resp = h.send_request(1, "tools/call", json!({"name": "flaky"})).await;
    assert_eq!(resp["result"]["content"][0]["text"], "recovered");
}

// ---------------------------------------------------------------------------
// Transport authentication
// ---------------------------------------------------------------------------

fn gated_harness() -> McpTestHarness {
    let dispatcher = Dispatcher::builder(Arc::new(sample_registry(&Journal::new())))
        .gate(TokenGate::new("s3cret"))
        .build();
    McpTestHarness::new(dispatcher)
}

#[tokio::test]
async fn token_required_for_private_operations() {
    let mut h = gated_harness();
    let resp = h
        .send_request(1, "tools/call", json!({"name": "add", "arguments": {"a": 1, "b": 1}}))
        .await;
    assert_eq!(error_code(&resp), UNAUTHORIZED as i64);

    let resp = h
        .send_request(
            2,
            "tools/call",
            json!({"name": "add", "arguments": {"a": 1, "b": 1}, "_meta": {"authToken": "s3cret"}}),
        )
        .await;
    assert_eq!(resp["result"]["content"][0]["text"], "2");
}

#[tokio::test]
async fn public_operation_and_handshake_skip_token() {
    let mut h = gated_harness();
    let resp = h.send_request(1, "initialize", json!({})).await;
    assert!(resp.get("result").is_some());
    let resp = h.send_request(2, "tools/call", json!({"name": "health"})).await;
    assert_eq!(resp["result"]["content"][0]["text"], "ok");
}

#[tokio::test]
async fn in_flight_requests_are_answered_after_eof() {
    let mut h = harness(&Journal::new());
    for id in 1..=5 {
        let params = json!({"name": "add", "arguments": {"a": id, "b": 0}});
        h.send_line(&request_line(id, "tools/call", params)).await;
    }
    let responses = h.finish().await;
    let mut ids: Vec<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert!(responses.iter().all(|r| r["error"].is_null()));
}
