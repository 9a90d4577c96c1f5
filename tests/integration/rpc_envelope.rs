//! JSON-RPC 2.0 envelope behavior independent of any particular tool:
//! batching, notifications, parse errors, unknown methods.

use crate::common::test_client;
use rocket::http::{ContentType, Status};

#[test]
fn initialize_negotiates_known_protocol_version() {
    let client = test_client();
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {"protocolVersion": "2024-11-05"},
    });
    let res = client.post("/mcp").header(ContentType::JSON).body(body.to_string()).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let value: serde_json::Value = res.into_json().unwrap();
    assert_eq!(value["result"]["protocolVersion"], "2024-11-05");
}

#[test]
fn initialize_rejects_unknown_protocol_version() {
    let client = test_client();
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {"protocolVersion": "1999-01-01"},
    });
    let res = client.post("/mcp").header(ContentType::JSON).body(body.to_string()).dispatch();
    let value: serde_json::Value = res.into_json().unwrap();
    assert_eq!(value["error"]["code"], -32600);
}

#[test]
fn unknown_method_reports_method_not_found() {
    let client = test_client();
    let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "nonexistent/thing"});
    let res = client.post("/mcp").header(ContentType::JSON).body(body.to_string()).dispatch();
    let value: serde_json::Value = res.into_json().unwrap();
    assert_eq!(value["error"]["code"], -32601);
}

#[test]
fn malformed_body_yields_parse_error() {
    let client = test_client();
    let res = client.post("/mcp").header(ContentType::JSON).body("not json at all").dispatch();
    let value: serde_json::Value = res.into_json().unwrap();
    assert_eq!(value["error"]["code"], -32700);
    assert_eq!(value["id"], serde_json::Value::Null);
}

#[test]
fn notification_without_id_gets_no_response_body() {
    let client = test_client();
    let body = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    let res = client.post("/mcp").header(ContentType::JSON).body(body.to_string()).dispatch();
    assert_eq!(res.status(), Status::Accepted);
}

#[test]
fn batch_request_returns_array_of_responses() {
    let client = test_client();
    let body = serde_json::json!([
        {"jsonrpc": "2.0", "id": 1, "method": "ping"},
        {"jsonrpc": "2.0", "id": 2, "method": "ping"},
    ]);
    let res = client.post("/mcp").header(ContentType::JSON).body(body.to_string()).dispatch();
    let value: serde_json::Value = res.into_json().unwrap();
    let array = value.as_array().unwrap();
    assert_eq!(array.len(), 2);
}

#[test]
fn tools_list_reflects_standard_mode() {
    let client = test_client();
    let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let res = client.post("/mcp").header(ContentType::JSON).body(body.to_string()).dispatch();
    let value: serde_json::Value = res.into_json().unwrap();
    let tools = value["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "join"));
    assert!(tools.iter().any(|t| t["name"] == "broadcast"));
}
