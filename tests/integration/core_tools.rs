//! Round-trips through the `core` tool category: presence, backlog, locks.

use crate::common::{call_tool, test_client};
use serde_json::json;

#[test]
fn join_is_idempotent_over_rpc() {
    let client = test_client();
    let first = call_tool(&client, "claude", "join", json!({"name": "claude", "capabilities": ["rust"]}));
    assert_eq!(first["result"]["name"], "claude");

    let second = call_tool(&client, "claude", "join", json!({"name": "claude", "capabilities": ["python"]}));
    assert_eq!(second["result"]["capabilities"], json!(["python"]));

    let listed = call_tool(&client, "claude", "list_agents", json!({}));
    assert_eq!(listed["result"].as_array().unwrap().len(), 1);
}

#[test]
fn task_lifecycle_backlog_to_done() {
    let client = test_client();
    call_tool(&client, "claude", "join", json!({"name": "claude"}));

    let added = call_tool(&client, "claude", "add_task", json!({"title": "write tests", "priority": 3}));
    let task_id = added["result"]["id"].as_str().unwrap().to_string();
    assert_eq!(added["result"]["status"]["state"], "backlog");

    let claimed = call_tool(&client, "claude", "claim", json!({"task_id": task_id, "agent": "claude"}));
    assert_eq!(claimed["result"]["status"]["state"], "claimed");

    let started = call_tool(&client, "claude", "start", json!({"task_id": task_id, "agent": "claude"}));
    assert_eq!(started["result"]["status"]["state"], "in_progress");

    let done = call_tool(&client, "claude", "done", json!({"task_id": task_id, "agent": "claude", "notes": "shipped"}));
    assert_eq!(done["result"]["status"]["state"], "done");
}

#[test]
fn claim_by_wrong_agent_is_rejected_then_claim_next_finds_it() {
    let client = test_client();
    let added = call_tool(&client, "a", "add_task", json!({"title": "urgent fix", "priority": 1}));
    let task_id = added["result"]["id"].as_str().unwrap().to_string();

    let claimed_by_a = call_tool(&client, "a", "claim", json!({"task_id": task_id, "agent": "a"}));
    assert_eq!(claimed_by_a["result"]["status"]["state"], "claimed");

    let claimed_by_b = call_tool(&client, "b", "claim", json!({"task_id": task_id, "agent": "b"}));
    assert!(claimed_by_b.get("error").is_some());

    let next = call_tool(&client, "b", "claim_next", json!({"agent": "b"}));
    assert!(next["result"].is_null());
}

#[test]
fn file_lock_contention_and_release() {
    let client = test_client();
    let acquired = call_tool(&client, "a", "lock_file", json!({"path": "src/main.rs", "agent": "a", "ttl_secs": 300}));
    assert!(acquired.get("error").is_none());

    let contended = call_tool(&client, "b", "lock_file", json!({"path": "src/main.rs", "agent": "b"}));
    assert!(contended.get("error").is_some());

    let released = call_tool(&client, "a", "unlock_file", json!({"path": "src/main.rs", "agent": "a"}));
    assert_eq!(released["result"]["ok"], true);

    let reacquired = call_tool(&client, "b", "lock_file", json!({"path": "src/main.rs", "agent": "b"}));
    assert!(reacquired.get("error").is_none());
}

#[test]
fn broadcast_and_recent_messages_round_trip() {
    let client = test_client();
    call_tool(&client, "claude", "join", json!({"name": "claude"}));
    call_tool(&client, "claude", "broadcast", json!({"agent": "claude", "content": "hello @team"}));

    let recent = call_tool(&client, "claude", "recent_messages", json!({"limit": 10}));
    let messages = recent["result"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["sender"], "claude");
}
