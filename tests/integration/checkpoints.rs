//! Human-in-the-loop checkpoint state machine over the `interrupt` category.

use crate::common::{call_tool, test_client};
use serde_json::json;

#[test]
fn interrupt_then_approve_round_trip() {
    let client = test_client();
    call_tool(&client, "claude", "add_task", json!({"title": "risky migration", "priority": 1, "id": "t1"}));

    let saved = call_tool(&client, "claude", "checkpoint_save", json!({"task_id": "t1", "action": "ran migration step 1", "agent": "claude"}));
    assert_eq!(saved["result"]["status"], "pending");

    let interrupted = call_tool(
        &client,
        "claude",
        "checkpoint_interrupt",
        json!({"task_id": "t1", "action": "about to drop a column", "agent": "claude", "message": "please review before I continue"}),
    );
    assert_eq!(interrupted["result"]["status"], "interrupted");

    let pending = call_tool(&client, "claude", "checkpoint_pending", json!({}));
    let list = pending["result"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["task_id"], "t1");

    let approved = call_tool(&client, "claude", "checkpoint_approve", json!({"task_id": "t1"}));
    assert_eq!(approved["result"]["status"], "completed");
}

#[test]
fn interrupt_then_reject_records_reason() {
    let client = test_client();
    call_tool(&client, "claude", "add_task", json!({"title": "risky op", "priority": 1, "id": "t2"}));
    call_tool(&client, "claude", "checkpoint_save", json!({"task_id": "t2", "action": "step 1", "agent": "claude"}));
    call_tool(&client, "claude", "checkpoint_interrupt", json!({"task_id": "t2", "action": "step 2", "agent": "claude", "message": "needs a human"}));

    let rejected = call_tool(&client, "claude", "checkpoint_reject", json!({"task_id": "t2", "reason": "not safe yet"}));
    assert_eq!(rejected["result"]["status"], "rejected");
    assert_eq!(rejected["result"]["reject_reason"], "not safe yet");
}

#[test]
fn branch_creates_new_lineage_from_prior_step() {
    let client = test_client();
    call_tool(&client, "claude", "add_task", json!({"title": "experiment", "priority": 2, "id": "t3"}));
    call_tool(&client, "claude", "checkpoint_save", json!({"task_id": "t3", "action": "baseline", "agent": "claude"}));

    let branched = call_tool(&client, "claude", "checkpoint_branch", json!({"task_id": "t3", "source_step": 1, "branch_name": "try-alt-approach", "agent": "claude"}));
    assert_eq!(branched["result"]["status"], "pending");
    assert_eq!(branched["result"]["branch_name"], "try-alt-approach");

    let pending = call_tool(&client, "claude", "list_tasks", json!({}));
    assert!(pending["result"].as_array().unwrap().iter().any(|t| t["id"] == "t3"));
}
