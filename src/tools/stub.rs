//! Tail resolver for categories SPEC_FULL.md scopes out of this build
//! (`portal`, `worktree`, `voting`, `cost`, `encryption`). Each tool name
//! still appears in `tools/list` when its category is enabled, so a
//! client can discover it — calling it yields `NotInitialized` rather
//! than `MethodNotFound`, signalling "known but not wired up" instead of
//! "unknown tool".

use super::{Capability, DispatchContext, Resolution, ToolCategory, ToolResolver, ToolSpec};
use crate::error::{RoomError, RoomResult};
use crate::room::Room;
use async_trait::async_trait;
use serde_json::Value;

static SPECS: &[ToolSpec] = &[
    ToolSpec { name: "portal_open", description: "Open a review portal (not enabled in this deployment)", category: ToolCategory::Portal, permission: Capability::CanReadState, required_fields: &[] },
    ToolSpec { name: "worktree_create", description: "Create an isolated git worktree (not enabled in this deployment)", category: ToolCategory::Worktree, permission: Capability::CanClaim, required_fields: &[] },
    ToolSpec { name: "vote_cast", description: "Cast a vote on a pending decision (not enabled in this deployment)", category: ToolCategory::Voting, permission: Capability::CanBroadcast, required_fields: &[] },
    ToolSpec { name: "cost_report", description: "Report model token cost (not enabled in this deployment)", category: ToolCategory::Cost, permission: Capability::CanReadState, required_fields: &[] },
    ToolSpec { name: "encrypt_state", description: "Encrypt checkpoint state at rest (not enabled in this deployment)", category: ToolCategory::Encryption, permission: Capability::CanAdmin, required_fields: &[] },
];

pub struct StubResolver;

#[async_trait]
impl ToolResolver for StubResolver {
    fn specs(&self) -> &'static [ToolSpec] {
        SPECS
    }

    async fn try_dispatch(&self, _room: &Room, _ctx: &DispatchContext, name: &str, _args: &Value) -> RoomResult<Resolution> {
        if SPECS.iter().any(|s| s.name == name) {
            return Err(RoomError::NotInitialized);
        }
        Ok(Resolution::NotMine)
    }
}
