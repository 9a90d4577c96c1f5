//! `health` category: liveness, mirroring the teacher's `/health` route.

use super::{Capability, DispatchContext, Resolution, ToolCategory, ToolResolver, ToolSpec};
use crate::error::RoomResult;
use crate::room::Room;
use async_trait::async_trait;
use serde_json::{json, Value};

static SPECS: &[ToolSpec] = &[
    ToolSpec { name: "health", description: "Report server liveness", category: ToolCategory::Health, permission: Capability::CanReadState, required_fields: &[] },
];

pub struct HealthResolver;

#[async_trait]
impl ToolResolver for HealthResolver {
    fn specs(&self) -> &'static [ToolSpec] {
        SPECS
    }

    async fn try_dispatch(&self, room: &Room, _ctx: &DispatchContext, name: &str, _args: &Value) -> RoomResult<Resolution> {
        if name != "health" {
            return Ok(Resolution::NotMine);
        }
        let agents = room.list_agents().await?.len();
        let tasks = room.list_tasks().await?.len();
        Ok(Resolution::Handled(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "cluster": room.config.cluster_name,
            "agents": agents,
            "tasks": tasks,
        })))
    }
}
