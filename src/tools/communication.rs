//! `communication` category: broadcast messages and recent history.

use super::{opt_i64, require_str, Capability, DispatchContext, Resolution, ToolCategory, ToolResolver, ToolSpec};
use crate::error::RoomResult;
use crate::room::Room;
use async_trait::async_trait;
use serde_json::{json, Value};

static SPECS: &[ToolSpec] = &[
    ToolSpec { name: "broadcast", description: "Broadcast a message to the room", category: ToolCategory::Communication, permission: Capability::CanBroadcast, required_fields: &["agent", "content"] },
    ToolSpec { name: "recent_messages", description: "Fetch recent broadcast messages", category: ToolCategory::Communication, permission: Capability::CanReadState, required_fields: &[] },
];

pub struct CommunicationResolver;

#[async_trait]
impl ToolResolver for CommunicationResolver {
    fn specs(&self) -> &'static [ToolSpec] {
        SPECS
    }

    async fn try_dispatch(&self, room: &Room, _ctx: &DispatchContext, name: &str, args: &Value) -> RoomResult<Resolution> {
        let value = match name {
            "broadcast" => json!(room.broadcast(require_str(args, "agent")?, require_str(args, "content")?).await?),
            "recent_messages" => {
                let limit = opt_i64(args, "limit", 50).max(0) as usize;
                json!(room.recent_messages(limit).await?)
            }
            _ => return Ok(Resolution::NotMine),
        };
        Ok(Resolution::Handled(value))
    }
}
