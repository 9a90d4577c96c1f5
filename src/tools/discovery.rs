//! `discovery` category: room capability introspection. `tools/list`
//! itself is served directly by the JSON-RPC handler via
//! `ToolRegistry::list_tools` rather than through the dispatch chain,
//! since it needs the registry, not a single room.

use super::{Capability, DispatchContext, Resolution, ToolCategory, ToolResolver, ToolSpec};
use crate::config::SUPPORTED_PROTOCOL_VERSIONS;
use crate::error::RoomResult;
use crate::room::Room;
use async_trait::async_trait;
use serde_json::{json, Value};

static SPECS: &[ToolSpec] = &[
    ToolSpec { name: "capabilities", description: "Describe supported protocol versions and storage backend", category: ToolCategory::Discovery, permission: Capability::CanReadState, required_fields: &[] },
];

pub struct DiscoveryResolver;

#[async_trait]
impl ToolResolver for DiscoveryResolver {
    fn specs(&self) -> &'static [ToolSpec] {
        SPECS
    }

    async fn try_dispatch(&self, room: &Room, _ctx: &DispatchContext, name: &str, _args: &Value) -> RoomResult<Resolution> {
        if name != "capabilities" {
            return Ok(Resolution::NotMine);
        }
        Ok(Resolution::Handled(json!({
            "protocol_versions": SUPPORTED_PROTOCOL_VERSIONS,
            "default_protocol_version": room.config.protocol_version_default,
            "storage": format!("{:?}", room.config.storage),
        })))
    }
}
