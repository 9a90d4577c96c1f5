//! `interrupt` category: the checkpoint engine's human-in-the-loop surface.

use super::{opt_i64, require_str, Capability, DispatchContext, Resolution, ToolCategory, ToolResolver, ToolSpec};
use crate::error::RoomResult;
use crate::room::Room;
use async_trait::async_trait;
use serde_json::{json, Value};

static SPECS: &[ToolSpec] = &[
    ToolSpec { name: "checkpoint_save", description: "Save a checkpoint for a task", category: ToolCategory::Interrupt, permission: Capability::CanClaim, required_fields: &["task_id", "action", "agent"] },
    ToolSpec { name: "checkpoint_interrupt", description: "Interrupt a task pending human review", category: ToolCategory::Interrupt, permission: Capability::CanClaim, required_fields: &["task_id", "action", "agent", "message"] },
    ToolSpec { name: "checkpoint_approve", description: "Approve the latest interrupted checkpoint", category: ToolCategory::Interrupt, permission: Capability::CanManageAgents, required_fields: &["task_id"] },
    ToolSpec { name: "checkpoint_reject", description: "Reject the latest interrupted checkpoint", category: ToolCategory::Interrupt, permission: Capability::CanManageAgents, required_fields: &["task_id", "reason"] },
    ToolSpec { name: "checkpoint_branch", description: "Fork a new lineage from a prior step", category: ToolCategory::Interrupt, permission: Capability::CanClaim, required_fields: &["task_id", "source_step", "branch_name", "agent"] },
    ToolSpec { name: "checkpoint_revert", description: "Revert to a prior step", category: ToolCategory::Interrupt, permission: Capability::CanManageAgents, required_fields: &["task_id", "target_step"] },
    ToolSpec { name: "checkpoint_pending", description: "List interrupted checkpoints awaiting review", category: ToolCategory::Interrupt, permission: Capability::CanReadState, required_fields: &[] },
];

pub struct InterruptResolver;

#[async_trait]
impl ToolResolver for InterruptResolver {
    fn specs(&self) -> &'static [ToolSpec] {
        SPECS
    }

    async fn try_dispatch(&self, room: &Room, _ctx: &DispatchContext, name: &str, args: &Value) -> RoomResult<Resolution> {
        let value = match name {
            "checkpoint_save" => {
                let state = args.get("state").cloned();
                json!(
                    room.save_checkpoint(require_str(args, "task_id")?, require_str(args, "action")?, require_str(args, "agent")?, state, None)
                        .await?
                )
            }
            "checkpoint_interrupt" => json!(
                room.interrupt_checkpoint(
                    require_str(args, "task_id")?,
                    require_str(args, "action")?,
                    require_str(args, "agent")?,
                    require_str(args, "message")?,
                )
                .await?
            ),
            "checkpoint_approve" => {
                let edited = args.get("state").cloned();
                json!(room.approve_checkpoint(require_str(args, "task_id")?, edited).await?)
            }
            "checkpoint_reject" => json!(room.reject_checkpoint(require_str(args, "task_id")?, require_str(args, "reason")?).await?),
            "checkpoint_branch" => {
                let source_step = super::require_i64(args, "source_step")? as u64;
                json!(
                    room.branch_checkpoint(require_str(args, "task_id")?, source_step, require_str(args, "branch_name")?, require_str(args, "agent")?)
                        .await?
                )
            }
            "checkpoint_revert" => {
                let target_step = super::require_i64(args, "target_step")? as u64;
                json!(room.revert_checkpoint(require_str(args, "task_id")?, target_step).await?)
            }
            "checkpoint_pending" => {
                let timeout_min = opt_i64(args, "timeout_min", 30);
                json!(room.pending_checkpoints(timeout_min).await?)
            }
            _ => return Ok(Resolution::NotMine),
        };
        Ok(Resolution::Handled(value))
    }
}
