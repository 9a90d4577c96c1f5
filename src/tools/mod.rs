//! C3 — tool registry & dispatcher. Tools are grouped into categories
//! that a session's mode config enables or disables, and dispatch walks
//! a chain of resolver modules — each inspects the tool name and either
//! handles it or returns `NotMine`, so the registry grows by adding a
//! resolver rather than widening a single match (spec.md §4.3).

mod communication;
mod core;
mod discovery;
mod health;
mod interrupt;
mod stub;

use crate::error::{RoomError, RoomResult};
use crate::room::model::Role;
use crate::room::Room;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Core,
    Communication,
    Portal,
    Worktree,
    Health,
    Discovery,
    Voting,
    Interrupt,
    Cost,
    Auth,
    RateLimit,
    Encryption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CanReadState,
    CanClaim,
    CanBroadcast,
    CanManageAgents,
    CanAdmin,
}

impl Capability {
    /// `reader ⊂ worker ⊂ admin` (spec.md §4.9).
    pub fn minimum_role(&self) -> Role {
        match self {
            Capability::CanReadState => Role::Reader,
            Capability::CanClaim | Capability::CanBroadcast => Role::Worker,
            Capability::CanManageAgents | Capability::CanAdmin => Role::Admin,
        }
    }
}

/// Static description of a tool, used both for `tools/list` and to gate
/// dispatch before the handler ever runs.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub category: ToolCategory,
    pub permission: Capability,
    pub required_fields: &'static [&'static str],
}

/// Which tool categories a session has enabled (spec.md §4.3 mode config).
#[derive(Debug, Clone)]
pub enum ToolMode {
    Full,
    Standard,
    Minimal,
    Solo,
    Parallel,
    Custom(HashSet<ToolCategory>),
}

impl ToolMode {
    pub fn enables(&self, category: ToolCategory) -> bool {
        use ToolCategory::*;
        match self {
            ToolMode::Full => true,
            ToolMode::Standard => !matches!(category, Portal | Worktree | Voting | Cost | Encryption),
            ToolMode::Minimal => matches!(category, Core | Health),
            ToolMode::Solo => matches!(category, Core | Health | Interrupt),
            ToolMode::Parallel => matches!(category, Core | Communication | Health | Discovery | Interrupt),
            ToolMode::Custom(set) => set.contains(&category),
        }
    }
}

/// Per-request context the dispatcher hands to every resolver: the
/// calling agent's identity and role (post auth-gate, C9) and the
/// session's negotiated protocol version.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub agent: Option<String>,
    pub role: Role,
    pub mode: ToolModeRef,
}

/// Cheaply cloneable handle so `DispatchContext` itself stays `Clone`.
pub type ToolModeRef = std::sync::Arc<ToolMode>;

pub enum Resolution {
    Handled(Value),
    NotMine,
}

#[async_trait]
pub trait ToolResolver: Send + Sync {
    fn specs(&self) -> &'static [ToolSpec];

    async fn try_dispatch(
        &self,
        room: &Room,
        ctx: &DispatchContext,
        name: &str,
        args: &Value,
    ) -> RoomResult<Resolution>;
}

pub struct ToolRegistry {
    chain: Vec<Box<dyn ToolResolver>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            chain: vec![
                Box::new(core::CoreResolver),
                Box::new(communication::CommunicationResolver),
                Box::new(health::HealthResolver),
                Box::new(discovery::DiscoveryResolver),
                Box::new(interrupt::InterruptResolver),
                Box::new(stub::StubResolver),
            ],
        }
    }

    /// Tool specs visible to a session with the given mode.
    pub fn list_tools(&self, mode: &ToolMode) -> Vec<&'static ToolSpec> {
        self.chain
            .iter()
            .flat_map(|r| r.specs())
            .filter(|spec| mode.enables(spec.category))
            .collect()
    }

    fn find_spec(&self, name: &str) -> Option<&'static ToolSpec> {
        self.chain.iter().flat_map(|r| r.specs()).find(|s| s.name == name)
    }

    /// Tool category for `name`, used by the C9 rate-limit gate to pick
    /// the right bucket before dispatch runs.
    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.find_spec(name).map(|spec| spec.category)
    }

    fn validate(spec: &ToolSpec, args: &Value) -> RoomResult<()> {
        for field in spec.required_fields {
            if args.get(*field).is_none() {
                return Err(RoomError::InvalidParams { field: field.to_string() });
            }
        }
        Ok(())
    }

    pub async fn dispatch(&self, room: &Room, ctx: &DispatchContext, name: &str, args: &Value) -> RoomResult<Value> {
        let spec = self.find_spec(name).ok_or_else(|| RoomError::MethodNotFound { name: name.to_string() })?;
        if !ctx.mode.enables(spec.category) {
            return Err(RoomError::MethodNotFound { name: name.to_string() });
        }
        if ctx.role < spec.permission.minimum_role() {
            return Err(RoomError::PermissionDenied);
        }
        Self::validate(spec, args)?;
        for resolver in &self.chain {
            match resolver.try_dispatch(room, ctx, name, args).await? {
                Resolution::Handled(value) => return Ok(value),
                Resolution::NotMine => continue,
            }
        }
        Err(RoomError::MethodNotFound { name: name.to_string() })
    }
}

pub(crate) fn require_str<'a>(args: &'a Value, field: &str) -> RoomResult<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RoomError::InvalidParams { field: field.to_string() })
}

pub(crate) fn opt_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(Value::as_str)
}

pub(crate) fn require_i64(args: &Value, field: &str) -> RoomResult<i64> {
    args.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| RoomError::InvalidParams { field: field.to_string() })
}

pub(crate) fn opt_i64(args: &Value, field: &str, default: i64) -> i64 {
    args.get(field).and_then(Value::as_i64).unwrap_or(default)
}

pub(crate) fn opt_u64(args: &Value, field: &str, default: u64) -> u64 {
    args.get(field).and_then(Value::as_u64).unwrap_or(default)
}

pub(crate) fn opt_str_vec(args: &Value, field: &str) -> Vec<String> {
    args.get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}
