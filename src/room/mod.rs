//! C2 — the room state store. Transactional domain operations over the
//! C1 `Store` trait: every mutating method here reads current state,
//! computes the next state, and commits with `compare_and_put` on a
//! per-entity version key, retrying from a fresh read on conflict (per
//! spec.md §4.2). This generalizes the teacher's single
//! `Mutex<rusqlite::Connection>` (one global lock, no retry needed
//! because SQLite serializes everything) into an optimistic-concurrency
//! scheme that also works against the networked backends.

pub mod agents;
pub mod checkpoints;
pub mod locks;
pub mod messages;
pub mod model;
pub mod orchestrator;
pub mod tasks;

use crate::config::RoomConfig;
use crate::error::{RoomError, RoomResult};
use crate::session::SessionHub;
use crate::storage::Store;
use std::sync::Arc;

pub trait CostSink: Send + Sync {
    fn log_cost(&self, agent: &str, model: &str, tokens_in: u64, tokens_out: u64, cost_usd: f64);
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, name: &str, value: f64);
}

pub struct NullSink;
impl CostSink for NullSink {
    fn log_cost(&self, _agent: &str, _model: &str, _tokens_in: u64, _tokens_out: u64, _cost_usd: f64) {}
}
impl MetricsSink for NullSink {
    fn record(&self, _name: &str, _value: f64) {}
}

/// The unit of consistency: one room owns its own store, event hub, and
/// sequence counter for its lifetime (spec.md §9 "global mutable state is
/// injected, not ambient").
pub struct Room {
    pub store: Arc<dyn Store>,
    pub hub: Arc<SessionHub>,
    pub config: RoomConfig,
    pub cost_sink: Arc<dyn CostSink>,
    pub metrics_sink: Arc<dyn MetricsSink>,
}

impl Room {
    pub fn new(store: Arc<dyn Store>, hub: Arc<SessionHub>, config: RoomConfig) -> Self {
        Self {
            store,
            hub,
            config,
            cost_sink: Arc::new(NullSink),
            metrics_sink: Arc::new(NullSink),
        }
    }

    pub fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

/// Retry a compare-and-put-based transaction up to `MAX_ATTEMPTS` times
/// before surfacing `RoomError::Conflict`, per spec.md §4.2.
pub(crate) const MAX_ATTEMPTS: u32 = 5;

pub(crate) async fn retry_txn<T, F, Fut>(mut attempt: F) -> RoomResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = RoomResult<Option<T>>>,
{
    for _ in 0..MAX_ATTEMPTS {
        if let Some(value) = attempt().await? {
            return Ok(value);
        }
    }
    Err(RoomError::Conflict)
}

/// Validates an agent name: 1–64 chars, alphanumeric + dash + underscore.
pub fn validate_agent_name(name: &str) -> RoomResult<()> {
    if name.is_empty()
        || name.len() > 64
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RoomError::InvalidAgentName);
    }
    Ok(())
}

/// Normalizes and validates a file path: relative, no `..`, no null bytes.
pub fn normalize_file_path(path: &str) -> RoomResult<String> {
    if path.is_empty() || path.contains('\0') || path.starts_with('/') || path.contains("..") {
        return Err(RoomError::InvalidFilePath);
    }
    Ok(path.trim_start_matches("./").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_name_boundaries() {
        assert!(validate_agent_name("").is_err());
        assert!(validate_agent_name(&"a".repeat(65)).is_err());
        assert!(validate_agent_name(&"a".repeat(64)).is_ok());
        assert!(validate_agent_name("claude-1_x").is_ok());
        assert!(validate_agent_name("bad name").is_err());
    }

    #[test]
    fn file_path_boundaries() {
        assert!(normalize_file_path("../etc").is_err());
        assert!(normalize_file_path("/tmp/x").is_err());
        assert!(normalize_file_path("src/main.rs").is_ok());
        assert!(normalize_file_path("").is_err());
    }
}
