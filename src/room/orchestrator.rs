//! C8 — the per-room tempo loop (spec.md §4.8). One background task
//! wakes on an adaptive interval, sweeps expired locks, ages agents,
//! records replay-ring depth, and runs the checkpoint timeout sweep.
//! Generalizes the teacher's `retention::spawn_retention_task` — a
//! single fixed-interval `tokio::spawn` loop that locks a connection,
//! sweeps, sleeps, repeats — into a multi-concern tick whose interval
//! itself is recomputed from current task urgency each time around.

use super::Room;
use std::sync::Arc;
use std::time::Duration;

/// Any non-terminal task at priority ≤ this is "urgent" for tempo purposes.
const URGENT_PRIORITY: i64 = 2;

const URGENT_INTERVAL: Duration = Duration::from_secs(60);
const BUSY_INTERVAL: Duration = Duration::from_secs(300);
const IDLE_INTERVAL: Duration = Duration::from_secs(600);

/// Default timeout before an interrupted checkpoint is auto-rejected.
const CHECKPOINT_TIMEOUT_MIN: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tempo {
    Urgent,
    Busy,
    Idle,
}

impl Tempo {
    fn interval(self) -> Duration {
        match self {
            Tempo::Urgent => URGENT_INTERVAL,
            Tempo::Busy => BUSY_INTERVAL,
            Tempo::Idle => IDLE_INTERVAL,
        }
    }
}

fn tempo_for(tasks: &[super::model::Task]) -> Tempo {
    let mut any_non_terminal = false;
    let mut any_urgent = false;
    for task in tasks {
        if task.status.is_terminal() {
            continue;
        }
        any_non_terminal = true;
        if task.priority <= URGENT_PRIORITY {
            any_urgent = true;
            break;
        }
    }
    match (any_urgent, any_non_terminal) {
        (true, _) => Tempo::Urgent,
        (false, true) => Tempo::Busy,
        (false, false) => Tempo::Idle,
    }
}

/// Runs one sweep: expired locks, stale-agent aging, checkpoint timeout
/// sweep, replay-ring depth metric. Returns the interval the next tick
/// should wait before running again.
async fn run_tick(room: &Room) -> Duration {
    if let Err(e) = room.store.tick().await {
        tracing::warn!(error = %e, "lock sweep failed");
    }

    match room.reap_stale_agents().await {
        Ok(n) if n > 0 => tracing::info!(count = n, "aged stale agents"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "agent aging sweep failed"),
    }

    room.metrics_sink.record("sse.ring_depth", room.hub.oldest_buffered_id().unwrap_or(0) as f64);

    match room.pending_checkpoints(CHECKPOINT_TIMEOUT_MIN).await {
        Ok(pending) => tracing::debug!(count = pending.len(), "checkpoint sweep complete"),
        Err(e) => tracing::warn!(error = %e, "checkpoint timeout sweep failed"),
    }

    let tasks = room.list_tasks().await.unwrap_or_default();
    tempo_for(&tasks).interval()
}

/// Spawns the tempo loop for `room`. The loop runs for the lifetime of
/// the returned handle; dropping the handle does not stop it — callers
/// rely on process shutdown, matching the teacher's fire-and-forget
/// retention task.
pub fn spawn(room: Arc<Room>) {
    tokio::spawn(async move {
        // Let the server finish starting up before the first sweep.
        tokio::time::sleep(Duration::from_secs(5)).await;
        loop {
            let next = run_tick(&room).await;
            tokio::time::sleep(next).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::room::model::TaskStatus;
    use crate::session::SessionHub;
    use crate::storage::sql::SqlStore;
    use std::sync::Arc;

    fn test_room() -> Room {
        let store = Arc::new(SqlStore::in_memory().unwrap());
        let hub = Arc::new(SessionHub::new(256));
        Room::new(store, hub, RoomConfig::default())
    }

    #[test]
    fn idle_with_no_tasks() {
        assert_eq!(tempo_for(&[]), Tempo::Idle);
    }

    #[test]
    fn busy_with_low_urgency_task() {
        let task = crate::room::model::Task {
            id: "t1".into(),
            title: "x".into(),
            priority: 5,
            status: TaskStatus::Backlog,
            plan: None,
            notes: Vec::new(),
            deliverable: None,
            created_at: Room::now(),
        };
        assert_eq!(tempo_for(&[task]), Tempo::Busy);
    }

    #[test]
    fn urgent_with_high_priority_task() {
        let task = crate::room::model::Task {
            id: "t1".into(),
            title: "x".into(),
            priority: 1,
            status: TaskStatus::Backlog,
            plan: None,
            notes: Vec::new(),
            deliverable: None,
            created_at: Room::now(),
        };
        assert_eq!(tempo_for(&[task]), Tempo::Urgent);
    }

    #[tokio::test]
    async fn tick_runs_without_error() {
        let room = test_room();
        room.add_task("x", 1, Some("t1".into())).await.unwrap();
        let interval = run_tick(&room).await;
        assert_eq!(interval, Tempo::Urgent.interval());
    }
}
