//! Streamable-HTTP MCP transport: `POST /mcp` carries JSON-RPC request
//! bodies, `GET /mcp` opens the SSE push side, `DELETE /mcp` tears a
//! session down (spec.md §4.5).

use super::guards::{OriginGuard, ProtocolVersionGuard, RequestIdentity};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::room::Room;
use crate::rpc;
use crate::session::{Notification, SessionHub, KEEPALIVE_INTERVAL};
use crate::tools::{DispatchContext, ToolMode, ToolModeRef, ToolRegistry};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{delete, get, post, Shutdown, State};
use std::sync::Arc;
use tokio::time::interval;
use uuid::Uuid;

fn session_id_of(req_header: Option<&str>, query: Option<&str>) -> String {
    req_header.or(query).map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn mode_of(header: Option<&str>) -> ToolModeRef {
    let mode = match header {
        Some("full") => ToolMode::Full,
        Some("minimal") => ToolMode::Minimal,
        Some("solo") => ToolMode::Solo,
        Some("parallel") => ToolMode::Parallel,
        _ => ToolMode::Standard,
    };
    Arc::new(mode)
}

#[post("/mcp", data = "<body>")]
#[allow(clippy::too_many_arguments)]
pub async fn post_mcp(
    _origin: OriginGuard,
    _version: ProtocolVersionGuard,
    identity: RequestIdentity,
    room: &State<Arc<Room>>,
    registry: &State<Arc<ToolRegistry>>,
    rate_limiter: &State<Arc<RateLimiter>>,
    rate_limit_config: &State<RateLimitConfig>,
    req: super::guards::RequestContext,
    body: String,
) -> Custom<Option<Json<serde_json::Value>>> {
    let mode = mode_of(req.mode_header.as_deref());
    let ctx = DispatchContext { agent: identity.agent, role: identity.role, mode };
    match rpc::handle_body(room, registry, rate_limiter, rate_limit_config, &ctx, &body).await {
        Some(value) => Custom(Status::Ok, Some(Json(value))),
        None => Custom(Status::Accepted, None),
    }
}

#[get("/mcp")]
pub async fn get_mcp(
    _origin: OriginGuard,
    _version: ProtocolVersionGuard,
    identity: RequestIdentity,
    hub: &State<Arc<SessionHub>>,
    req: super::guards::RequestContext,
    mut shutdown: Shutdown,
) -> EventStream![] {
    let session_id = session_id_of(req.session_id_header.as_deref(), req.session_id_query.as_deref());
    let last_event_id: Option<u64> =
        req.last_event_id_header.as_deref().and_then(|v| v.parse().ok());

    let hub = hub.inner().clone();
    let (mut rx, mut close, token) = hub.connect(&session_id);
    let agent = identity.agent;

    EventStream! {
        let _disconnect_on_drop = SessionGuard::new(hub.clone(), session_id.clone(), token);

        yield Event::json(&serde_json::json!({"sessionId": session_id}))
            .id(hub.next_id_hint().to_string())
            .event("ready")
            .with_retry(std::time::Duration::from_millis(3000));

        let replay = last_event_id.map(|id| hub.replay_since(id)).unwrap_or_default();
        for event in replay {
            if event.target.as_deref().map(|t| Some(t) == agent.as_deref()).unwrap_or(true) {
                yield Event::json(&event.notification).id(event.id.to_string()).event(event.notification.event_name());
            }
        }

        let mut heartbeat = interval(KEEPALIVE_INTERVAL);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Ok(event) => {
                            let for_me = event.target.as_deref().map(|t| Some(t) == agent.as_deref()).unwrap_or(true);
                            if for_me {
                                if matches!(event.notification, Notification::Shutdown) {
                                    yield Event::json(&event.notification).id(event.id.to_string()).event("shutdown");
                                    break;
                                }
                                yield Event::json(&event.notification).id(event.id.to_string()).event(event.notification.event_name());
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Event::comment("ping");
                }
                _ = close.changed() => {
                    if *close.borrow() {
                        break;
                    }
                }
                _ = &mut shutdown => {
                    yield Event::json(&Notification::shutdown()).event("shutdown");
                    break;
                }
            }
        }
    }
}

pub(super) struct SessionGuard {
    hub: Arc<SessionHub>,
    session_id: String,
    token: u64,
}

impl SessionGuard {
    pub(super) fn new(hub: Arc<SessionHub>, session_id: String, token: u64) -> Self {
        Self { hub, session_id, token }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.hub.disconnect(&self.session_id, self.token);
    }
}

#[delete("/mcp")]
pub fn delete_mcp(hub: &State<Arc<SessionHub>>, req: super::guards::RequestContext) -> Status {
    if let Some(session_id) = req.session_id_header.as_deref() {
        hub.force_disconnect(session_id);
    }
    Status::NoContent
}
