//! Legacy dual-endpoint SSE transport (spec.md §4.5): a client opens
//! `GET /sse` and receives an `endpoint` event naming the companion
//! `POST /messages?session_id=` URL to submit JSON-RPC requests against;
//! responses are pushed back over the SSE stream rather than returned
//! in the POST body. Grounded on the teacher's `routes/stream.rs`
//! (replay-then-heartbeat generator shape) and `SessionHub`/`rpc` built
//! for the Streamable-HTTP transport in this crate.

use super::guards::{OriginGuard, RequestIdentity};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::room::Room;
use crate::rpc;
use crate::session::{Notification, SessionHub, KEEPALIVE_INTERVAL};
use crate::tools::{DispatchContext, ToolMode, ToolRegistry};
use rocket::http::Status;
use rocket::response::stream::{Event, EventStream};
use rocket::{get, post, Shutdown, State};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::interval;
use uuid::Uuid;

/// `GET /sse`: opens the push side of the legacy transport, replays
/// anything missed since `Last-Event-ID` the same way the Streamable-HTTP
/// transport does, then advertises the message-submission endpoint.
#[get("/sse")]
pub async fn legacy_stream(
    _origin: OriginGuard,
    identity: RequestIdentity,
    hub: &State<Arc<SessionHub>>,
    req: super::guards::RequestContext,
    mut shutdown: Shutdown,
) -> EventStream![] {
    let session_id = Uuid::new_v4().to_string();
    let last_event_id: Option<u64> = req.last_event_id_header.as_deref().and_then(|v| v.parse().ok());
    let hub = hub.inner().clone();
    let (mut rx, mut close, token) = hub.connect(&session_id);
    let agent = identity.agent;

    EventStream! {
        let _disconnect_on_drop = super::mcp::SessionGuard::new(hub.clone(), session_id.clone(), token);

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

        yield Event::data(format!("/messages?session_id={session_id}")).event("endpoint");

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

/// `POST /messages?session_id=`: submits a JSON-RPC request against a
/// session opened via `GET /sse`. The response, if any, is pushed back
/// over that session's stream rather than returned here.
#[post("/messages?<session_id>", data = "<body>")]
#[allow(clippy::too_many_arguments)]
pub async fn legacy_messages(
    _origin: OriginGuard,
    identity: RequestIdentity,
    room: &State<Arc<Room>>,
    registry: &State<Arc<ToolRegistry>>,
    rate_limiter: &State<Arc<RateLimiter>>,
    rate_limit_config: &State<RateLimitConfig>,
    hub: &State<Arc<SessionHub>>,
    session_id: &str,
    body: String,
) -> Status {
    let ctx = DispatchContext { agent: identity.agent.clone(), role: identity.role, mode: Arc::new(ToolMode::Standard) };
    let response = rpc::handle_body(room, registry, rate_limiter, rate_limit_config, &ctx, &body).await;
    if let Some(value) = response {
        publish_response(hub, session_id, identity.agent.as_deref(), value).await;
    }
    Status::Accepted
}

async fn publish_response(hub: &SessionHub, _session_id: &str, agent: Option<&str>, value: Value) {
    let notification = Notification::Progress { id: "rpc-response".to_string(), label: value.to_string() };
    match agent {
        Some(agent) => {
            hub.publish_to_agent(agent, notification).await;
        }
        None => {
            hub.publish(notification).await;
        }
    }
}
