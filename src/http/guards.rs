//! Request guards for the MCP-like endpoints (spec.md §4.5 "Gates"),
//! mirroring the teacher's `AdminKey`/`ClientIp` guard pattern in
//! `routes/mod.rs` — a `FromRequest` impl that either succeeds or
//! forwards with a status the route handler never even has to see.

use crate::config::SUPPORTED_PROTOCOL_VERSIONS;
use crate::room::model::Role;
use crate::room::Room;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use std::sync::Arc;

/// Pre-extracted header/query values the MCP transport handlers need,
/// copied out of the live `Request` up front; always succeeds (it's a
/// request guard only because Rocket route handlers can't take
/// `&Request` directly without one).
pub struct RequestContext {
    pub mode_header: Option<String>,
    pub session_id_header: Option<String>,
    pub session_id_query: Option<String>,
    pub last_event_id_header: Option<String>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestContext {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestContext {
            mode_header: req.headers().get_one("X-MASC-Mode").map(str::to_string),
            session_id_header: req.headers().get_one("mcp-session-id").map(str::to_string),
            session_id_query: req.query_value::<String>("session_id").and_then(Result::ok),
            last_event_id_header: req.headers().get_one("Last-Event-ID").map(str::to_string),
        })
    }
}

/// DNS-rebinding defence: an `Origin` header must name a localhost
/// address when present. Non-browser clients send no `Origin` at all,
/// which is allowed.
pub struct OriginGuard;

fn is_localhost_origin(origin: &str) -> bool {
    for host in ["localhost", "127.0.0.1", "[::1]"] {
        if origin == format!("http://{host}")
            || origin == format!("https://{host}")
            || origin.starts_with(&format!("http://{host}:"))
            || origin.starts_with(&format!("https://{host}:"))
        {
            return true;
        }
    }
    false
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OriginGuard {
    type Error = crate::error::RoomError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.headers().get_one("Origin") {
            None => Outcome::Success(OriginGuard),
            Some(origin) if is_localhost_origin(origin) => Outcome::Success(OriginGuard),
            Some(origin) => Outcome::Error((
                Status::BadRequest,
                crate::error::RoomError::InvalidOrigin { origin: origin.to_string() },
            )),
        }
    }
}

/// The negotiated `MCP-Protocol-Version`, defaulting to the room's
/// configured latest when the client sends none.
pub struct ProtocolVersionGuard(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ProtocolVersionGuard {
    type Error = crate::error::RoomError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let room = req.guard::<&State<Arc<Room>>>().await.unwrap();
        match req.headers().get_one("MCP-Protocol-Version") {
            None => Outcome::Success(ProtocolVersionGuard(room.config.protocol_version_default.clone())),
            Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => {
                Outcome::Success(ProtocolVersionGuard(v.to_string()))
            }
            Some(v) => Outcome::Error((
                Status::BadRequest,
                crate::error::RoomError::UnsupportedProtocolVersion { version: v.to_string() },
            )),
        }
    }
}

/// The caller's identity as established by C9 auth: `Bearer` header,
/// `token` query parameter, or — when the room has no auth secret
/// configured — an implicit admin (local, trusted deployment).
pub struct RequestIdentity {
    pub agent: Option<String>,
    pub role: Role,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestIdentity {
    type Error = crate::error::RoomError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let room = req.guard::<&State<Arc<Room>>>().await.unwrap();
        if !room.auth_enabled() {
            let agent = req.headers().get_one("X-MASC-Agent").map(str::to_string);
            return Outcome::Success(RequestIdentity { agent, role: Role::Admin });
        }

        let token = req
            .headers()
            .get_one("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
            .or_else(|| req.query_value::<String>("token").and_then(Result::ok));

        let Some(token) = token else {
            return Outcome::Error((Status::Unauthorized, crate::error::RoomError::Unauthorized));
        };
        match room.verify_token(&token, crate::auth::TokenSource::Bearer).await {
            Ok((agent, role)) => Outcome::Success(RequestIdentity { agent: Some(agent), role }),
            Err(e) => Outcome::Error((e.to_http_status(), e)),
        }
    }
}
