//! C5 — HTTP transport: Streamable-HTTP MCP endpoint plus the legacy
//! dual-endpoint SSE transport, mounted the way the teacher mounts one
//! route per concern under `routes/` (spec.md §4.5).

mod guards;
mod mcp;
mod sse;

pub use guards::{OriginGuard, ProtocolVersionGuard, RequestIdentity};

use crate::room::Room;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Method};
use rocket::serde::json::Json;
use rocket::{catch, get, options, Request, Response, State};
use std::sync::Arc;

pub use mcp::{delete_mcp, get_mcp, post_mcp};
pub use sse::{legacy_messages, legacy_stream};

#[get("/health")]
pub fn health(room: &State<Arc<Room>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "masc-room",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": format!("{:?}", room.config.storage),
    }))
}

#[options("/<_path..>")]
pub fn cors_preflight(_path: std::path::PathBuf) -> rocket::http::Status {
    rocket::http::Status::NoContent
}

/// Sets the response headers a browser client needs to read the MCP
/// endpoints across origins (spec.md §6): the Origin/protocol-version
/// validation in `OriginGuard`/`ProtocolVersionGuard` is a separate
/// security gate (spec.md §4.5) that this fairing does not replace.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info { name: "CORS headers", kind: Kind::Response }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let origin = request.headers().get_one("Origin").unwrap_or("*");
        response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        response.set_header(Header::new(
            "Access-Control-Expose-Headers",
            "Mcp-Session-Id, Mcp-Protocol-Version",
        ));
        if request.method() == Method::Options {
            response.set_header(Header::new("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS"));
            response.set_header(Header::new(
                "Access-Control-Allow-Headers",
                "Content-Type, Authorization, Mcp-Session-Id, MCP-Protocol-Version, Last-Event-ID",
            ));
        }
    }
}

#[catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "rate limited"}))
}

#[catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "not found"}))
}
