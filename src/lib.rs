//! Crate root: wires storage, the room, the SSE hub, the tool registry
//! and the tempo loop into one `rocket::Rocket<Build>`, the way the
//! teacher's own `lib.rs` assembles `Db`/`EventBus`/trackers into
//! managed state and mounts one route module per concern.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod room;
pub mod rpc;
pub mod session;
pub mod storage;
pub mod tools;

use config::RoomConfig;
use rate_limit::{RateLimitConfig, RateLimiter};
use room::Room;
use session::SessionHub;
use std::sync::Arc;
use storage::Store;
use tools::ToolRegistry;

/// Builds the `Store` implementation named by `config.storage`, per
/// spec.md §6 ("storage type (`fs | redis | postgres`)").
async fn build_store(config: &RoomConfig) -> Arc<dyn Store> {
    match config.storage {
        config::StorageKind::Fs => {
            let store = storage::fs::FsStore::new(&config.base_path)
                .unwrap_or_else(|e| panic!("failed to open filesystem store at {}: {e}", config.base_path));
            Arc::new(store)
        }
        #[cfg(feature = "storage-sql")]
        config::StorageKind::Sql => {
            let path = config.sql_url.clone().unwrap_or_else(|| format!("{}/room.db", config.base_path));
            let store = storage::sql::SqlStore::new(&path).unwrap_or_else(|e| panic!("failed to open sql store at {path}: {e}"));
            Arc::new(store)
        }
        #[cfg(not(feature = "storage-sql"))]
        config::StorageKind::Sql => panic!("storage-sql feature not enabled"),
        #[cfg(feature = "storage-redis")]
        config::StorageKind::Redis => {
            let url = config.redis_url.clone().expect("MASC_REDIS_URL required for redis storage");
            let store = storage::redis_backend::RedisStore::connect(&url)
                .await
                .unwrap_or_else(|e| panic!("failed to connect to redis at {url}: {e}"));
            Arc::new(store)
        }
        #[cfg(not(feature = "storage-redis"))]
        config::StorageKind::Redis => panic!("storage-redis feature not enabled"),
    }
}

pub async fn rocket() -> rocket::Rocket<rocket::Build> {
    rocket_with_config(RoomConfig::from_env()).await
}

pub async fn rocket_with_config(config: RoomConfig) -> rocket::Rocket<rocket::Build> {
    let store = build_store(&config).await;
    let hub = Arc::new(SessionHub::new(config.event_ring_size));
    let room = Arc::new(Room::new(store, hub.clone(), config));
    let registry = Arc::new(ToolRegistry::new());
    let rate_limiter = Arc::new(RateLimiter::new());
    let rate_limit_config = RateLimitConfig::from_env();

    let orchestrator_room = room.clone();

    rocket::build()
        .manage(room)
        .manage(hub)
        .manage(registry)
        .manage(rate_limiter)
        .manage(rate_limit_config)
        .attach(http::Cors)
        .register("/", rocket::catchers![http::too_many_requests, http::not_found])
        .mount(
            "/",
            rocket::routes![
                http::health,
                http::cors_preflight,
                http::post_mcp,
                http::get_mcp,
                http::delete_mcp,
                http::legacy_stream,
                http::legacy_messages,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Orchestrator Tempo Loop", |_rocket| {
            Box::pin(async move {
                room::orchestrator::spawn(orchestrator_room);
                tracing::info!("orchestrator tempo loop started");
            })
        }))
}
