//! Environment-driven configuration, generalizing the teacher's
//! `RateLimitConfig::from_env()` pattern to the full surface of spec.md §6.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Fs,
    Sql,
    Redis,
}

impl StorageKind {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "redis" => StorageKind::Redis,
            "postgres" | "sql" => StorageKind::Sql,
            _ => StorageKind::Fs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Base path for the filesystem backend, or the cluster name shared
    /// across machines for the networked backends.
    pub base_path: String,
    pub cluster_name: String,
    pub storage: StorageKind,
    pub redis_url: Option<String>,
    pub sql_url: Option<String>,
    pub encryption_key: Option<[u8; 32]>,
    pub protocol_version_default: String,
    /// When set, C9 auth is enabled and bearer tokens are HMAC-digested
    /// against this secret before lookup.
    pub auth_secret: Option<String>,

    /// Seconds of silence before an agent is reported `zombie`.
    pub zombie_threshold_secs: i64,
    /// Seconds of silence (after zombie) before GC promotes to `left`.
    pub left_threshold_secs: i64,
    /// Minimum ring buffer size for the SSE hub.
    pub event_ring_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            base_path: "data/masc".to_string(),
            cluster_name: "default".to_string(),
            storage: StorageKind::Fs,
            redis_url: None,
            sql_url: None,
            encryption_key: None,
            protocol_version_default: "2025-11-25".to_string(),
            auth_secret: None,
            zombie_threshold_secs: 120,
            left_threshold_secs: 600,
            event_ring_size: 256,
        }
    }
}

impl RoomConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("MASC_BASE_PATH") {
            config.base_path = val;
        }
        if let Ok(val) = env::var("MASC_CLUSTER_NAME") {
            config.cluster_name = val;
        }
        if let Ok(val) = env::var("MASC_STORAGE") {
            config.storage = StorageKind::parse(&val);
        }
        if let Ok(val) = env::var("MASC_REDIS_URL") {
            config.redis_url = Some(val);
        }
        if let Ok(val) = env::var("MASC_SQL_URL") {
            config.sql_url = Some(val);
        }
        if let Ok(val) = env::var("MASC_ENCRYPTION_KEY")
            && let Ok(bytes) = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &val)
            && bytes.len() == 32
        {
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            config.encryption_key = Some(key);
        }
        if let Ok(val) = env::var("MASC_PROTOCOL_VERSION") {
            config.protocol_version_default = val;
        }
        if let Ok(val) = env::var("MASC_AUTH_SECRET") {
            config.auth_secret = Some(val);
        }
        if let Ok(val) = env::var("MASC_ZOMBIE_THRESHOLD_SECS")
            && let Ok(n) = val.parse()
        {
            config.zombie_threshold_secs = n;
        }
        if let Ok(val) = env::var("MASC_LEFT_THRESHOLD_SECS")
            && let Ok(n) = val.parse()
        {
            config.left_threshold_secs = n;
        }
        if let Ok(val) = env::var("MASC_EVENT_RING_SIZE")
            && let Ok(n) = val.parse::<usize>()
        {
            config.event_ring_size = n.max(256);
        }

        config
    }
}

pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2024-11-05", "2025-03-26", "2025-11-25"];
