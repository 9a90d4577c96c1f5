//! C9 auth half: off by default; when the room carries a secret, each
//! agent's token is looked up by an HMAC-SHA256 digest of the presented
//! token keyed on that secret, so the raw token is never stored and a
//! leaked store dump can't be replayed against a different room secret.

use crate::error::{RoomError, RoomResult};
use crate::room::model::Role;
use crate::room::Room;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn digest(secret: &[u8], token: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn token_key(digest_hex: &str) -> String {
    format!("authtoken:{digest_hex}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenRecord {
    agent: String,
    role: Role,
    expires_at: Option<String>,
}

/// Where the caller presented a token, for error attribution only.
pub enum TokenSource {
    Bearer,
    Query,
}

impl Room {
    pub fn auth_enabled(&self) -> bool {
        self.config.auth_secret.is_some()
    }

    fn secret(&self) -> RoomResult<Vec<u8>> {
        self.config
            .auth_secret
            .as_ref()
            .map(|s| s.clone().into_bytes())
            .ok_or_else(|| RoomError::Internal { reason: "auth not enabled for this room".to_string() })
    }

    /// Issues a new bearer token for `agent`; the raw token is returned
    /// exactly once and only its digest is persisted.
    pub async fn issue_token(&self, agent: &str, role: Role, ttl_secs: Option<u64>) -> RoomResult<String> {
        let secret = self.secret()?;
        let raw_token = uuid::Uuid::new_v4().to_string();
        let expires_at = ttl_secs.map(|secs| (chrono::Utc::now() + chrono::Duration::seconds(secs as i64)).to_rfc3339());
        let record = TokenRecord { agent: agent.to_string(), role, expires_at };
        let raw = serde_json::to_vec(&record).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
        self.store
            .put(&token_key(&digest(&secret, &raw_token)), &raw, ttl_secs.map(std::time::Duration::from_secs))
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        Ok(raw_token)
    }

    pub async fn revoke_token(&self, raw_token: &str) -> RoomResult<()> {
        let secret = self.secret()?;
        self.store
            .delete(&token_key(&digest(&secret, raw_token)))
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })
    }

    /// Verifies a bearer or query-parameter token, returning the bound
    /// agent name and role. `RoomError::TokenExpired` if past `expires_at`.
    pub async fn verify_token(&self, raw_token: &str, _source: TokenSource) -> RoomResult<(String, Role)> {
        let secret = self.secret()?;
        let raw = self
            .store
            .get(&token_key(&digest(&secret, raw_token)))
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?
            .ok_or(RoomError::Unauthorized)?;
        let record: TokenRecord = serde_json::from_slice(&raw).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
        if let Some(expires_at) = &record.expires_at
            && let Ok(expiry) = chrono::DateTime::parse_from_rfc3339(expires_at)
            && chrono::Utc::now() > expiry
        {
            return Err(RoomError::TokenExpired);
        }
        Ok((record.agent, record.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::session::SessionHub;
    use crate::storage::sql::SqlStore;
    use std::sync::Arc;

    fn test_room() -> Room {
        let store = Arc::new(SqlStore::in_memory().unwrap());
        let hub = Arc::new(SessionHub::new(256));
        let mut config = RoomConfig::default();
        config.auth_secret = Some("test-secret".to_string());
        Room::new(store, hub, config)
    }

    #[tokio::test]
    async fn issue_then_verify_roundtrips() {
        let room = test_room();
        let token = room.issue_token("claude", Role::Worker, None).await.unwrap();
        let (agent, role) = room.verify_token(&token, TokenSource::Bearer).await.unwrap();
        assert_eq!(agent, "claude");
        assert_eq!(role, Role::Worker);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let room = test_room();
        let err = room.verify_token("not-a-real-token", TokenSource::Bearer).await.unwrap_err();
        assert!(matches!(err, RoomError::Unauthorized));
    }

    #[tokio::test]
    async fn revoked_token_is_unauthorized() {
        let room = test_room();
        let token = room.issue_token("claude", Role::Worker, None).await.unwrap();
        room.revoke_token(&token).await.unwrap();
        assert!(room.verify_token(&token, TokenSource::Bearer).await.is_err());
    }
}
