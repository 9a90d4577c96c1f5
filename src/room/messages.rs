//! Broadcast messages (spec.md §4.2 "Broadcast"): mention extraction,
//! atomic sequence allocation, and ordered append.

use super::model::Message;
use super::{retry_txn, Room};
use crate::error::{RoomError, RoomResult};
use crate::session::Notification;

const SEQ_KEY: &str = "msg:seq";

fn message_key(seq: u64) -> String {
    format!("message:{seq:020}")
}

/// Extracts bag-of-strings mentions matching `@[A-Za-z0-9_-]+`.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut mentions = Vec::new();
    let mut chars = content.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '@' {
            continue;
        }
        let start = i + 1;
        let mut end = start;
        for (j, c2) in content[start..].char_indices() {
            if c2.is_ascii_alphanumeric() || c2 == '-' || c2 == '_' {
                end = start + j + c2.len_utf8();
            } else {
                break;
            }
        }
        if end > start {
            let name = &content[start..end];
            if !mentions.iter().any(|m: &String| m == name) {
                mentions.push(name.to_string());
            }
        }
    }
    mentions
}

/// HTML-escapes content before it is stored or broadcast, so a sender
/// can't inject markup into any client that renders message content as HTML.
pub fn html_escape(content: &str) -> String {
    content
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

impl Room {
    async fn next_seq(&self) -> RoomResult<u64> {
        retry_txn(|| async {
            let current = self
                .store
                .get(SEQ_KEY)
                .await
                .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
            let current_val: u64 = match &current {
                Some(bytes) => std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                None => 0,
            };
            let next_val = current_val + 1;
            let ok = self
                .store
                .compare_and_put(SEQ_KEY, current.as_deref(), next_val.to_string().as_bytes())
                .await
                .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
            if ok {
                Ok(Some(next_val))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn broadcast(&self, agent: &str, content: &str) -> RoomResult<Message> {
        super::validate_agent_name(agent)?;
        let mentions = extract_mentions(content);
        let seq = self.next_seq().await?;
        let message = Message {
            seq,
            sender: agent.to_string(),
            content: html_escape(content),
            mentions: mentions.clone(),
            timestamp: Room::now(),
        };
        let raw = serde_json::to_vec(&message).map_err(|e| RoomError::Internal { reason: e.to_string() })?;
        self.store
            .put(&message_key(seq), &raw, None)
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;

        self.hub.publish(Notification::message(&message)).await;
        for target in &mentions {
            self.hub.publish_to_agent(target, Notification::mention(&message)).await;
        }
        Ok(message)
    }

    pub async fn recent_messages(&self, limit: usize) -> RoomResult<Vec<Message>> {
        let entries = self
            .store
            .scan("message:")
            .await
            .map_err(|e| RoomError::BackendUnavailable { reason: e.to_string() })?;
        let mut messages: Vec<Message> = entries
            .into_iter()
            .filter_map(|(_, raw)| serde_json::from_slice(&raw).ok())
            .collect();
        messages.sort_by_key(|m| m.seq);
        if messages.len() > limit {
            let skip = messages.len() - limit;
            messages.drain(0..skip);
        }
        Ok(messages)
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
        Room::new(store, hub, RoomConfig::default())
    }

    #[test]
    fn extracts_mentions() {
        assert_eq!(extract_mentions("hey @claude and @gemini-1"), vec!["claude", "gemini-1"]);
        assert_eq!(extract_mentions("no mentions here"), Vec::<String>::new());
        assert_eq!(extract_mentions("dup @a @a"), vec!["a"]);
    }

    #[tokio::test]
    async fn broadcast_escapes_html_before_storing() {
        let room = test_room();
        let message = room.broadcast("a", "<script>alert(1)</script> @b").await.unwrap();
        assert_eq!(message.content, "&lt;script&gt;alert(1)&lt;/script&gt; @b");
        let stored = room.recent_messages(1).await.unwrap();
        assert_eq!(stored[0].content, message.content);
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let room = test_room();
        let m1 = room.broadcast("a", "m").await.unwrap();
        let m2 = room.broadcast("b", "m").await.unwrap();
        let m3 = room.broadcast("c", "m").await.unwrap();
        assert!(m1.seq < m2.seq && m2.seq < m3.seq);
        assert!(m1.timestamp <= m2.timestamp);
    }

    #[tokio::test]
    async fn broadcast_concurrency_produces_distinct_seqs() {
        let room = Arc::new(test_room());
        let mut handles = Vec::new();
        for name in ["a", "b", "c"] {
            let room = room.clone();
            handles.push(tokio::spawn(async move { room.broadcast(name, "m").await.unwrap() }));
        }
        let mut seqs: Vec<u64> = futures_join_all(handles).await.into_iter().map(|m| m.seq).collect();
        seqs.sort();
        assert_eq!(seqs, vec![seqs[0], seqs[0] + 1, seqs[0] + 2]);
    }

    async fn futures_join_all(
        handles: Vec<tokio::task::JoinHandle<Message>>,
    ) -> Vec<Message> {
        let mut out = Vec::new();
        for h in handles {
            out.push(h.await.unwrap());
        }
        out
    }
}
