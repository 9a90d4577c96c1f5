use masc_room::config::{RoomConfig, StorageKind};
use rocket::local::blocking::Client;
use uuid::Uuid;

/// Wrapper around `Client` that auto-deletes its temp SQLite file on drop,
/// mirroring the teacher's own `TestClient` (same accumulation problem, same
/// fix: drop the connection before unlinking WAL/SHM siblings).
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

/// `rocket_with_config` is async (the redis backend needs to `.await` a
/// connection); the blocking test client needs a fully-built `Rocket<Build>`
/// up front, so a throwaway runtime resolves the builder before handing the
/// result to `Client::tracked`, which spins up its own runtime to drive it.
pub fn test_client_with(config: RoomConfig) -> TestClient {
    let db_path = format!("/tmp/masc_test_{}.db", Uuid::new_v4().simple());
    let mut config = config;
    config.storage = StorageKind::Sql;
    config.sql_url = Some(db_path.clone());

    let rocket = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(masc_room::rocket_with_config(config));
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

pub fn test_client() -> TestClient {
    test_client_with(RoomConfig::default())
}

/// Dispatches a single non-batch JSON-RPC request against `/mcp` as
/// `agent` and returns the parsed response envelope.
pub fn rpc_call(client: &Client, agent: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let res = client
        .post("/mcp")
        .header(rocket::http::ContentType::JSON)
        .header(rocket::http::Header::new("X-MASC-Agent", agent.to_string()))
        .body(body.to_string())
        .dispatch();
    res.into_json().expect("valid json response")
}

pub fn call_tool(client: &Client, agent: &str, tool: &str, arguments: serde_json::Value) -> serde_json::Value {
    rpc_call(client, agent, "tools/call", serde_json::json!({"name": tool, "arguments": arguments}))
}
