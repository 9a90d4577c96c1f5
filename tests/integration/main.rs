// Integration suite against the running Rocket instance, one module per
// API surface, all sharing `common::TestClient` for per-test SQLite
// database lifecycle.

mod common;

mod checkpoints;
mod core_tools;
mod health;
mod rpc_envelope;
