//! Binary entry point. The teacher ships as a library exercised only
//! through its integration tests; this crate is meant to run as a
//! standalone server, so it gets a thin `main` that wires up logging
//! and launches the `rocket()` builder from `lib.rs`.

use masc_room::rocket;

#[rocket::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("masc_room=info".parse().unwrap()))
        .init();

    if let Err(e) = rocket().await.launch().await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
