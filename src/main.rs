mod accounts;
mod app;
mod config;
mod db;
mod mailer;
mod state;

use std::time::Duration;

use crate::accounts::tokens::spawn_purge_task;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accounts=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    let purge_every = app_state.config.reset.purge_interval_secs;
    if purge_every > 0 {
        spawn_purge_task(app_state.tokens.clone(), Duration::from_secs(purge_every));
        tracing::info!(every_secs = purge_every, "reset token purge enabled");
    }

    let config = app_state.config.clone();
    app::serve(app::build_app(app_state), &config).await
}
