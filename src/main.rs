mod app;
mod auth;
mod config;
mod db;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "learnit_auth=debug,axum=info,tower_http=info".to_string());
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

    // Missing signing configuration or database is fatal here.
    let app_state = state::AppState::init().await?;
    tracing::info!(
        store = ?app_state.config.store,
        token_ttl_minutes = app_state.auth.keys().ttl().whole_minutes(),
        "auth core ready"
    );

    let app = app::build_app(app_state);
    app::serve(app).await
}
