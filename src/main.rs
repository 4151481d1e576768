mod app_state;
mod camera;
mod config;
mod core;
mod web;

use std::sync::Arc;

use app_state::AppState;
use config::AppConfig;
use tracing::info;
use tracing_appender::rolling;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env()?;

    tokio::fs::create_dir_all(&config.log_dir).await?;
    let file_appender = rolling::daily(&config.log_dir, "rtsp-snapshot.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::INFO)
        .init();

    tokio::fs::create_dir_all("static").await?;

    let state = Arc::new(AppState::new(config.clone()));
    let app = web::routes::build_router(state);

    info!(
        "{} listening on {} (decoder: {})",
        config.app_name, config.bind_addr, config.ffmpeg_path
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
