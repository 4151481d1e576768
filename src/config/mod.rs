use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub bind_addr: SocketAddr,
    pub ffmpeg_path: String,
    pub frame_freshness: Duration,
    pub first_frame_timeout: Duration,
    pub log_dir: PathBuf,
}

fn seconds_from_env(key: &str, default: u64) -> Duration {
    let seconds = env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(seconds)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "RtspSnapshot".to_owned());
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_owned())
            .parse()?;
        let ffmpeg_path = env::var("FFMPEG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "ffmpeg".to_owned());
        let frame_freshness = seconds_from_env("FRAME_FRESHNESS_SECONDS", 5);
        let first_frame_timeout = seconds_from_env("FIRST_FRAME_TIMEOUT_SECONDS", 10);
        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        Ok(Self {
            app_name,
            bind_addr,
            ffmpeg_path,
            frame_freshness,
            first_frame_timeout,
            log_dir,
        })
    }
}
