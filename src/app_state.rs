use tokio::sync::Mutex;

use crate::{
    camera::{ffmpeg_backend::FfmpegBackend, session::SessionController},
    config::AppConfig,
};

pub struct AppState {
    pub config: AppConfig,
    /// Start and stop are serialised through this lock.
    pub session: Mutex<SessionController<FfmpegBackend>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let backend = FfmpegBackend::new(config.ffmpeg_path.clone());
        let session = SessionController::new(backend, config.frame_freshness);
        Self {
            config,
            session: Mutex::new(session),
        }
    }
}
