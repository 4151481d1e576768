use std::sync::Arc;

use axum::{
    Json,
    extract::{Form, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    app_state::AppState,
    camera::{session::Readiness, source_url::Credentials},
    core::{errors::AppError, state::SessionStatus},
};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    rtsp_url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CommandResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            error: None,
        })
    }

    fn failure(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            error: Some(error.into()),
        })
    }
}

pub async fn root() -> Redirect {
    Redirect::to("/static/index.html")
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Starts a session and holds the response until the first frame shows up.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<StartRequest>,
) -> Json<CommandResponse> {
    let rtsp_url = payload.rtsp_url.trim();
    if rtsp_url.is_empty() {
        return CommandResponse::failure("rtsp url is required");
    }
    let credentials = Credentials::from_parts(payload.username, payload.password);

    let handle = {
        let mut session = state.session.lock().await;
        match session.start(rtsp_url, credentials.as_ref()).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!("session start failed: {err:#}");
                return CommandResponse::failure(format!("{err:#}"));
            }
        }
    };

    match handle
        .wait_until_ready(state.config.first_frame_timeout)
        .await
    {
        Readiness::FrameAvailable => {
            info!("{} receiving frames", state.config.app_name);
            CommandResponse::ok()
        }
        Readiness::Failed(error) => {
            warn!("session failed before first frame: {error}");
            CommandResponse::failure(error)
        }
        Readiness::TimedOut => {
            warn!(
                "no frame within {}s",
                state.config.first_frame_timeout.as_secs()
            );
            CommandResponse::failure("timed out waiting for video")
        }
    }
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<CommandResponse> {
    state.session.lock().await.stop().await;
    info!("session stop requested");
    CommandResponse::ok()
}

pub async fn frame(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let frame = state.session.lock().await.current_frame().await;
    let Some(frame) = frame else {
        return Err(AppError::not_found("no fresh frame"));
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Ok((StatusCode::OK, headers, frame).into_response())
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.session.lock().await.status())
}
