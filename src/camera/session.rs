use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Result;
use bytes::Bytes;
use tokio::{
    sync::watch,
    time::{Instant, sleep_until},
};
use tracing::info;

use crate::core::state::{SessionState, SessionStatus};

use super::{
    reader::ReaderSettings,
    ring::FrameRing,
    source_url::{Credentials, compose_source_url, redact_source_url},
    supervisor::Supervisor,
    traits::DecoderBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    FrameAvailable,
    Failed(String),
    TimedOut,
}

struct SessionShared {
    state: Mutex<SessionState>,
    last_error: Mutex<Option<String>>,
    events: watch::Sender<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared view of one session: its frame ring, state and last error.
#[derive(Clone)]
pub struct SessionHandle {
    ring: Arc<FrameRing>,
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn new(ring: FrameRing) -> Self {
        let (events, _) = watch::channel(0);
        Self {
            ring: Arc::new(ring),
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Starting),
                last_error: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn ring(&self) -> Arc<FrameRing> {
        self.ring.clone()
    }

    pub fn state(&self) -> SessionState {
        let state = *lock(&self.shared.state);
        if state == SessionState::Starting && self.ring.published() > 0 {
            SessionState::Running
        } else {
            state
        }
    }

    pub fn set_state(&self, state: SessionState) {
        *lock(&self.shared.state) = state;
        self.notify();
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    /// Keeps the first error only. Returns whether `message` was stored.
    pub fn record_error(&self, message: &str) -> bool {
        {
            let mut last_error = lock(&self.shared.last_error);
            if last_error.is_some() {
                return false;
            }
            *last_error = Some(message.to_owned());
        }
        self.notify();
        true
    }

    pub async fn current_frame(&self) -> Option<Bytes> {
        self.ring.get().await
    }

    /// Waits for the first usable frame, an error, or `limit` to pass.
    pub async fn wait_until_ready(&self, limit: Duration) -> Readiness {
        let deadline = Instant::now() + limit;
        let mut frames = self.ring.subscribe();
        let mut events = self.shared.events.subscribe();

        loop {
            if self.ring.get().await.is_some() {
                return Readiness::FrameAvailable;
            }
            if let Some(error) = self.last_error() {
                return Readiness::Failed(error);
            }
            if self.state().is_terminal() {
                return Readiness::Failed("decoder stopped before producing a frame".to_owned());
            }

            tokio::select! {
                _ = frames.changed() => {}
                _ = events.changed() => {}
                _ = sleep_until(deadline) => return Readiness::TimedOut,
            }
        }
    }

    fn notify(&self) {
        self.shared.events.send_modify(|revision| *revision += 1);
    }
}

struct Session {
    handle: SessionHandle,
    supervisor: Supervisor,
    source: String,
    started_at: Instant,
}

/// Owns at most one live session and replaces it on every start.
pub struct SessionController<B: DecoderBackend> {
    backend: B,
    freshness: Duration,
    reader_settings: ReaderSettings,
    current: Option<Session>,
}

impl<B: DecoderBackend> SessionController<B> {
    pub fn new(backend: B, freshness: Duration) -> Self {
        Self {
            backend,
            freshness,
            reader_settings: ReaderSettings::default(),
            current: None,
        }
    }

    /// Tears down any running session and launches a new one.
    ///
    /// Returns as soon as the decoder is spawned; use
    /// [`SessionHandle::wait_until_ready`] to wait for the first frame.
    pub async fn start(
        &mut self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<SessionHandle> {
        self.stop().await;

        let source = compose_source_url(url, credentials)?;
        let redacted = redact_source_url(&source);
        info!("starting session for {redacted}");

        let handle = SessionHandle::new(FrameRing::new(self.freshness));
        let supervisor = Supervisor::launch(
            &self.backend,
            &source,
            handle.clone(),
            self.reader_settings,
        )
        .await?;

        self.current = Some(Session {
            handle: handle.clone(),
            supervisor,
            source: redacted,
            started_at: Instant::now(),
        });
        Ok(handle)
    }

    pub async fn stop(&mut self) {
        let Some(mut session) = self.current.take() else {
            return;
        };

        session.supervisor.stop().await;
        session.handle.set_state(SessionState::Stopped);
        info!(
            "session for {} stopped after {}s",
            session.source,
            session.started_at.elapsed().as_secs()
        );
    }

    pub async fn current_frame(&self) -> Option<Bytes> {
        match &self.current {
            Some(session) => session.handle.current_frame().await,
            None => None,
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.current
            .as_ref()
            .and_then(|session| session.handle.last_error())
    }

    pub fn status(&self) -> SessionStatus {
        let Some(session) = &self.current else {
            return SessionStatus::idle();
        };

        SessionStatus {
            state: session.handle.state(),
            source: Some(session.source.clone()),
            uptime_seconds: Some(session.started_at.elapsed().as_secs()),
            frames_published: session.handle.ring.published(),
            last_error: self.last_error(),
        }
    }
}
