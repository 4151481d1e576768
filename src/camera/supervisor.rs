use std::{process::ExitStatus, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    process::Child,
    sync::watch,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, warn};

use crate::core::state::SessionState;

use super::{
    diagnostics::watch_diagnostics,
    reader::{LoopExit, ReaderLoop, ReaderSettings},
    session::SessionHandle,
    traits::DecoderBackend,
};

const STOP_GRACE: Duration = Duration::from_secs(5);
const DIAGNOSTICS_GRACE: Duration = Duration::from_millis(500);

/// Owns one decoder process and the tasks draining its two pipes.
///
/// The exit is reported only after stderr has been drained.
pub struct Supervisor {
    cancel_tx: watch::Sender<bool>,
    reader: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawns the decoder and starts draining it in the background.
    ///
    /// Only launch failures are returned; everything after that is reported
    /// through `session`.
    pub async fn launch<B>(
        backend: &B,
        source: &str,
        session: SessionHandle,
        settings: ReaderSettings,
    ) -> Result<Self>
    where
        B: DecoderBackend + ?Sized,
    {
        let mut child = backend.spawn_decoder(source).await?;
        let stdout = child
            .stdout
            .take()
            .context("decoder stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("decoder stderr was not captured")?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let diagnostics = tokio::spawn(watch_diagnostics(stderr, session.clone()));
        let reader = tokio::spawn(async move {
            let exit = ReaderLoop::new(stdout, session.ring(), cancel_rx, settings)
                .run(|| matches!(child.try_wait(), Ok(Some(_))))
                .await;
            let status = terminate(&mut child).await;
            drain_diagnostics(diagnostics).await;
            report_exit(&session, exit, status);
        });

        Ok(Self {
            cancel_tx,
            reader: Some(reader),
        })
    }

    /// Stops the reader, kills the decoder and releases both tasks.
    pub async fn stop(&mut self) {
        let _ = self.cancel_tx.send(true);

        if let Some(mut reader) = self.reader.take() {
            match timeout(STOP_GRACE, &mut reader).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("reader task ended abnormally: {err}"),
                Err(_) => {
                    warn!("reader task did not stop within {STOP_GRACE:?}, aborting");
                    reader.abort();
                }
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
    }
}

async fn terminate(child: &mut Child) -> Option<ExitStatus> {
    if let Err(err) = child.kill().await {
        debug!("decoder already gone: {err}");
    }
    match child.wait().await {
        Ok(status) => Some(status),
        Err(err) => {
            warn!("failed to reap decoder process: {err}");
            None
        }
    }
}

async fn drain_diagnostics(mut diagnostics: JoinHandle<()>) {
    match timeout(DIAGNOSTICS_GRACE, &mut diagnostics).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("diagnostics task ended abnormally: {err}"),
        Err(_) => {
            debug!("decoder stderr still open after {DIAGNOSTICS_GRACE:?}, aborting");
            diagnostics.abort();
        }
    }
}

fn report_exit(session: &SessionHandle, exit: LoopExit, status: Option<ExitStatus>) {
    match exit {
        LoopExit::Cancelled => session.set_state(SessionState::Stopped),
        LoopExit::Drained => session.set_state(SessionState::Failed),
        LoopExit::ProcessExited => {
            if let Some(status) = status.filter(|status| !status.success()) {
                session.record_error(&format!("decoder exited with {status}"));
            }
            session.set_state(SessionState::Failed);
        }
        LoopExit::ReadFailed(err) => {
            warn!("decoder output read failed: {err}");
            session.record_error(&format!("failed to read decoder output: {err}"));
            session.set_state(SessionState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{process::Stdio, time::Duration};

    use anyhow::Result;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::process::{Child, Command};

    use crate::{
        camera::{
            reader::ReaderSettings,
            ring::FrameRing,
            session::{Readiness, SessionHandle},
            traits::DecoderBackend,
        },
        core::state::SessionState,
    };

    use super::Supervisor;

    struct ScriptBackend;

    #[async_trait]
    impl DecoderBackend for ScriptBackend {
        async fn spawn_decoder(&self, source: &str) -> Result<Child> {
            let child = Command::new("sh")
                .arg("-c")
                .arg(source)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            Ok(child)
        }
    }

    struct StdoutOnlyBackend;

    #[async_trait]
    impl DecoderBackend for StdoutOnlyBackend {
        async fn spawn_decoder(&self, _source: &str) -> Result<Child> {
            let child = Command::new("sh")
                .arg("-c")
                .arg("exec sleep 30")
                .stdout(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            Ok(child)
        }
    }

    async fn wait_for_state(session: &SessionHandle, expected: SessionState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while session.state() != expected {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("session should reach expected state");
    }

    #[tokio::test]
    async fn stop_kills_decoder_and_marks_session_stopped() {
        let session = SessionHandle::new(FrameRing::default());
        let mut supervisor = Supervisor::launch(
            &ScriptBackend,
            r"printf '\377\330img\377\331'; exec sleep 30",
            session.clone(),
            ReaderSettings::default(),
        )
        .await
        .expect("launch should succeed");

        assert_eq!(
            session.wait_until_ready(Duration::from_secs(5)).await,
            Readiness::FrameAvailable
        );
        assert_eq!(
            session.current_frame().await,
            Some(Bytes::from_static(b"\xFF\xD8img\xFF\xD9"))
        );

        supervisor.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);

        supervisor.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn non_zero_exit_is_recorded_as_failure() {
        let session = SessionHandle::new(FrameRing::default());
        let _supervisor = Supervisor::launch(
            &ScriptBackend,
            "exit 3",
            session.clone(),
            ReaderSettings::default(),
        )
        .await
        .expect("launch should succeed");

        wait_for_state(&session, SessionState::Failed).await;
        let error = session.last_error().expect("exit should be reported");
        assert!(error.contains("exit status: 3"), "got {error}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn decoder_error_line_wins_over_exit_status() {
        for run in 0..50 {
            let session = SessionHandle::new(FrameRing::default());
            let _supervisor = Supervisor::launch(
                &ScriptBackend,
                "echo 'Connection failed: 401 Unauthorized' >&2; exit 1",
                session.clone(),
                ReaderSettings::default(),
            )
            .await
            .expect("launch should succeed");

            wait_for_state(&session, SessionState::Failed).await;
            let error = session.last_error().expect("error should be reported");
            assert!(error.contains("Connection failed"), "run {run}: got {error}");
        }
    }

    #[tokio::test]
    async fn missing_stderr_pipe_is_a_launch_error() {
        let session = SessionHandle::new(FrameRing::default());
        let result = Supervisor::launch(
            &StdoutOnlyBackend,
            "ignored",
            session,
            ReaderSettings::default(),
        )
        .await;

        let err = result.err().expect("launch should fail");
        assert!(err.to_string().contains("stderr was not captured"));
    }
}
