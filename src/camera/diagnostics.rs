use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

use super::session::SessionHandle;

/// Heuristic used on decoder stderr: any line mentioning an error or a failure.
pub fn is_error_line(line: &str) -> bool {
    let line = line.to_ascii_lowercase();
    line.contains("error") || line.contains("failed")
}

/// Drains the decoder's diagnostic stream until it closes.
///
/// Every line is logged; the first one that looks like an error becomes the
/// session's last error.
pub async fn watch_diagnostics<R>(stream: R, session: SessionHandle)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&raw);
                for line in text.split('\r') {
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    debug!(target: "decoder", "{line}");
                    if is_error_line(line) && session.record_error(line) {
                        warn!("decoder reported: {line}");
                    }
                }
            }
            Err(err) => {
                warn!("failed to read decoder diagnostics: {err}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::camera::{ring::FrameRing, session::SessionHandle};

    use super::{is_error_line, watch_diagnostics};

    #[test]
    fn classifies_error_lines_case_insensitively() {
        assert!(is_error_line("Connection failed"));
        assert!(is_error_line("[rtsp @ 0x55] method DESCRIBE FAILED: 401"));
        assert!(is_error_line("Error opening input"));
        assert!(!is_error_line("Input #0, rtsp, from 'rtsp://cam/live':"));
        assert!(!is_error_line("frame=  10 fps=9.8 q=2.0"));
    }

    #[tokio::test]
    async fn first_error_line_is_recorded() {
        let session = SessionHandle::new(FrameRing::default());
        let stderr: &[u8] = b"ffmpeg version 6.1\n\
            [tcp @ 0x1] Connection failed: refused\r\n\
            rtsp://cam/live: Error opening input\n";

        watch_diagnostics(stderr, session.clone()).await;

        let error = session.last_error().expect("error should be recorded");
        assert!(error.contains("Connection failed"));
    }

    #[tokio::test]
    async fn harmless_output_records_nothing() {
        let session = SessionHandle::new(FrameRing::default());
        let stderr: &[u8] = b"Stream #0:0: Video: h264\nframe=1 fps=0.0\rframe=2 fps=10\n";

        watch_diagnostics(stderr, session.clone()).await;

        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_stop_the_sink() {
        let session = SessionHandle::new(FrameRing::default());
        let stderr: &[u8] = b"\xFF\xFE garbage\nsetup failed\n";

        watch_diagnostics(stderr, session.clone()).await;

        assert_eq!(session.last_error().as_deref(), Some("setup failed"));
    }
}
