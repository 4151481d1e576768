use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::info;

use super::{source_url::redact_source_url, traits::DecoderBackend};

const ANALYZE_DURATION_MICROS: &str = "10000000";
const PROBE_SIZE_BYTES: &str = "10000000";
const OUTPUT_FILTER: &str = "fps=10,scale=640:-1,format=yuv420p";
const JPEG_QUALITY: &str = "2";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    program: String,
}

impl FfmpegBackend {
    pub fn new(program: String) -> Self {
        Self { program }
    }
}

/// Low-latency RTSP to MJPEG-over-stdout argument set.
pub fn decoder_args(source: &str) -> Vec<String> {
    [
        "-rtsp_transport",
        "tcp",
        "-analyzeduration",
        ANALYZE_DURATION_MICROS,
        "-probesize",
        PROBE_SIZE_BYTES,
        "-fflags",
        "nobuffer",
        "-flags",
        "low_delay",
        "-i",
        source,
        "-vf",
        OUTPUT_FILTER,
        "-f",
        "image2pipe",
        "-vcodec",
        "mjpeg",
        "-q:v",
        JPEG_QUALITY,
        "pipe:1",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[async_trait]
impl DecoderBackend for FfmpegBackend {
    async fn spawn_decoder(&self, source: &str) -> Result<Child> {
        let args = decoder_args(source);
        let redacted = redact_source_url(source);
        info!(
            "launching {} {}",
            self.program,
            args.join(" ").replace(source, &redacted)
        );

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn decoder process `{}`", self.program))?;

        Ok(child)
    }
}
