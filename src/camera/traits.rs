use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Child;

/// Launches the external process that turns a source into a JPEG byte stream.
///
/// The returned child must have piped stdout (image data) and stderr
/// (diagnostics).
#[async_trait]
pub trait DecoderBackend: Send + Sync {
    async fn spawn_decoder(&self, source: &str) -> Result<Child>;
}
