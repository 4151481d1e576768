use std::{fmt, io, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::watch,
    time::sleep,
};
use tracing::info;

use super::{jpeg::JpegFrameAccumulator, ring::FrameRing};

const PROGRESS_LOG_EVERY: u64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct ReaderSettings {
    pub chunk_capacity: usize,
    pub empty_read_limit: u32,
    pub empty_read_backoff: Duration,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            chunk_capacity: 256 * 1024,
            empty_read_limit: 30,
            empty_read_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
pub enum LoopExit {
    /// Stop was requested.
    Cancelled,
    /// The stream stayed silent for `empty_read_limit` consecutive reads.
    Drained,
    /// The stream ended and the decoder is gone.
    ProcessExited,
    ReadFailed(io::Error),
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("stop requested"),
            Self::Drained => f.write_str("decoder output went silent"),
            Self::ProcessExited => f.write_str("decoder exited"),
            Self::ReadFailed(err) => write!(f, "failed to read decoder output: {err}"),
        }
    }
}

/// Pulls decoder output, cuts it into frames and publishes them to the ring.
pub struct ReaderLoop<R> {
    reader: R,
    ring: Arc<FrameRing>,
    cancel_rx: watch::Receiver<bool>,
    settings: ReaderSettings,
}

impl<R> ReaderLoop<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        reader: R,
        ring: Arc<FrameRing>,
        cancel_rx: watch::Receiver<bool>,
        settings: ReaderSettings,
    ) -> Self {
        Self {
            reader,
            ring,
            cancel_rx,
            settings,
        }
    }

    /// Runs until cancelled, the stream is exhausted, or a read fails.
    ///
    /// `has_exited` is consulted on every empty read so that a dead decoder
    /// ends the loop without waiting out the silence limit.
    pub async fn run(self, mut has_exited: impl FnMut() -> bool) -> LoopExit {
        let Self {
            mut reader,
            ring,
            mut cancel_rx,
            settings,
        } = self;

        let mut chunk = vec![0_u8; settings.chunk_capacity.max(1)];
        let mut frames = JpegFrameAccumulator::new();
        let mut frame_count: u64 = 0;
        let mut empty_reads: u32 = 0;

        let exit = loop {
            if *cancel_rx.borrow() {
                break LoopExit::Cancelled;
            }

            let read = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => break LoopExit::Cancelled,
                read = reader.read(&mut chunk) => read,
            };

            match read {
                Ok(0) => {
                    if has_exited() {
                        break LoopExit::ProcessExited;
                    }
                    empty_reads += 1;
                    if empty_reads >= settings.empty_read_limit {
                        break LoopExit::Drained;
                    }
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel_rx) => break LoopExit::Cancelled,
                        _ = sleep(settings.empty_read_backoff) => {}
                    }
                }
                Ok(n) => {
                    empty_reads = 0;
                    for frame in frames.push_chunk(&chunk[..n]) {
                        ring.set(frame).await;
                        frame_count += 1;
                        if frame_count % PROGRESS_LOG_EVERY == 0 {
                            info!("frames received: {frame_count}");
                        }
                    }
                }
                Err(err) => break LoopExit::ReadFailed(err),
            }
        };

        info!("reader loop finished ({exit}), frames received: {frame_count}");
        exit
    }
}

/// Resolves once stop is signalled or the signalling side is gone.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    let _ = cancel_rx.wait_for(|stop| *stop).await;
}
