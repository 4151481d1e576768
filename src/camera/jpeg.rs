use std::ops::Range;

use bytes::Bytes;
use tracing::warn;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;
const COMPACT_THRESHOLD: usize = 64 * 1024;

/// Locates the first complete JPEG image in `buffer`.
///
/// The returned range starts at the first SOI marker and ends just past the
/// first EOI marker found at or after `start + 2`. Bytes before the SOI are
/// never part of the range.
pub fn find_frame(buffer: &[u8]) -> Option<Range<usize>> {
    let start = find_marker(buffer, &JPEG_SOI)?;
    let end_rel = find_marker(&buffer[start + 2..], &JPEG_EOI)?;
    Some(start..start + 2 + end_rel + 2)
}

fn find_marker(buffer: &[u8], marker: &[u8; 2]) -> Option<usize> {
    buffer.windows(2).position(|w| w == marker)
}

/// Reassembles JPEG images from an unframed byte stream.
///
/// Bytes before `cursor` have already been handed out or discarded and are
/// dropped the next time the buffer is compacted. `frame_start` and `scan_from`
/// carry the marker search across calls so every byte is examined a bounded
/// number of times however the stream is chunked.
pub struct JpegFrameAccumulator {
    buffer: Vec<u8>,
    cursor: usize,
    frame_start: Option<usize>,
    scan_from: usize,
}

impl JpegFrameAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            frame_start: None,
            scan_from: 0,
        }
    }

    /// Appends `chunk` and returns every frame it completed, oldest first.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.compact();
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            match self.frame_start {
                None => match find_marker(&self.buffer[self.scan_from..], &JPEG_SOI) {
                    Some(offset) => {
                        let start = self.scan_from + offset;
                        self.frame_start = Some(start);
                        self.cursor = start;
                        self.scan_from = start + 2;
                    }
                    None => {
                        // Keep a trailing 0xFF, it may open a marker split across reads.
                        self.scan_from = self.buffer.len().saturating_sub(1).max(self.cursor);
                        self.cursor = self.scan_from;
                        break;
                    }
                },
                Some(start) => match find_marker(&self.buffer[self.scan_from..], &JPEG_EOI) {
                    Some(offset) => {
                        let end = self.scan_from + offset + 2;
                        frames.push(Bytes::copy_from_slice(&self.buffer[start..end]));
                        self.frame_start = None;
                        self.cursor = end;
                        self.scan_from = end;
                    }
                    None => {
                        self.scan_from = self.buffer.len().saturating_sub(1).max(start + 2);
                        break;
                    }
                },
            }
        }

        let pending = self.pending_len();
        if pending > MAX_PENDING_BYTES {
            let overflow = pending - MAX_PENDING_BYTES;
            warn!("no complete frame in {pending} bytes, dropping {overflow} oldest bytes");
            self.cursor += overflow;
            self.frame_start = None;
            self.scan_from = self.cursor;
        }

        frames
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    fn compact(&mut self) {
        if self.cursor == self.buffer.len() {
            self.buffer.clear();
            self.cursor = 0;
            self.frame_start = None;
            self.scan_from = 0;
        } else if self.cursor >= COMPACT_THRESHOLD {
            let shift = self.cursor;
            self.buffer.drain(..shift);
            self.cursor = 0;
            self.frame_start = self.frame_start.map(|start| start - shift);
            self.scan_from -= shift;
        }
    }
}

impl Default for JpegFrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
