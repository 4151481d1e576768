pub mod diagnostics;
pub mod ffmpeg_backend;
pub mod jpeg;
pub mod reader;
pub mod ring;
pub mod session;
pub mod source_url;
pub mod supervisor;
pub mod traits;
