// Downloader module - capability-gated wrapper around yt-dlp and ffmpeg

pub mod capabilities;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod ytdlp;

pub use capabilities::{CapabilitySnapshot, QualityCeiling};
pub use errors::{Error, Result};
pub use models::{
    AudioOptions, DownloadResult, MediaMetadata, PlaylistOptions, PlaylistResult, Resolution,
    VideoOptions,
};
pub use orchestrator::MediaDownloader;
pub use progress::{NullSink, Phase, ProgressSink, ProgressUpdate};
pub use tools::{DiscoverySource, Located, Locator, Tool};
pub use traits::ExtractionEngine;
pub use ytdlp::YtDlpEngine;
