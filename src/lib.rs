//! Download YouTube video and audio at the best quality the installed
//! tooling allows.
//!
//! Everything goes through [`MediaDownloader`]: it captures a
//! [`CapabilitySnapshot`] of the external tools (yt-dlp, ffmpeg, a JS
//! runtime), plans a format from it, and refuses up front when a
//! required tool is missing instead of failing mid-download.

pub mod downloader;

pub use downloader::{
    AudioOptions, CapabilitySnapshot, DiscoverySource, DownloadResult, Error, ExtractionEngine,
    Located, Locator, MediaDownloader, MediaMetadata, NullSink, Phase, PlaylistOptions,
    PlaylistResult, ProgressSink, ProgressUpdate, QualityCeiling, Resolution, Result, Tool,
    VideoOptions, YtDlpEngine,
};
