// Extraction engine trait definition

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::errors::Result;
use super::models::MediaMetadata;
use super::progress::{Phase, ProgressSink};

/// One supervised download invocation, fully resolved: the orchestrator
/// decides everything, the engine only executes.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    /// Engine format selector
    pub selector: String,
    /// Split streams get muxed after download
    pub needs_merge: bool,
    /// Convert the download to MP3 instead of keeping a video container
    pub extract_audio: bool,
    /// Target bitrate for the MP3 conversion
    pub audio_bitrate_kbps: u32,
    pub output_dir: PathBuf,
    /// Let a playlist-parameter URL expand into its items
    pub allow_playlist: bool,
    /// Pass raw engine output through instead of synthesizing progress
    pub debug: bool,
    /// Probed extraction engine binary
    pub extractor: PathBuf,
    /// Probed transcoder binary, forwarded to the engine when known
    pub transcoder: Option<PathBuf>,
    /// Phase to report until a destination line says otherwise
    pub initial_phase: Phase,
    /// Label of what was asked for, used in format errors
    pub requested: String,
}

/// What the engine learned about its own output
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    /// Final output path as printed by the engine, when it printed one
    pub final_path: Option<PathBuf>,
}

/// A playlist item from flat enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: Option<String>,
    pub url: String,
}

/// Metadata lookup parameters
#[derive(Debug, Clone)]
pub struct MetadataRequest {
    pub url: String,
    /// Selector to resolve against, so reported dimensions match what a
    /// following download would fetch; None for plain inspection
    pub selector: Option<String>,
    /// Label of what was asked for, used in format errors
    pub requested: Option<String>,
    pub extractor: PathBuf,
}

/// The boundary between orchestration and the spawned engine.
///
/// Production drives the probed binary; tests substitute a scripted
/// implementation so operation behavior is checked without processes.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Resolve metadata for one URL without writing any files.
    async fn fetch_metadata(&self, request: &MetadataRequest) -> Result<MediaMetadata>;

    /// Enumerate playlist items without resolving their formats.
    async fn enumerate_playlist(&self, extractor: &Path, url: &str)
        -> Result<Vec<PlaylistEntry>>;

    /// Run one download to completion, forwarding progress to the sink.
    async fn run_download(
        &self,
        job: &DownloadJob,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<DownloadOutcome>;
}
