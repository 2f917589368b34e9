// Common data models for download operations

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::Error;

/// Requested video resolution cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Whatever the extraction engine can reach
    Best,
    /// Cap at this height in pixels
    Cap(u32),
}

impl Resolution {
    pub fn is_best(&self) -> bool {
        matches!(self, Self::Best)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("best") {
            return Ok(Self::Best);
        }
        let digits = value.strip_suffix('p').unwrap_or(value);
        digits
            .parse::<u32>()
            .map(Self::Cap)
            .map_err(|_| format!("invalid resolution '{}' (expected 'best' or a height like 1080)", s))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::Cap(height) => write!(f, "{}p", height),
        }
    }
}

/// Options for a single video download
#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub resolution: Resolution,
    pub output_dir: PathBuf,
    /// Mux an audio track into the output
    pub with_audio: bool,
    /// Treat a playlist-parameter URL as a playlist instead of a single video
    pub allow_playlist: bool,
    /// Pass the engine's raw output through instead of rendering progress
    pub debug: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::Best,
            output_dir: PathBuf::from("downloads"),
            with_audio: true,
            allow_playlist: false,
            debug: false,
        }
    }
}

impl VideoOptions {
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_audio(mut self, with_audio: bool) -> Self {
        self.with_audio = with_audio;
        self
    }

    pub fn with_allow_playlist(mut self, allow: bool) -> Self {
        self.allow_playlist = allow;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Options for a single audio extraction
#[derive(Debug, Clone)]
pub struct AudioOptions {
    /// Target MP3 bitrate in kbit/s
    pub bitrate_kbps: u32,
    pub output_dir: PathBuf,
    pub debug: bool,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            bitrate_kbps: 320,
            output_dir: PathBuf::from("downloads"),
            debug: false,
        }
    }
}

impl AudioOptions {
    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Options for a playlist download
#[derive(Debug, Clone)]
pub struct PlaylistOptions {
    pub resolution: Resolution,
    pub output_dir: PathBuf,
    pub debug: bool,
}

impl Default for PlaylistOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::Best,
            output_dir: PathBuf::from("downloads"),
            debug: false,
        }
    }
}

impl PlaylistOptions {
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Record of one completed download.
///
/// Constructed only after the output file has been verified to exist with a
/// non-zero size.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub title: String,
    pub url: String,
    /// Resolution label like "1080p"; None for audio-only output
    pub resolution: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    /// Size of the file on disk, in bytes
    pub filesize: Option<u64>,
}

impl fmt::Display for DownloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' -> {}", self.title, self.path.display())?;
        if let Some(resolution) = &self.resolution {
            write!(f, " [{}]", resolution)?;
        }
        if let Some(codec) = &self.audio_codec {
            write!(f, " audio={}", codec)?;
        }
        Ok(())
    }
}

/// Outcome of a playlist download: per-item results plus per-item failures.
///
/// `downloads.len() + failed.len() == total` always holds; partial failure
/// never aborts the remaining items.
#[derive(Debug)]
pub struct PlaylistResult {
    pub downloads: Vec<DownloadResult>,
    /// Source URL and typed error for each item that failed, in playlist order
    pub failed: Vec<(String, Error)>,
    pub total: usize,
}

impl PlaylistResult {
    pub fn success_count(&self) -> usize {
        self.downloads.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.downloads.len() == self.total
    }
}

impl fmt::Display for PlaylistResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlaylistResult({}/{} downloaded, {} failed)",
            self.success_count(),
            self.total,
            self.failed_count()
        )
    }
}

/// Metadata for one media URL, decoded from the extraction engine's JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    /// Duration in seconds as reported by the engine
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub duration_string: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

impl MediaMetadata {
    pub fn duration_seconds(&self) -> u64 {
        self.duration.map(|d| d.round() as u64).unwrap_or(0)
    }

    /// Human duration, preferring the engine's own rendering
    pub fn duration_display(&self) -> String {
        if let Some(text) = &self.duration_string {
            return text.clone();
        }
        let total = self.duration_seconds();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }

    pub fn resolution_label(&self) -> Option<String> {
        resolution_label(self.width, self.height)
    }

    fn codec_or_none(codec: &Option<String>) -> Option<String> {
        codec
            .as_ref()
            .filter(|c| !c.is_empty() && c.as_str() != "none")
            .cloned()
    }

    pub fn video_codec(&self) -> Option<String> {
        Self::codec_or_none(&self.vcodec)
    }

    pub fn audio_codec(&self) -> Option<String> {
        Self::codec_or_none(&self.acodec)
    }
}

/// One downloadable stream as reported by the extraction engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

impl MediaFormat {
    pub fn has_video(&self) -> bool {
        self.vcodec
            .as_ref()
            .map_or(false, |v| v != "none" && !v.is_empty())
    }

    pub fn has_audio(&self) -> bool {
        self.acodec
            .as_ref()
            .map_or(false, |a| a != "none" && !a.is_empty())
    }

    /// Single file carrying both streams, downloadable without a merge step
    pub fn is_premerged(&self) -> bool {
        self.has_video() && self.has_audio()
    }

    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

/// Label like "1080p" from stream dimensions.
///
/// Uses the smaller dimension so portrait media reports its real quality
/// tier instead of its pixel height.
pub fn resolution_label(width: Option<u32>, height: Option<u32>) -> Option<String> {
    match (width, height) {
        (Some(w), Some(h)) => Some(format!("{}p", w.min(h))),
        (None, Some(h)) => Some(format!("{}p", h)),
        _ => None,
    }
}
