// Capability resolution over the external tool probe

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::errors::{Error, Result};
use super::tools::{Located, Locator, SystemLocator, Tool};

/// Best quality tier reachable with the current tool set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityCeiling {
    /// Split streams plus a merge step; everything the engine offers
    BestAvailable,
    /// Single-file streams only; the ceiling is whatever pre-merged
    /// stream the engine can find, decided upstream, not by this crate
    Premerged,
}

/// Point-in-time view of which external tools are installed.
///
/// Capture probes each tool exactly once. Every query afterwards is a
/// field read; nothing re-touches the filesystem until `refresh()`,
/// which returns a fresh snapshot and leaves this one untouched.
#[derive(Clone)]
pub struct CapabilitySnapshot {
    locator: Arc<dyn Locator>,
    extractor: Option<Located>,
    transcoder: Option<Located>,
    node: Option<Located>,
    deno: Option<Located>,
}

impl CapabilitySnapshot {
    pub fn capture() -> Self {
        Self::capture_with(Arc::new(SystemLocator))
    }

    pub fn capture_with(locator: Arc<dyn Locator>) -> Self {
        let extractor = locator.locate(Tool::YtDlp);
        let transcoder = locator.locate(Tool::Ffmpeg);
        let node = locator.locate(Tool::Node);
        let deno = locator.locate(Tool::Deno);
        Self {
            locator,
            extractor,
            transcoder,
            node,
            deno,
        }
    }

    /// Probe again after the environment may have changed.
    pub fn refresh(&self) -> Self {
        Self::capture_with(self.locator.clone())
    }

    pub fn find_executable(&self, tool: Tool) -> Option<&Located> {
        match tool {
            Tool::YtDlp => self.extractor.as_ref(),
            Tool::Ffmpeg => self.transcoder.as_ref(),
            Tool::Node => self.node.as_ref(),
            Tool::Deno => self.deno.as_ref(),
        }
    }

    /// Node when present, deno otherwise.
    pub fn find_js_runtime(&self) -> Option<&Located> {
        self.node.as_ref().or(self.deno.as_ref())
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn has_transcoder(&self) -> bool {
        self.transcoder.is_some()
    }

    pub fn has_js_runtime(&self) -> bool {
        self.node.is_some() || self.deno.is_some()
    }

    pub fn extractor_path(&self) -> Option<&Path> {
        self.extractor.as_ref().map(|l| l.path.as_path())
    }

    pub fn transcoder_path(&self) -> Option<&Path> {
        self.transcoder.as_ref().map(|l| l.path.as_path())
    }

    /// Logical names of everything absent, for doctor output and setup
    /// prompts. A JS runtime of either kind satisfies the "nodejs" entry.
    pub fn missing_dependencies(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.has_extractor() {
            missing.push("yt-dlp");
        }
        if !self.has_transcoder() {
            missing.push("ffmpeg");
        }
        if !self.has_js_runtime() {
            missing.push("nodejs");
        }
        missing
    }

    pub fn video_ceiling(&self) -> QualityCeiling {
        if self.has_transcoder() && self.has_js_runtime() {
            QualityCeiling::BestAvailable
        } else {
            QualityCeiling::Premerged
        }
    }

    /// Gate a video download. Runs before any filesystem write or spawn.
    ///
    /// Audio muxing needs the transcoder; video-only downloads degrade to
    /// pre-merged streams without it.
    pub fn check_video(&self, with_audio: bool) -> Result<QualityCeiling> {
        if !self.has_extractor() {
            return Err(Error::dependency_missing(Tool::YtDlp.as_str()));
        }
        if with_audio && !self.has_transcoder() {
            return Err(Error::dependency_missing(Tool::Ffmpeg.as_str()));
        }
        Ok(self.video_ceiling())
    }

    /// Gate an audio extraction. MP3 always transcodes, so the transcoder
    /// is a hard requirement.
    pub fn check_audio(&self) -> Result<()> {
        if !self.has_extractor() {
            return Err(Error::dependency_missing(Tool::YtDlp.as_str()));
        }
        if !self.has_transcoder() {
            return Err(Error::dependency_missing(Tool::Ffmpeg.as_str()));
        }
        Ok(())
    }
}

impl fmt::Debug for CapabilitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySnapshot")
            .field("extractor", &self.extractor)
            .field("transcoder", &self.transcoder)
            .field("node", &self.node)
            .field("deno", &self.deno)
            .finish()
    }
}
