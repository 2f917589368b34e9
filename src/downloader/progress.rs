// Progress channel: phases, the injectable sink, and the engine's
// stdout line grammar

use std::fmt;

use regex::Regex;

/// What the engine is working on right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Video,
    Audio,
    Merge,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Video => "video",
            Phase::Audio => "audio",
            Phase::Merge => "merge",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// None while the phase has no measurable progress (merging)
    pub percent: Option<f32>,
    pub size: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

impl ProgressUpdate {
    pub fn indeterminate(phase: Phase) -> Self {
        Self {
            phase,
            percent: None,
            size: None,
            speed: None,
            eta: None,
        }
    }
}

/// Receiver for progress notifications.
///
/// Callers inject their own; the default swallows everything so library
/// use stays silent.
pub trait ProgressSink: Send + Sync {
    fn on_phase_update(&self, update: ProgressUpdate);

    /// Playlist item boundary. Indexes are 1-based.
    fn on_item_start(&self, _index: usize, _total: usize, _title: &str) {}
}

/// Sink that ignores every notification
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_phase_update(&self, _update: ProgressUpdate) {}
}

/// A recognized engine stdout line
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        percent: f32,
        size: Option<String>,
        speed: Option<String>,
        eta: Option<String>,
    },
    /// A stream download is starting; the file name decides the phase
    Destination { filename: String },
    /// The merge step began; carries the final output path when printed
    MergeStarted { target: Option<String> },
    /// MP3 conversion is writing its output
    ExtractingAudio { target: Option<String> },
    /// Nothing to do; carries the existing file when the line names it
    AlreadyDownloaded { path: Option<String> },
}

/// Parse one line of `--newline` engine output.
///
/// Example: [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)\s+at\s+(\d+\.?\d*\s*\w+/s)(?:\s+ETA\s+(\S+))?(?:\s+\(frag\s+(\d+)/(\d+)\))?"
        ).unwrap();
        static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
        static ref MERGE_PATH_RE: Regex =
            Regex::new(r#"\[Merger\]\s+Merging formats into\s+"(.+)""#).unwrap();
        static ref MERGE_RE: Regex = Regex::new(r"\[Merger?\]\s+Merging").unwrap();
        static ref EXTRACT_RE: Regex = Regex::new(r"\[ExtractAudio\]\s+Destination:\s+(.+)").unwrap();
        static ref ALREADY_RE: Regex =
            Regex::new(r"\[download\]\s+(.+?)\s+has already been downloaded").unwrap();
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let size = caps.get(2).map(|m| m.as_str().trim().to_string());
        let speed = caps.get(3).map(|m| m.as_str().trim().to_string());
        let eta = caps.get(4).map(|m| m.as_str().to_string());
        return Some(ProgressEvent::Downloading {
            percent,
            size,
            speed,
            eta,
        });
    }

    if let Some(caps) = DEST_RE.captures(line) {
        return Some(ProgressEvent::Destination {
            filename: caps.get(1)?.as_str().trim().to_string(),
        });
    }

    if let Some(caps) = MERGE_PATH_RE.captures(line) {
        return Some(ProgressEvent::MergeStarted {
            target: Some(caps.get(1)?.as_str().to_string()),
        });
    }
    if MERGE_RE.is_match(line) {
        return Some(ProgressEvent::MergeStarted { target: None });
    }

    if let Some(caps) = EXTRACT_RE.captures(line) {
        return Some(ProgressEvent::ExtractingAudio {
            target: Some(caps.get(1)?.as_str().trim().to_string()),
        });
    }

    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(ProgressEvent::AlreadyDownloaded {
            path: caps.get(1).map(|m| m.as_str().to_string()),
        });
    }
    if line.contains("has already been downloaded") {
        return Some(ProgressEvent::AlreadyDownloaded { path: None });
    }

    None
}

/// Phase implied by a destination file name.
///
/// Split streams carry a `.fNNN` format suffix. Among those, webm/m4a/opus
/// extensions are the audio leg, anything else the video leg. Names
/// without the suffix keep whatever phase the operation started in.
pub fn classify_destination(filename: &str) -> Option<Phase> {
    lazy_static::lazy_static! {
        static ref STREAM_SUFFIX_RE: Regex = Regex::new(r"\.f\d+\.(\w+)$").unwrap();
    }

    let caps = STREAM_SUFFIX_RE.captures(filename)?;
    let ext = caps.get(1)?.as_str().to_ascii_lowercase();
    match ext.as_str() {
        "webm" | "m4a" | "opus" => Some(Phase::Audio),
        _ => Some(Phase::Video),
    }
}
