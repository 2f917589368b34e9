// Error taxonomy for download operations

use std::fmt;

/// Maximum length of tool output carried inside an error message.
const MESSAGE_TAIL: usize = 600;

#[derive(Debug, Clone)]
pub enum Error {
    /// A required external tool is not installed
    DependencyMissing { dependency: String },

    /// The extraction engine failed (network, removed video, geo-block, ...)
    DownloadFailed { message: String },

    /// The requested format/quality combination does not exist for this media
    UnsupportedFormat { requested: String },

    /// Merging or transcoding the downloaded streams failed
    MergeError { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn dependency_missing(dependency: impl Into<String>) -> Self {
        Self::DependencyMissing {
            dependency: dependency.into(),
        }
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn unsupported_format(requested: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            requested: requested.into(),
        }
    }

    pub fn merge_error(message: impl Into<String>) -> Self {
        Self::MergeError {
            message: message.into(),
        }
    }

    /// Variant name, for CLI prefixes and coarse branching.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DependencyMissing { .. } => "DependencyMissing",
            Self::DownloadFailed { .. } => "DownloadFailed",
            Self::UnsupportedFormat { .. } => "UnsupportedFormat",
            Self::MergeError { .. } => "MergeError",
        }
    }

    /// Classify raw engine output into a typed error.
    ///
    /// Every non-zero exit from the extraction engine passes through here;
    /// no upstream error text crosses the public boundary untyped.
    /// `requested` is the caller's format label, reported when the engine
    /// says the combination does not exist.
    pub fn classify(output: &str, requested: &str) -> Self {
        // Format unavailability comes first: the engine reports it on
        // stderr even when later postprocessing lines also appear.
        if output.contains("Requested format is not available")
            || output.contains("No video formats found")
        {
            return Self::unsupported_format(requested);
        }

        // Merge/transcode step failures
        if output.contains("Postprocessing:")
            || output.contains("ffmpeg exited")
            || output.contains("Conversion failed")
            || output.contains("Error opening output")
            || output.contains("[Merger]")
        {
            return Self::merge_error(message_tail(output));
        }

        Self::download_failed(message_tail(output))
    }
}

/// Keep the informative end of the tool output; the head is usually
/// banner/progress noise.
fn message_tail(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return "extraction engine exited with an error and no output".to_string();
    }
    let mut start = trimmed.len().saturating_sub(MESSAGE_TAIL);
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    // Keep whole lines
    let tail = &trimmed[start..];
    match tail.find('\n') {
        Some(idx) if start > 0 => tail[idx + 1..].trim().to_string(),
        _ => tail.to_string(),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyMissing { dependency } => {
                write!(
                    f,
                    "Missing dependency: {}. Run `ytmedia doctor` to see what is installed, \
                     or `ytmedia install-deps` to set it up.",
                    dependency
                )
            }
            Self::DownloadFailed { message } => write!(f, "Download failed: {}", message),
            Self::UnsupportedFormat { requested } => {
                write!(f, "Requested format is not available: {}", requested)
            }
            Self::MergeError { message } => write!(f, "Merge failed: {}", message),
        }
    }
}

impl std::error::Error for Error {}
