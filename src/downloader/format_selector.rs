// Format selection for the extraction engine
//
// Maps the requested operation and the capability snapshot onto the
// engine's selector syntax. Selectors degrade left to right, so the
// engine falls back on its own when the preferred combination does not
// exist for a given video.

use super::models::Resolution;

/// A concrete format request for one engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPlan {
    /// Selector string passed via `-f`
    pub selector: String,
    /// Split streams get muxed into one container after download
    pub needs_merge: bool,
    /// Limited to pre-merged single-file streams
    pub capped_to_premerged: bool,
}

/// Build the video selector.
///
/// Without the transcoder no merge step is possible, so only pre-merged
/// single-file streams are eligible regardless of what was requested.
pub fn select_video_format(
    resolution: &Resolution,
    with_audio: bool,
    has_transcoder: bool,
) -> FormatPlan {
    if !has_transcoder {
        let selector = match resolution {
            Resolution::Best => "best[ext=mp4]/best".to_string(),
            Resolution::Cap(h) => {
                format!("best[height<={h}][ext=mp4]/best[height<={h}]/best")
            }
        };
        return FormatPlan {
            selector,
            needs_merge: false,
            capped_to_premerged: true,
        };
    }

    let selector = match (with_audio, resolution) {
        (true, Resolution::Best) => "bestvideo+bestaudio/best".to_string(),
        (true, Resolution::Cap(h)) => format!(
            "bestvideo[height<={h}]+bestaudio/bestvideo[height<={h}]+bestaudio[ext=m4a]/best[height<={h}]"
        ),
        (false, Resolution::Best) => "bestvideo/best".to_string(),
        (false, Resolution::Cap(h)) => format!("bestvideo[height<={h}]/bestvideo"),
    };

    FormatPlan {
        selector,
        needs_merge: with_audio,
        capped_to_premerged: false,
    }
}

/// Selector for audio extraction; the MP3 conversion itself is a
/// postprocessing flag, not part of the selector.
pub fn audio_selector() -> &'static str {
    "bestaudio/best"
}

/// Bitrate argument in the engine's `NNNK` notation
pub fn audio_quality_arg(kbps: u32) -> String {
    format!("{}K", kbps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_with_audio_merges_split_streams() {
        let plan = select_video_format(&Resolution::Best, true, true);
        assert_eq!(plan.selector, "bestvideo+bestaudio/best");
        assert!(plan.needs_merge);
        assert!(!plan.capped_to_premerged);
    }

    #[test]
    fn capped_with_audio_interpolates_height() {
        let plan = select_video_format(&Resolution::Cap(1080), true, true);
        assert_eq!(
            plan.selector,
            "bestvideo[height<=1080]+bestaudio/bestvideo[height<=1080]+bestaudio[ext=m4a]/best[height<=1080]"
        );
        assert!(plan.needs_merge);
    }

    #[test]
    fn best_without_audio_skips_merge() {
        let plan = select_video_format(&Resolution::Best, false, true);
        assert_eq!(plan.selector, "bestvideo/best");
        assert!(!plan.needs_merge);
    }

    #[test]
    fn capped_without_audio() {
        let plan = select_video_format(&Resolution::Cap(720), false, true);
        assert_eq!(plan.selector, "bestvideo[height<=720]/bestvideo");
        assert!(!plan.needs_merge);
    }

    #[test]
    fn no_transcoder_restricts_to_premerged_best() {
        let plan = select_video_format(&Resolution::Best, false, false);
        assert_eq!(plan.selector, "best[ext=mp4]/best");
        assert!(!plan.needs_merge);
        assert!(plan.capped_to_premerged);
    }

    #[test]
    fn no_transcoder_capped_keeps_height_filter() {
        let plan = select_video_format(&Resolution::Cap(480), false, false);
        assert_eq!(
            plan.selector,
            "best[height<=480][ext=mp4]/best[height<=480]/best"
        );
        assert!(plan.capped_to_premerged);
    }

    #[test]
    fn audio_pieces() {
        assert_eq!(audio_selector(), "bestaudio/best");
        assert_eq!(audio_quality_arg(320), "320K");
        assert_eq!(audio_quality_arg(128), "128K");
    }
}
