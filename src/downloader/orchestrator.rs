// Operation orchestration
//
// Owns the sequence every operation follows: gate on the capability
// snapshot, plan the format, fetch metadata, run the engine, verify the
// output on disk, assemble the result. Nothing here touches the
// filesystem or spawns anything before the gates pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::capabilities::{CapabilitySnapshot, QualityCeiling};
use super::errors::{Error, Result};
use super::format_selector::{audio_selector, select_video_format};
use super::models::{
    AudioOptions, DownloadResult, MediaMetadata, PlaylistOptions, PlaylistResult, VideoOptions,
};
use super::progress::{NullSink, Phase, ProgressSink};
use super::tools::Tool;
use super::traits::{DownloadJob, ExtractionEngine, MetadataRequest};
use super::ytdlp::{url_has_playlist_param, YtDlpEngine};

pub struct MediaDownloader {
    caps: CapabilitySnapshot,
    engine: Box<dyn ExtractionEngine>,
    sink: Arc<dyn ProgressSink>,
}

impl MediaDownloader {
    /// Downloader over a fresh capability snapshot.
    pub fn new() -> Self {
        Self::with_snapshot(CapabilitySnapshot::capture())
    }

    pub fn with_snapshot(caps: CapabilitySnapshot) -> Self {
        Self {
            caps,
            engine: Box::new(YtDlpEngine),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_engine(mut self, engine: Box<dyn ExtractionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn capabilities(&self) -> &CapabilitySnapshot {
        &self.caps
    }

    /// Download one video as MP4.
    ///
    /// A playlist-parameter URL stays a single-video download unless the
    /// options opt into playlist expansion.
    pub async fn download_video(
        &self,
        url: &str,
        options: &VideoOptions,
    ) -> Result<DownloadResult> {
        let ceiling = self.caps.check_video(options.with_audio)?;
        if url_has_playlist_param(url) && !options.allow_playlist {
            tracing::warn!("URL references a playlist; downloading only this single video");
        }
        let plan = select_video_format(
            &options.resolution,
            options.with_audio,
            self.caps.has_transcoder(),
        );

        match ceiling {
            QualityCeiling::Premerged if plan.capped_to_premerged => {
                tracing::warn!(
                    "ffmpeg not found; limited to pre-merged streams, quality may be reduced"
                );
                if !options.with_audio {
                    tracing::warn!("cannot strip the audio track without ffmpeg");
                }
            }
            QualityCeiling::Premerged => {
                tracing::warn!(
                    "no JS runtime (node/deno) found; the highest tiers may be unavailable"
                );
            }
            QualityCeiling::BestAvailable => {}
        }

        let requested = format!("mp4 {}", options.resolution);
        let metadata = self
            .engine
            .fetch_metadata(&MetadataRequest {
                url: url.to_string(),
                selector: Some(plan.selector.clone()),
                requested: Some(requested.clone()),
                extractor: self.extractor_path()?,
            })
            .await?;

        self.prepare_output_dir(&options.output_dir).await?;

        let job = DownloadJob {
            url: url.to_string(),
            selector: plan.selector,
            needs_merge: plan.needs_merge,
            extract_audio: false,
            audio_bitrate_kbps: 320,
            output_dir: options.output_dir.clone(),
            allow_playlist: options.allow_playlist,
            debug: options.debug,
            extractor: self.extractor_path()?,
            transcoder: self.caps.transcoder_path().map(Path::to_path_buf),
            initial_phase: Phase::Video,
            requested,
        };
        let outcome = self.engine.run_download(&job, self.sink.clone()).await?;

        let path = outcome
            .final_path
            .unwrap_or_else(|| options.output_dir.join(format!("{}.mp4", metadata.title)));
        let filesize = verify_output(&path, plan.needs_merge)?;

        let audio_codec = if plan.needs_merge {
            // The merge step re-encodes audio to AAC unconditionally
            Some("aac".to_string())
        } else {
            metadata.audio_codec()
        };

        Ok(DownloadResult {
            path,
            title: metadata.title.clone(),
            url: url.to_string(),
            resolution: metadata.resolution_label(),
            video_codec: metadata.video_codec(),
            audio_codec,
            filesize: Some(filesize),
        })
    }

    /// Download the audio track of one video as MP3.
    pub async fn download_audio(&self, url: &str, options: &AudioOptions) -> Result<DownloadResult> {
        self.caps.check_audio()?;

        let requested = format!("mp3 {}kbps", options.bitrate_kbps);
        let metadata = self
            .engine
            .fetch_metadata(&MetadataRequest {
                url: url.to_string(),
                selector: Some(audio_selector().to_string()),
                requested: Some(requested.clone()),
                extractor: self.extractor_path()?,
            })
            .await?;

        self.prepare_output_dir(&options.output_dir).await?;

        let job = DownloadJob {
            url: url.to_string(),
            selector: audio_selector().to_string(),
            needs_merge: false,
            extract_audio: true,
            audio_bitrate_kbps: options.bitrate_kbps,
            output_dir: options.output_dir.clone(),
            allow_playlist: false,
            debug: options.debug,
            extractor: self.extractor_path()?,
            transcoder: self.caps.transcoder_path().map(Path::to_path_buf),
            initial_phase: Phase::Audio,
            requested,
        };
        let outcome = self.engine.run_download(&job, self.sink.clone()).await?;

        let path = outcome
            .final_path
            .unwrap_or_else(|| options.output_dir.join(format!("{}.mp3", metadata.title)));
        // A missing file after a planned conversion is a transcode failure
        let filesize = verify_output(&path, true)?;

        Ok(DownloadResult {
            path,
            title: metadata.title.clone(),
            url: url.to_string(),
            resolution: None,
            video_codec: None,
            audio_codec: Some("mp3".to_string()),
            filesize: Some(filesize),
        })
    }

    /// Download every item of a playlist as MP4, sequentially, in source
    /// order. Item failures are recorded and never abort the batch.
    pub async fn download_playlist(
        &self,
        url: &str,
        options: &PlaylistOptions,
    ) -> Result<PlaylistResult> {
        // Items are MP4 with audio, so the muxing gate applies up front.
        self.caps.check_video(true)?;

        let extractor = self.extractor_path()?;
        let entries = self.engine.enumerate_playlist(&extractor, url).await?;
        let total = entries.len();
        tracing::info!(total, "playlist enumerated");

        let item_options = VideoOptions {
            resolution: options.resolution,
            output_dir: options.output_dir.clone(),
            with_audio: true,
            allow_playlist: false,
            debug: options.debug,
        };

        let mut downloads = Vec::new();
        let mut failed = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let title = entry.title.as_deref().unwrap_or(&entry.url);
            self.sink.on_item_start(index + 1, total, title);
            match self.download_video(&entry.url, &item_options).await {
                Ok(result) => downloads.push(result),
                Err(error) => {
                    tracing::warn!(url = %entry.url, %error, "playlist item failed");
                    failed.push((entry.url.clone(), error));
                }
            }
        }

        Ok(PlaylistResult {
            downloads,
            failed,
            total,
        })
    }

    /// Inspect a URL without downloading. Writes nothing, creates nothing.
    pub async fn get_metadata(&self, url: &str) -> Result<MediaMetadata> {
        self.engine
            .fetch_metadata(&MetadataRequest {
                url: url.to_string(),
                selector: None,
                requested: None,
                extractor: self.extractor_path()?,
            })
            .await
    }

    fn extractor_path(&self) -> Result<PathBuf> {
        self.caps
            .extractor_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::dependency_missing(Tool::YtDlp.as_str()))
    }

    async fn prepare_output_dir(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Error::download_failed(format!(
                "could not create output directory {}: {}",
                dir.display(),
                e
            ))
        })
    }
}

impl Default for MediaDownloader {
    fn default() -> Self {
        Self::new()
    }
}

/// The result contract holds only for files that exist with content.
fn verify_output(path: &Path, after_merge: bool) -> Result<u64> {
    let tag = |message: String| {
        if after_merge {
            Error::merge_error(message)
        } else {
            Error::download_failed(message)
        }
    };
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(tag(format!("produced an empty file: {}", path.display()))),
        Err(_) => Err(tag(format!("produced no output file at {}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::Resolution;
    use crate::downloader::progress::ProgressUpdate;
    use crate::downloader::tools::{DiscoverySource, Located, Locator};
    use crate::downloader::traits::{DownloadOutcome, PlaylistEntry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct PresenceLocator(Vec<Tool>);

    impl Locator for PresenceLocator {
        fn locate(&self, tool: Tool) -> Option<Located> {
            if self.0.contains(&tool) {
                Some(Located {
                    path: PathBuf::from(format!("/fake/bin/{}", tool.as_str())),
                    source: DiscoverySource::PathSearch,
                })
            } else {
                None
            }
        }
    }

    fn snapshot(tools: &[Tool]) -> CapabilitySnapshot {
        CapabilitySnapshot::capture_with(Arc::new(PresenceLocator(tools.to_vec())))
    }

    fn fake_title(url: &str) -> String {
        url.rsplit("v=").next().unwrap_or("video").to_string()
    }

    /// Scripted engine: records jobs, writes real files, fails on demand.
    struct FakeEngine {
        jobs: Mutex<Vec<DownloadJob>>,
        metadata_calls: AtomicUsize,
        fail_urls: Vec<String>,
        entries: Vec<PlaylistEntry>,
    }

    impl FakeEngine {
        fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                metadata_calls: AtomicUsize::new(0),
                fail_urls: Vec::new(),
                entries: Vec::new(),
            }
        }

        fn failing_on(mut self, url: &str) -> Self {
            self.fail_urls.push(url.to_string());
            self
        }

        fn with_entries(mut self, entries: Vec<PlaylistEntry>) -> Self {
            self.entries = entries;
            self
        }
    }

    #[async_trait]
    impl ExtractionEngine for FakeEngine {
        async fn fetch_metadata(&self, request: &MetadataRequest) -> Result<MediaMetadata> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            let mut metadata: MediaMetadata = serde_json::from_str("{}").unwrap();
            metadata.id = fake_title(&request.url);
            metadata.title = fake_title(&request.url);
            metadata.width = Some(1920);
            metadata.height = Some(1080);
            metadata.vcodec = Some("avc1.640028".to_string());
            metadata.acodec = Some("none".to_string());
            metadata.duration = Some(213.0);
            Ok(metadata)
        }

        async fn enumerate_playlist(
            &self,
            _extractor: &Path,
            _url: &str,
        ) -> Result<Vec<PlaylistEntry>> {
            Ok(self.entries.clone())
        }

        async fn run_download(
            &self,
            job: &DownloadJob,
            _sink: Arc<dyn ProgressSink>,
        ) -> Result<DownloadOutcome> {
            self.jobs.lock().unwrap().push(job.clone());
            if self.fail_urls.contains(&job.url) {
                return Err(Error::download_failed("scripted failure"));
            }
            let ext = if job.extract_audio { "mp3" } else { "mp4" };
            let path = job
                .output_dir
                .join(format!("{}.{}", fake_title(&job.url), ext));
            std::fs::write(&path, b"media bytes").unwrap();
            Ok(DownloadOutcome {
                final_path: Some(path),
            })
        }
    }

    struct RecordingSink {
        items: Mutex<Vec<(usize, usize, String)>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_phase_update(&self, _update: ProgressUpdate) {}

        fn on_item_start(&self, index: usize, total: usize, title: &str) {
            self.items
                .lock()
                .unwrap()
                .push((index, total, title.to_string()));
        }
    }

    fn downloader_with(
        tools: &[Tool],
        engine: Arc<FakeEngine>,
    ) -> (MediaDownloader, Arc<FakeEngine>) {
        struct Shared(Arc<FakeEngine>);

        #[async_trait]
        impl ExtractionEngine for Shared {
            async fn fetch_metadata(&self, request: &MetadataRequest) -> Result<MediaMetadata> {
                self.0.fetch_metadata(request).await
            }
            async fn enumerate_playlist(
                &self,
                extractor: &Path,
                url: &str,
            ) -> Result<Vec<PlaylistEntry>> {
                self.0.enumerate_playlist(extractor, url).await
            }
            async fn run_download(
                &self,
                job: &DownloadJob,
                sink: Arc<dyn ProgressSink>,
            ) -> Result<DownloadOutcome> {
                self.0.run_download(job, sink).await
            }
        }

        let downloader = MediaDownloader::with_snapshot(snapshot(tools))
            .with_engine(Box::new(Shared(engine.clone())));
        (downloader, engine)
    }

    #[tokio::test]
    async fn missing_transcoder_fails_before_any_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (downloader, engine) = downloader_with(&[Tool::YtDlp], Arc::new(FakeEngine::new()));

        let options = VideoOptions::default().with_output_dir(&out);
        let err = downloader
            .download_video("https://www.youtube.com/watch?v=abc", &options)
            .await
            .unwrap_err();

        match err {
            Error::DependencyMissing { dependency } => assert_eq!(dependency, "ffmpeg"),
            other => panic!("expected DependencyMissing, got {:?}", other),
        }
        assert!(!out.exists(), "output dir must not be created on fail-fast");
        assert_eq!(engine.metadata_calls.load(Ordering::SeqCst), 0);
        assert!(engine.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn video_without_audio_degrades_to_premerged() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (downloader, engine) = downloader_with(&[Tool::YtDlp], Arc::new(FakeEngine::new()));

        let options = VideoOptions::default()
            .with_output_dir(&out)
            .with_audio(false);
        let result = downloader
            .download_video("https://www.youtube.com/watch?v=abc", &options)
            .await
            .unwrap();

        let jobs = engine.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].selector, "best[ext=mp4]/best");
        assert!(!jobs[0].needs_merge);
        assert!(jobs[0].transcoder.is_none());
        assert!(result.path.exists());
        assert_eq!(result.filesize, Some("media bytes".len() as u64));
    }

    #[tokio::test]
    async fn merged_video_reports_reencoded_audio() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (downloader, engine) = downloader_with(
            &[Tool::YtDlp, Tool::Ffmpeg, Tool::Node],
            Arc::new(FakeEngine::new()),
        );

        let options = VideoOptions::default()
            .with_output_dir(&out)
            .with_resolution(Resolution::Cap(1080));
        let result = downloader
            .download_video("https://www.youtube.com/watch?v=abc", &options)
            .await
            .unwrap();

        let jobs = engine.jobs.lock().unwrap();
        assert!(jobs[0].needs_merge);
        assert!(jobs[0].selector.contains("bestvideo[height<=1080]"));
        assert_eq!(result.audio_codec.as_deref(), Some("aac"));
        assert_eq!(result.resolution.as_deref(), Some("1080p"));
        assert_eq!(result.video_codec.as_deref(), Some("avc1.640028"));
    }

    #[tokio::test]
    async fn audio_download_yields_mp3_result() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (downloader, engine) = downloader_with(
            &[Tool::YtDlp, Tool::Ffmpeg],
            Arc::new(FakeEngine::new()),
        );

        let options = AudioOptions::default().with_output_dir(&out);
        let result = downloader
            .download_audio("https://www.youtube.com/watch?v=song", &options)
            .await
            .unwrap();

        let jobs = engine.jobs.lock().unwrap();
        assert!(jobs[0].extract_audio);
        assert_eq!(jobs[0].selector, "bestaudio/best");
        assert_eq!(jobs[0].audio_bitrate_kbps, 320);
        assert_eq!(result.audio_codec.as_deref(), Some("mp3"));
        assert_eq!(result.resolution, None);
        assert_eq!(result.video_codec, None);
        assert!(result.path.extension().is_some_and(|e| e == "mp3"));
    }

    #[tokio::test]
    async fn audio_without_transcoder_is_rejected() {
        let (downloader, engine) = downloader_with(&[Tool::YtDlp], Arc::new(FakeEngine::new()));
        let err = downloader
            .download_audio(
                "https://www.youtube.com/watch?v=song",
                &AudioOptions::default(),
            )
            .await
            .unwrap_err();
        match err {
            Error::DependencyMissing { dependency } => assert_eq!(dependency, "ffmpeg"),
            other => panic!("expected DependencyMissing, got {:?}", other),
        }
        assert!(engine.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn playlist_records_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let entries = vec![
            PlaylistEntry {
                id: "item1".into(),
                title: Some("First".into()),
                url: "https://www.youtube.com/watch?v=item1".into(),
            },
            PlaylistEntry {
                id: "item2".into(),
                title: Some("Second".into()),
                url: "https://www.youtube.com/watch?v=item2".into(),
            },
            PlaylistEntry {
                id: "item3".into(),
                title: Some("Third".into()),
                url: "https://www.youtube.com/watch?v=item3".into(),
            },
        ];
        let engine = FakeEngine::new()
            .with_entries(entries)
            .failing_on("https://www.youtube.com/watch?v=item2");
        let (downloader, engine) =
            downloader_with(&[Tool::YtDlp, Tool::Ffmpeg, Tool::Node], Arc::new(engine));
        let sink = Arc::new(RecordingSink {
            items: Mutex::new(Vec::new()),
        });
        let downloader = downloader.with_progress_sink(sink.clone());

        let options = PlaylistOptions::default().with_output_dir(&out);
        let result = downloader
            .download_playlist("https://www.youtube.com/playlist?list=PLx", &options)
            .await
            .unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(
            result.success_count() + result.failed_count(),
            result.total
        );
        assert_eq!(result.downloads[0].title, "item1");
        assert_eq!(result.downloads[1].title, "item3");
        assert_eq!(result.failed[0].0, "https://www.youtube.com/watch?v=item2");

        // Every item ran as a single-video job, in source order
        let jobs = engine.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| !j.allow_playlist));

        let items = sink.items.lock().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], (1, 3, "First".to_string()));
        assert_eq!(items[2], (3, 3, "Third".to_string()));
    }

    #[tokio::test]
    async fn playlist_requires_transcoder_upfront() {
        let engine = FakeEngine::new().with_entries(vec![PlaylistEntry {
            id: "item1".into(),
            title: None,
            url: "https://www.youtube.com/watch?v=item1".into(),
        }]);
        let (downloader, engine) = downloader_with(&[Tool::YtDlp], Arc::new(engine));
        let err = downloader
            .download_playlist(
                "https://www.youtube.com/playlist?list=PLx",
                &PlaylistOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "DependencyMissing");
        assert!(engine.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn playlist_url_without_opt_in_downloads_one_video() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (downloader, engine) = downloader_with(
            &[Tool::YtDlp, Tool::Ffmpeg, Tool::Node],
            Arc::new(FakeEngine::new()),
        );

        let options = VideoOptions::default().with_output_dir(&out);
        downloader
            .download_video(
                "https://www.youtube.com/watch?v=abc&list=PLxyz",
                &options,
            )
            .await
            .unwrap();

        let jobs = engine.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(!jobs[0].allow_playlist);
    }

    #[tokio::test]
    async fn get_metadata_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (downloader, _engine) = downloader_with(
            &[Tool::YtDlp, Tool::Ffmpeg],
            Arc::new(FakeEngine::new()),
        );

        let metadata = downloader
            .get_metadata("https://www.youtube.com/watch?v=abc")
            .await
            .unwrap();
        assert_eq!(metadata.title, "abc");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn metadata_without_extractor_is_rejected() {
        let (downloader, _engine) = downloader_with(&[], Arc::new(FakeEngine::new()));
        let err = downloader
            .get_metadata("https://www.youtube.com/watch?v=abc")
            .await
            .unwrap_err();
        match err {
            Error::DependencyMissing { dependency } => assert_eq!(dependency, "yt-dlp"),
            other => panic!("expected DependencyMissing, got {:?}", other),
        }
    }

    #[test]
    fn verify_output_distinguishes_merge_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.mp4");
        assert_eq!(verify_output(&missing, true).unwrap_err().kind(), "MergeError");
        assert_eq!(
            verify_output(&missing, false).unwrap_err().kind(),
            "DownloadFailed"
        );

        let empty = dir.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(verify_output(&empty, true).unwrap_err().kind(), "MergeError");

        let good = dir.path().join("good.mp4");
        std::fs::write(&good, b"data").unwrap();
        assert_eq!(verify_output(&good, false).unwrap(), 4);
    }
}
