// yt-dlp engine adapter
//
// Builds the argument lists, spawns the probed binary, streams its
// stdout through the progress grammar, and classifies failures. All
// policy lives in the orchestrator; this module only executes jobs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::errors::{Error, Result};
use super::format_selector::audio_quality_arg;
use super::models::MediaMetadata;
use super::progress::{
    classify_destination, parse_progress_line, Phase, ProgressEvent, ProgressSink, ProgressUpdate,
};
use super::tools::enhanced_path_env;
use super::traits::{
    DownloadJob, DownloadOutcome, ExtractionEngine, MetadataRequest, PlaylistEntry,
};
use super::utils::run_output_with_timeout;

const METADATA_TIMEOUT_SECS: u64 = 30;
const ENUMERATION_TIMEOUT_SECS: u64 = 120;

/// Production engine driving the probed yt-dlp binary
pub struct YtDlpEngine;

/// True when the URL carries a playlist query parameter.
pub fn url_has_playlist_param(url: &str) -> bool {
    url.split(['?', '&', '#'])
        .skip(1)
        .any(|part| part.starts_with("list="))
}

fn build_download_args(job: &DownloadJob) -> Vec<String> {
    let mut args = vec!["-f".to_string(), job.selector.clone()];

    if job.allow_playlist {
        args.push("--yes-playlist".to_string());
    } else {
        args.push("--no-playlist".to_string());
    }

    args.push("--newline".to_string());
    if job.debug {
        args.push("--verbose".to_string());
    } else {
        args.push("--no-warnings".to_string());
    }
    args.push("--socket-timeout".to_string());
    args.push("30".to_string());

    args.push("-P".to_string());
    args.push(job.output_dir.display().to_string());
    args.push("-o".to_string());
    args.push("%(title)s.%(ext)s".to_string());

    if job.extract_audio {
        args.push("-x".to_string());
        args.push("--audio-format".to_string());
        args.push("mp3".to_string());
        args.push("--audio-quality".to_string());
        args.push(audio_quality_arg(job.audio_bitrate_kbps));
    } else {
        args.push("--merge-output-format".to_string());
        args.push("mp4".to_string());
        if job.needs_merge {
            // Stream-copy the video, re-encode the audio to AAC so the
            // MP4 plays everywhere regardless of the source codec.
            args.push("--ppa".to_string());
            args.push("Merger:-c:v copy -c:a aac".to_string());
        }
    }

    if let Some(transcoder) = &job.transcoder {
        args.push("--ffmpeg-location".to_string());
        args.push(transcoder.display().to_string());
    }

    args.push(job.url.clone());
    args
}

fn build_metadata_args(request: &MetadataRequest) -> Vec<String> {
    let mut args = vec![
        "--dump-json".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--socket-timeout".to_string(),
        "15".to_string(),
        "--retries".to_string(),
        "2".to_string(),
    ];
    if let Some(selector) = &request.selector {
        args.push("-f".to_string());
        args.push(selector.clone());
    }
    args.push(request.url.clone());
    args
}

fn playlist_entry_from_json(value: &serde_json::Value) -> Option<PlaylistEntry> {
    let id = value.get("id")?.as_str()?.to_string();
    let title = value
        .get("title")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string());
    let url = value
        .get("url")
        .and_then(|u| u.as_str())
        .map(|u| u.to_string())
        .or_else(|| {
            value
                .get("webpage_url")
                .and_then(|u| u.as_str())
                .map(|u| u.to_string())
        })
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", id));
    Some(PlaylistEntry { id, title, url })
}

#[async_trait]
impl ExtractionEngine for YtDlpEngine {
    async fn fetch_metadata(&self, request: &MetadataRequest) -> Result<MediaMetadata> {
        let args = build_metadata_args(request);
        tracing::debug!(url = %request.url, "fetching metadata");

        let output = run_output_with_timeout(&request.extractor, args, METADATA_TIMEOUT_SECS)
            .await
            .map_err(Error::download_failed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let requested = request.requested.as_deref().unwrap_or(&request.url);
            return Err(Error::classify(&stderr, requested));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| Error::download_failed("engine returned no metadata JSON"))?;
        serde_json::from_str(line)
            .map_err(|e| Error::download_failed(format!("could not decode engine JSON: {}", e)))
    }

    async fn enumerate_playlist(
        &self,
        extractor: &Path,
        url: &str,
    ) -> Result<Vec<PlaylistEntry>> {
        let args = vec![
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            "--yes-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
            url.to_string(),
        ];
        tracing::debug!(url = %url, "enumerating playlist");

        let output = run_output_with_timeout(extractor, args, ENUMERATION_TIMEOUT_SECS)
            .await
            .map_err(Error::download_failed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::classify(&stderr, url));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut entries = Vec::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if let Some(entry) = playlist_entry_from_json(&value) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn run_download(
        &self,
        job: &DownloadJob,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<DownloadOutcome> {
        let args = build_download_args(job);
        tracing::debug!(url = %job.url, selector = %job.selector, "starting engine");

        let mut command = TokioCommand::new(&job.extractor);
        command
            .args(&args)
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path_env) = enhanced_path_env() {
            command.env("PATH", path_env);
        }
        // Debug passes the engine's diagnostics straight to the terminal;
        // otherwise stderr is collected for failure classification.
        if job.debug {
            command.stderr(Stdio::inherit());
        } else {
            command.stderr(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|e| {
            Error::download_failed(format!(
                "Failed to start {}: {}",
                job.extractor.display(),
                e
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::download_failed("Failed to capture engine output"))?;

        let stderr_task = if job.debug {
            None
        } else {
            let mut stderr_pipe = child
                .stderr
                .take()
                .ok_or_else(|| Error::download_failed("Failed to capture engine stderr"))?;
            Some(tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr_pipe.read_to_end(&mut buf).await;
                buf
            }))
        };

        let mut lines = BufReader::new(stdout).lines();
        let mut phase = job.initial_phase;
        let mut final_path: Option<PathBuf> = None;
        let mut last_destination: Option<PathBuf> = None;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::download_failed(format!("Failed to read engine output: {}", e)))?
        {
            if job.debug {
                println!("{}", line);
            }

            let Some(event) = parse_progress_line(&line) else {
                continue;
            };
            match event {
                ProgressEvent::Downloading {
                    percent,
                    size,
                    speed,
                    eta,
                } => {
                    if !job.debug {
                        sink.on_phase_update(ProgressUpdate {
                            phase,
                            percent: Some(percent),
                            size,
                            speed,
                            eta,
                        });
                    }
                }
                ProgressEvent::Destination { filename } => {
                    if let Some(new_phase) = classify_destination(&filename) {
                        phase = new_phase;
                    }
                    last_destination = Some(PathBuf::from(filename));
                }
                ProgressEvent::MergeStarted { target } => {
                    phase = Phase::Merge;
                    if let Some(target) = target {
                        final_path = Some(PathBuf::from(target));
                    }
                    if !job.debug {
                        sink.on_phase_update(ProgressUpdate::indeterminate(Phase::Merge));
                    }
                }
                ProgressEvent::ExtractingAudio { target } => {
                    phase = Phase::Merge;
                    if let Some(target) = target {
                        final_path = Some(PathBuf::from(target));
                    }
                    if !job.debug {
                        sink.on_phase_update(ProgressUpdate::indeterminate(Phase::Merge));
                    }
                }
                ProgressEvent::AlreadyDownloaded { path } => {
                    if let Some(path) = path {
                        last_destination = Some(PathBuf::from(path));
                    }
                    if !job.debug {
                        sink.on_phase_update(ProgressUpdate {
                            phase,
                            percent: Some(100.0),
                            size: None,
                            speed: None,
                            eta: None,
                        });
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::download_failed(format!("Failed to wait for engine: {}", e)))?;

        if !status.success() {
            let stderr = match stderr_task {
                Some(task) => String::from_utf8_lossy(&task.await.unwrap_or_default()).to_string(),
                None => String::new(),
            };
            return Err(Error::classify(&stderr, &job.requested));
        }

        Ok(DownloadOutcome {
            final_path: final_path.or(last_destination),
        })
    }
}
