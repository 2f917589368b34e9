// CLI entry point

mod install;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};

use ytmedia::downloader::tools::tool_version;
use ytmedia::{
    AudioOptions, CapabilitySnapshot, Error, MediaDownloader, Phase, PlaylistOptions,
    ProgressSink, ProgressUpdate, Resolution, Tool, VideoOptions,
};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "ytmedia")]
#[command(about = "Download MP4 and MP3 from YouTube at the highest possible quality")]
#[command(version)]
struct Cli {
    /// Pass the extraction engine's own output through verbatim
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a video as MP4
    Mp4 {
        url: String,

        /// Directory the file lands in
        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,

        /// Resolution cap: "best", or a height like "1080" or "720p"
        #[arg(short, long, default_value = "best")]
        resolution: Resolution,

        /// Keep only the video track
        #[arg(long)]
        no_audio: bool,
    },
    /// Extract the audio track as MP3
    Mp3 {
        url: String,

        /// Directory the file lands in
        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,

        /// MP3 bitrate in kbps
        #[arg(short, long, default_value_t = 320)]
        quality: u32,
    },
    /// Download every item of a playlist as MP4
    Playlist {
        url: String,

        /// Directory the files land in
        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,

        /// Resolution cap: "best", or a height like "1080" or "720p"
        #[arg(short, long, default_value = "best")]
        resolution: Resolution,
    },
    /// Show metadata for a URL without downloading anything
    Info { url: String },
    /// Report which external tools are installed and what that allows
    Doctor,
    /// Set up the external tools this program depends on
    InstallDeps,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", render_error(&error));
            ExitCode::FAILURE
        }
    }
}

/// Typed errors carry their kind so callers and scripts can branch on it.
fn render_error(error: &anyhow::Error) -> String {
    match error.downcast_ref::<Error>() {
        Some(typed) => format!("{}{}:{} {}", RED, typed.kind(), RESET, typed),
        None => format!("{}error:{} {}", RED, RESET, error),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Mp4 {
            url,
            output,
            resolution,
            no_audio,
        } => {
            let options = VideoOptions::default()
                .with_resolution(resolution)
                .with_output_dir(output)
                .with_audio(!no_audio)
                .with_debug(cli.debug);
            let (downloader, sink) = build_downloader();
            let result = downloader.download_video(&url, &options).await;
            sink.finish();
            println!("{}Saved{} {}", GREEN, RESET, result?);
        }
        Command::Mp3 {
            url,
            output,
            quality,
        } => {
            let options = AudioOptions::default()
                .with_bitrate(quality)
                .with_output_dir(output)
                .with_debug(cli.debug);
            let (downloader, sink) = build_downloader();
            let result = downloader.download_audio(&url, &options).await;
            sink.finish();
            println!("{}Saved{} {}", GREEN, RESET, result?);
        }
        Command::Playlist {
            url,
            output,
            resolution,
        } => {
            let options = PlaylistOptions::default()
                .with_resolution(resolution)
                .with_output_dir(output)
                .with_debug(cli.debug);
            let (downloader, sink) = build_downloader();
            let result = downloader.download_playlist(&url, &options).await;
            sink.finish();
            let result = result?;

            println!();
            for item in &result.downloads {
                println!("  {}✓{} {}", GREEN, RESET, item);
            }
            for (item_url, error) in &result.failed {
                println!("  {}✗{} {}: {}", RED, RESET, item_url, error);
            }
            println!(
                "{}Downloaded {}/{} items{}",
                BOLD,
                result.success_count(),
                result.total,
                RESET
            );
            if result.total > 0 && result.success_count() == 0 {
                anyhow::bail!("all {} playlist items failed", result.total);
            }
        }
        Command::Info { url } => {
            let metadata = MediaDownloader::new().get_metadata(&url).await?;
            println!("{}Title:{}    {}", BOLD, RESET, metadata.title);
            if let Some(uploader) = &metadata.uploader {
                println!("{}Uploader:{} {}", BOLD, RESET, uploader);
            }
            println!("{}Duration:{} {}", BOLD, RESET, metadata.duration_display());
            if let Some(views) = metadata.view_count {
                println!("{}Views:{}    {}", BOLD, RESET, views);
            }
            if let Some(label) = metadata.resolution_label() {
                println!("{}Quality:{}  {}", BOLD, RESET, label);
            }
            if let Some(page) = &metadata.webpage_url {
                println!("{}URL:{}      {}", BOLD, RESET, page);
            }
            if !metadata.formats.is_empty() {
                println!("{}Formats:{}  {} available", BOLD, RESET, metadata.formats.len());
            }
        }
        Command::Doctor => doctor(),
        Command::InstallDeps => install::run().await?,
    }
    Ok(())
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "ytmedia=debug" } else { "ytmedia=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .without_time()
        .init();
}

fn build_downloader() -> (MediaDownloader, Arc<RenderSink>) {
    let sink = Arc::new(RenderSink::new());
    let downloader = MediaDownloader::new().with_progress_sink(sink.clone());
    (downloader, sink)
}

/// Prints one line per external tool plus a summary of what the current
/// tool set allows.
fn doctor() {
    let snapshot = CapabilitySnapshot::capture();

    println!(
        "{}{:<10} {:<24} {:<18} {}{}",
        BOLD, "TOOL", "STATUS", "SOURCE", "PATH", RESET
    );
    println!("{}", "-".repeat(78));
    for tool in Tool::all() {
        match snapshot.find_executable(tool) {
            Some(located) => {
                let version =
                    tool_version(tool, &located.path).unwrap_or_else(|| "installed".to_string());
                println!(
                    "{:<10} {}✓ {:<22}{} {:<18} {}",
                    tool.as_str(),
                    GREEN,
                    version,
                    RESET,
                    located.source.as_str(),
                    located.path.display()
                );
            }
            None => {
                println!(
                    "{:<10} {}✗ {:<22}{} {:<18} ({})",
                    tool.as_str(),
                    RED,
                    "missing",
                    RESET,
                    "",
                    tool.role()
                );
            }
        }
    }
    println!();

    let missing = snapshot.missing_dependencies();
    if missing.is_empty() {
        println!(
            "{}✓ Everything installed.{} MP4 downloads use split streams at full quality.",
            GREEN, RESET
        );
        return;
    }

    println!("{}Missing: {}{}", YELLOW, missing.join(", "), RESET);
    if !snapshot.has_extractor() {
        println!("Nothing can be downloaded without yt-dlp.");
    } else if !snapshot.has_transcoder() {
        println!("MP4 is limited to pre-merged streams and MP3 is unavailable without ffmpeg.");
    } else {
        println!("Without a JS runtime the highest quality tiers may be unreachable.");
    }
    println!("Run `ytmedia install-deps` to set up what is missing.");
}

/// Terminal renderer over the progress channel. One updating line per
/// phase, a heading per playlist item.
struct RenderSink {
    state: Mutex<RenderState>,
}

struct RenderState {
    last_phase: Option<Phase>,
    line_open: bool,
}

impl RenderSink {
    fn new() -> Self {
        Self {
            state: Mutex::new(RenderState {
                last_phase: None,
                line_open: false,
            }),
        }
    }

    /// Terminates any updating line so later output starts clean.
    fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        if state.line_open {
            println!();
            state.line_open = false;
        }
    }
}

impl ProgressSink for RenderSink {
    fn on_phase_update(&self, update: ProgressUpdate) {
        let mut state = self.state.lock().unwrap();
        if state.last_phase != Some(update.phase) {
            if state.line_open {
                println!();
                state.line_open = false;
            }
            match update.phase {
                Phase::Video => println!("Downloading video stream..."),
                Phase::Audio => println!("Downloading audio stream..."),
                Phase::Merge => println!("Merging and converting..."),
            }
            state.last_phase = Some(update.phase);
        }

        if let Some(percent) = update.percent {
            let size = update.size.as_deref().unwrap_or("?");
            let speed = update.speed.as_deref().unwrap_or("?");
            let eta = update.eta.as_deref().unwrap_or("--:--");
            print!(
                "\r  {:>5.1}% of {:>12} at {:>14}  ETA {:<8}",
                percent, size, speed, eta
            );
            let _ = std::io::stdout().flush();
            state.line_open = true;
        }
    }

    fn on_item_start(&self, index: usize, total: usize, title: &str) {
        let mut state = self.state.lock().unwrap();
        if state.line_open {
            println!();
            state.line_open = false;
        }
        state.last_phase = None;
        println!("\n{}[{}/{}]{} {}", BOLD, index, total, RESET, title);
    }
}
