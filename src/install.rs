// Interactive setup for the external tools

use std::io::Write as _;

use anyhow::{bail, Context, Result};

use ytmedia::downloader::tools::bundled_dir;
use ytmedia::{CapabilitySnapshot, Tool};

const RELEASE_BASE: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download";

pub async fn run() -> Result<()> {
    let snapshot = CapabilitySnapshot::capture();
    if snapshot.missing_dependencies().is_empty() {
        println!("Everything is already installed. Nothing to do.");
        return Ok(());
    }

    if !snapshot.has_extractor() {
        offer_ytdlp().await?;
    }
    if !snapshot.has_transcoder() {
        print_ffmpeg_instructions();
    }
    if !snapshot.has_js_runtime() {
        print_js_runtime_note();
    }

    println!();
    let still_missing = snapshot.refresh().missing_dependencies();
    if still_missing.is_empty() {
        println!("Setup complete. Everything is installed.");
    } else {
        println!(
            "Still missing: {}. Run `ytmedia doctor` for details.",
            still_missing.join(", ")
        );
    }
    Ok(())
}

/// yt-dlp ships as a single static binary, so it is the one tool this
/// program can install by itself.
async fn offer_ytdlp() -> Result<()> {
    println!("yt-dlp (extraction engine) is not installed.");
    println!("  [1] Download the latest release automatically");
    println!("  [2] Show manual installation instructions");
    println!("  [s] Skip");
    print!("> ");
    std::io::stdout().flush()?;

    let mut choice = String::new();
    std::io::stdin().read_line(&mut choice)?;
    match choice.trim() {
        "1" => install_ytdlp().await,
        "2" => {
            print_ytdlp_instructions();
            Ok(())
        }
        _ => {
            println!("Skipped.");
            Ok(())
        }
    }
}

async fn install_ytdlp() -> Result<()> {
    let dir = bundled_dir().context("no usable data directory on this system")?;
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("could not create {}", dir.display()))?;
    let target = dir.join(Tool::YtDlp.binary_name());

    let url = release_url()?;
    println!("Downloading {} ...", url);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;
    let bytes = client
        .get(&url)
        .send()
        .await
        .context("download failed")?
        .error_for_status()?
        .bytes()
        .await
        .context("download was interrupted")?;
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("could not write {}", target.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&target).await?.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&target, perms).await?;
    }

    println!("Installed yt-dlp to {}", target.display());
    Ok(())
}

fn release_url() -> Result<String> {
    let asset = match std::env::consts::OS {
        "windows" => "yt-dlp.exe",
        "macos" => "yt-dlp_macos",
        "linux" => "yt-dlp",
        other => bail!("no prebuilt yt-dlp binary for {}", other),
    };
    Ok(format!("{}/{}", RELEASE_BASE, asset))
}

fn print_ytdlp_instructions() {
    println!();
    println!("Install yt-dlp one of these ways, then re-run `ytmedia doctor`:");
    match std::env::consts::OS {
        "macos" => println!("  brew install yt-dlp"),
        "windows" => println!("  winget install yt-dlp.yt-dlp"),
        _ => println!("  pipx install yt-dlp   (or your distribution's package)"),
    }
    println!("  or grab a release binary: https://github.com/yt-dlp/yt-dlp/releases");
}

fn print_ffmpeg_instructions() {
    println!();
    println!("ffmpeg (transcoder) is not installed. It is required for MP3 and for");
    println!("full-quality MP4 downloads. Install it with your package manager:");
    match std::env::consts::OS {
        "macos" => println!("  brew install ffmpeg"),
        "windows" => {
            println!("  winget install Gyan.FFmpeg");
            println!("  or download a build from https://www.gyan.dev/ffmpeg/builds/");
        }
        _ => {
            println!("  Debian/Ubuntu: sudo apt install ffmpeg");
            println!("  Fedora:        sudo dnf install ffmpeg");
            println!("  Arch:          sudo pacman -S ffmpeg");
        }
    }
}

fn print_js_runtime_note() {
    println!();
    println!("No JS runtime (node or deno) was found. Downloads still work, but the");
    println!("highest quality tiers may be out of reach.");
    println!("  node: https://nodejs.org    deno: https://deno.com");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_url_points_at_a_single_binary_asset() {
        let url = release_url().unwrap();
        assert!(url.starts_with(RELEASE_BASE));
        let asset = url.rsplit('/').next().unwrap();
        assert!(asset.starts_with("yt-dlp"));
    }

    #[test]
    fn install_target_uses_the_managed_binary_name() {
        let name = Tool::YtDlp.binary_name();
        assert!(name.starts_with("yt-dlp"));
    }
}
