// External tool discovery

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    YtDlp,
    Ffmpeg,
    Node,
    Deno,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Ffmpeg => "ffmpeg",
            Tool::Node => "node",
            Tool::Deno => "deno",
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Tool::YtDlp => "extraction engine",
            Tool::Ffmpeg => "transcoder",
            Tool::Node | Tool::Deno => "JS runtime",
        }
    }

    pub fn binary_name(&self) -> String {
        if cfg!(target_os = "windows") {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }

    /// Environment variable that overrides discovery for this tool
    pub fn override_var(&self) -> &'static str {
        match self {
            Tool::YtDlp => "YTMEDIA_YTDLP",
            Tool::Ffmpeg => "YTMEDIA_FFMPEG",
            Tool::Node => "YTMEDIA_NODE",
            Tool::Deno => "YTMEDIA_DENO",
        }
    }

    pub fn version_arg(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "-version",
            _ => "--version",
        }
    }

    pub fn all() -> [Tool; 4] {
        [Tool::YtDlp, Tool::Ffmpeg, Tool::Node, Tool::Deno]
    }
}

/// Where a tool was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Explicit override via environment variable
    Override,
    /// A directory on PATH
    PathSearch,
    /// The managed bin directory this crate installs into
    Bundled,
    /// A conventional install location not on PATH
    WellKnown,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Override => "env override",
            DiscoverySource::PathSearch => "PATH",
            DiscoverySource::Bundled => "bundled",
            DiscoverySource::WellKnown => "well-known path",
        }
    }
}

/// A discovered executable
#[derive(Debug, Clone)]
pub struct Located {
    pub path: PathBuf,
    pub source: DiscoverySource,
}

/// Pluggable executable lookup.
///
/// Probing reports absence as None; it never errors.
pub trait Locator: Send + Sync {
    fn locate(&self, tool: Tool) -> Option<Located>;
}

/// Production lookup against the real filesystem and environment.
///
/// Search order, first match wins:
/// 1. the tool's override environment variable
/// 2. each PATH directory, in listed order
/// 3. the managed bin directory
/// 4. conventional install locations
pub struct SystemLocator;

impl Locator for SystemLocator {
    fn locate(&self, tool: Tool) -> Option<Located> {
        if let Some(value) = env::var_os(tool.override_var()) {
            let path = PathBuf::from(value);
            if is_executable(&path) {
                return Some(Located {
                    path,
                    source: DiscoverySource::Override,
                });
            }
        }

        let binary = tool.binary_name();

        if let Some(raw_path) = env::var_os("PATH") {
            let dirs: Vec<PathBuf> = env::split_paths(&raw_path).collect();
            if let Some(path) = locate_in(&dirs, &binary) {
                return Some(Located {
                    path,
                    source: DiscoverySource::PathSearch,
                });
            }
        }

        if let Some(dir) = bundled_dir() {
            if let Some(path) = locate_in(&[dir], &binary) {
                return Some(Located {
                    path,
                    source: DiscoverySource::Bundled,
                });
            }
        }

        locate_in(&well_known_dirs(), &binary).map(|path| Located {
            path,
            source: DiscoverySource::WellKnown,
        })
    }
}

/// First directory in `dirs` holding an executable named `binary`.
pub fn locate_in(dirs: &[PathBuf], binary: &str) -> Option<PathBuf> {
    for dir in dirs {
        let candidate = dir.join(binary);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    true
}

/// Directory this crate installs bundled tools into
pub fn bundled_dir() -> Option<PathBuf> {
    Some(dirs::data_dir()?.join("ytmedia").join("bin"))
}

fn well_known_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
    ]
}

/// PATH with the managed bin directory prepended, for child processes
/// that do their own tool lookup.
pub fn enhanced_path_env() -> Option<OsString> {
    let bundled = bundled_dir()?;
    let current = env::var_os("PATH").unwrap_or_default();
    let mut paths = vec![bundled];
    paths.extend(env::split_paths(&current));
    env::join_paths(paths).ok()
}

/// Version string of an installed tool. Spawns the tool, so this stays out
/// of the probe path; only diagnostics call it.
pub fn tool_version(tool: Tool, path: &Path) -> Option<String> {
    let output = Command::new(path).arg(tool.version_arg()).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("").trim();
    match tool {
        // "ffmpeg version 6.1.1-3ubuntu5 ..." -> "6.1.1-3ubuntu5"
        Tool::Ffmpeg => first_line.split_whitespace().nth(2).map(|s| s.to_string()),
        _ => {
            if first_line.is_empty() {
                None
            } else {
                Some(first_line.to_string())
            }
        }
    }
}
