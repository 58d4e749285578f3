// Managed tool locations, dependency probing and process-tree termination.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The two externally sourced tools whose install lifecycle this crate owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    YtDlp,
    Ffmpeg,
}

/// Shape of the downloaded release artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// One executable, installed as-is
    SingleBinary,
    /// A zip containing one or more executables under a bin/ directory
    Archive,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => "yt-dlp",
            ToolKind::Ffmpeg => "ffmpeg",
        }
    }

    /// Platform binary name inside the managed bin directory.
    pub fn binary_name(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => {
                if cfg!(windows) {
                    "yt-dlp.exe"
                } else {
                    "yt-dlp"
                }
            }
            ToolKind::Ffmpeg => {
                if cfg!(windows) {
                    "ffmpeg.exe"
                } else {
                    "ffmpeg"
                }
            }
        }
    }

    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            // yt-dlp publishes a standalone executable per platform
            ToolKind::YtDlp => ArtifactKind::SingleBinary,
            // ffmpeg builds ship as an archive with ffmpeg + ffprobe
            ToolKind::Ffmpeg => ArtifactKind::Archive,
        }
    }

    pub fn install_path(&self, bin_dir: &Path) -> PathBuf {
        bin_dir.join(self.binary_name())
    }
}

/// Executables the ffmpeg build archive must contribute.
pub fn ffmpeg_archive_members() -> [&'static str; 2] {
    if cfg!(windows) {
        ["ffmpeg.exe", "ffprobe.exe"]
    } else {
        ["ffmpeg", "ffprobe"]
    }
}

/// Per-machine application data directory (e.g. `%LOCALAPPDATA%\SoundClip`).
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("SoundClip")
}

/// The one fixed location holding both managed executables.
pub fn bin_dir() -> PathBuf {
    app_data_dir().join("bin")
}

/// Installation status of both managed tools, for UI display.
#[derive(Debug, Clone, Serialize)]
pub struct DepsStatus {
    pub ytdlp: bool,
    pub ffmpeg: bool,
}

pub fn check_dependencies(bin_dir: &Path) -> DepsStatus {
    DepsStatus {
        ytdlp: ToolKind::YtDlp.install_path(bin_dir).is_file(),
        ffmpeg: is_ffmpeg_available(bin_dir),
    }
}

/// ffmpeg counts as present when the managed copy exists or a system copy is
/// reachable on PATH.
pub fn is_ffmpeg_available(bin_dir: &Path) -> bool {
    if ToolKind::Ffmpeg.install_path(bin_dir).is_file() {
        return true;
    }
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Self-reported version of the installed tool, `None` when not installed or
/// the probe fails.
pub async fn local_version(tool: ToolKind, bin_dir: &Path) -> Option<String> {
    let path = tool.install_path(bin_dir);
    if !path.is_file() {
        return None;
    }

    let version_arg = match tool {
        ToolKind::YtDlp => "--version",
        ToolKind::Ffmpeg => "-version",
    };

    let mut cmd = tokio::process::Command::new(&path);
    cmd.arg(version_arg)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null());
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW

    let output = cmd.output().await.ok()?;
    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout);
    match tool {
        ToolKind::YtDlp => {
            let version = text.trim();
            if version.is_empty() {
                None
            } else {
                Some(version.to_string())
            }
        }
        ToolKind::Ffmpeg => {
            // First line is like "ffmpeg version N-xxxxx-g... Copyright ..."
            let first_line = text.lines().next()?;
            let version = first_line
                .strip_prefix("ffmpeg version ")?
                .split_whitespace()
                .next()?;
            Some(version.to_string())
        }
    }
}

/// Force-stop a process together with every descendant it spawned. The
/// extraction tool launches the transcoding tool as a child, so killing the
/// top-level pid alone leaves orphaned work behind.
#[cfg(windows)]
pub fn kill_process_tree(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
}

/// On Unix the supervisor spawns the tool into its own process group, so a
/// signal to `-pid` reaches the whole tree.
#[cfg(unix)]
pub fn kill_process_tree(pid: u32) {
    let group = format!("-{}", pid);
    let group_killed = std::process::Command::new("kill")
        .args(["-9", &group])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !group_killed {
        let _ = std::process::Command::new("kill")
            .args(["-9", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }
}
