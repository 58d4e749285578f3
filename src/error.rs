// Error types for the downloader and updater

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed job request (empty URL, unknown format)
    InvalidRequest(String),

    /// A download job or installer action is already active
    AlreadyRunning,

    /// cancel() called with no job running (or one already being torn down)
    NotRunning,

    /// A managed tool is not installed in the bin directory
    DependencyMissing(String),

    /// The child process could not be spawned or reaped
    ProcessSpawnFailed(String),

    /// The extraction tool exited with a nonzero code
    ProcessExitedNonZero(i32),

    /// Release index query failed (network or malformed response)
    UpdateCheckFailed(String),

    /// Artifact transfer was interrupted or incomplete
    DownloadFailed(String),

    /// Archive extraction or atomic replace failed
    InstallFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::AlreadyRunning => write!(f, "Another operation is already in progress"),
            Self::NotRunning => write!(f, "No download is currently running"),
            Self::DependencyMissing(tool) => write!(
                f,
                "{} is not installed. Use Check Update to download it.",
                tool
            ),
            Self::ProcessSpawnFailed(msg) => write!(f, "Failed to start process: {}", msg),
            Self::ProcessExitedNonZero(code) => write!(f, "Tool exited with code {}", code),
            Self::UpdateCheckFailed(msg) => write!(f, "Update check failed: {}", msg),
            Self::DownloadFailed(msg) => write!(f, "Download failed: {}", msg),
            Self::InstallFailed(msg) => write!(f, "Install failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
