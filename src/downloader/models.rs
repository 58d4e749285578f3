// Common data models for the downloader

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Target audio container/codec for the extraction tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Keep whatever yt-dlp extracts, no conversion pass
    Best,
    Mp3,
    M4a,
    Opus,
    Flac,
    Wav,
    Aac,
    Alac,
    Vorbis,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Aac => "aac",
            Self::Alac => "alac",
            Self::Vorbis => "vorbis",
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Best
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(Self::Best),
            "mp3" => Ok(Self::Mp3),
            "m4a" => Ok(Self::M4a),
            "opus" => Ok(Self::Opus),
            "flac" => Ok(Self::Flac),
            "wav" => Ok(Self::Wav),
            "aac" => Ok(Self::Aac),
            "alac" => Ok(Self::Alac),
            "vorbis" => Ok(Self::Vorbis),
            other => Err(Error::InvalidRequest(format!(
                "unknown audio format: {}",
                other
            ))),
        }
    }
}

/// One user-initiated extraction job. Immutable once the job starts.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub url: String,
    pub format: AudioFormat,
    pub playlist: bool,
    pub dest: PathBuf,
}

impl JobRequest {
    pub fn new(
        url: impl Into<String>,
        format: AudioFormat,
        playlist: bool,
        dest: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            format,
            playlist,
            dest: dest.into(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.url.trim().is_empty() {
            return Err(Error::InvalidRequest("URL must not be empty".to_string()));
        }
        Ok(())
    }
}
