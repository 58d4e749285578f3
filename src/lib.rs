//! Core engine of the SoundClip audio downloader: spawns and supervises the
//! external extraction tool (yt-dlp), parses its output into live progress
//! and log events, and keeps the two managed binaries (yt-dlp, ffmpeg)
//! installed and upgradable via atomic, crash-safe downloads.
//!
//! The UI layer is an external collaborator: it sends commands through
//! [`SoundClip`] and consumes [`Event`]s from the ordered channel created by
//! [`EventSink::channel`].

pub mod api;
pub mod downloader;
pub mod error;
pub mod events;
pub mod settings;
pub mod tools;
pub mod updater;

pub use api::SoundClip;
pub use downloader::{AudioFormat, JobRequest, Supervisor};
pub use error::Error;
pub use events::{Event, EventSink, Outcome};
pub use settings::Settings;
pub use tools::{DepsStatus, ToolKind};
pub use updater::{Installer, ReleaseResolver, VersionInfo};
