// The command surface consumed by the UI boundary layer: dependency checks,
// settings, download start/cancel, update checks and installs.

use std::path::PathBuf;

use crate::downloader::{JobRequest, Supervisor};
use crate::error::Error;
use crate::events::{EventSink, Outcome};
use crate::settings::Settings;
use crate::tools::{self, DepsStatus, ToolKind};
use crate::updater::{Installer, ReleaseResolver, VersionInfo};

/// One application instance: a supervisor for the single download job and an
/// installer for the two managed binaries, sharing one event channel.
pub struct SoundClip {
    bin_dir: PathBuf,
    supervisor: Supervisor,
    installer: Installer,
    resolver: ReleaseResolver,
}

impl SoundClip {
    /// Use the per-machine managed-binary directory.
    pub fn new(sink: EventSink) -> Self {
        Self::with_bin_dir(sink, tools::bin_dir())
    }

    pub fn with_bin_dir(sink: EventSink, bin_dir: PathBuf) -> Self {
        Self {
            supervisor: Supervisor::new(sink.clone(), bin_dir.clone()),
            installer: Installer::new(sink, bin_dir.clone()),
            resolver: ReleaseResolver::new(bin_dir.clone()),
            bin_dir,
        }
    }

    pub fn check_dependencies(&self) -> DepsStatus {
        tools::check_dependencies(&self.bin_dir)
    }

    pub fn get_settings(&self) -> Settings {
        Settings::load()
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), String> {
        settings.save()
    }

    /// Run a download job to completion, emitting events along the way.
    pub async fn start_download(&self, request: JobRequest) -> Result<Outcome, Error> {
        self.supervisor.run(request).await
    }

    pub async fn cancel_download(&self) -> Result<(), Error> {
        self.supervisor.cancel().await
    }

    pub async fn check_update(&self, tool: ToolKind) -> Result<VersionInfo, Error> {
        self.resolver.check_update(tool).await
    }

    pub async fn install_tool(&self, tool: ToolKind, download_url: &str) -> Result<(), Error> {
        self.installer.install(tool, download_url).await
    }
}
