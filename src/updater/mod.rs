// Managed-binary lifecycle: release resolution and atomic installation.

pub mod install;
pub mod release;

pub use install::Installer;
pub use release::{GitHubReleases, Release, ReleaseIndex, ReleaseResolver, VersionInfo};

const USER_AGENT: &str = "SoundClip/1.0";

pub(crate) fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}
