// Release index queries and staleness checks for the managed tools.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::http_client;
use crate::error::Error;
use crate::tools::{self, ToolKind};

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
}

/// Newest published artifact for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub tag: String,
    pub download_url: String,
}

/// Derived update status for UI display; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub local: Option<String>,
    pub latest: Option<String>,
    pub download_url: Option<String>,
    pub update_available: bool,
}

/// The remote release index. A seam so tests can fake the network.
#[async_trait]
pub trait ReleaseIndex: Send + Sync {
    async fn latest_release(&self, tool: ToolKind) -> Result<Release, Error>;
}

fn release_repo(tool: ToolKind) -> &'static str {
    match tool {
        ToolKind::YtDlp => "yt-dlp/yt-dlp",
        ToolKind::Ffmpeg => "yt-dlp/FFmpeg-Builds",
    }
}

fn select_asset<'a>(tool: ToolKind, assets: &'a [GitHubAsset]) -> Option<&'a GitHubAsset> {
    match tool {
        ToolKind::YtDlp => {
            let wanted = if cfg!(windows) {
                "yt-dlp.exe"
            } else if cfg!(target_os = "macos") {
                "yt-dlp_macos"
            } else {
                "yt-dlp"
            };
            assets.iter().find(|a| a.name == wanted)
        }
        ToolKind::Ffmpeg => {
            let platform = if cfg!(windows) {
                "win64"
            } else if cfg!(target_os = "macos") {
                "osx64"
            } else {
                "linux64"
            };
            assets
                .iter()
                .find(|a| a.name.contains(platform) && a.name.ends_with("-gpl.zip"))
        }
    }
}

/// GitHub releases API client.
pub struct GitHubReleases {
    api_base: String,
}

impl GitHubReleases {
    pub fn new() -> Self {
        Self::with_api_base("https://api.github.com")
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for GitHubReleases {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReleaseIndex for GitHubReleases {
    async fn latest_release(&self, tool: ToolKind) -> Result<Release, Error> {
        let url = format!(
            "{}/repos/{}/releases/latest",
            self.api_base,
            release_repo(tool)
        );

        let release: GitHubRelease = http_client()
            .map_err(|e| Error::UpdateCheckFailed(e.to_string()))?
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpdateCheckFailed(format!("network error: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::UpdateCheckFailed(format!("HTTP error: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::UpdateCheckFailed(format!("parse error: {}", e)))?;

        let asset = select_asset(tool, &release.assets).ok_or_else(|| {
            Error::UpdateCheckFailed(format!(
                "no {} artifact for this platform in release {}",
                tool.as_str(),
                release.tag_name
            ))
        })?;

        Ok(Release {
            tag: release.tag_name.clone(),
            download_url: asset.browser_download_url.clone(),
        })
    }
}

/// Compares the installed version against the release index.
pub struct ReleaseResolver {
    index: Box<dyn ReleaseIndex>,
    bin_dir: PathBuf,
}

impl ReleaseResolver {
    pub fn new(bin_dir: PathBuf) -> Self {
        Self::with_index(Box::new(GitHubReleases::new()), bin_dir)
    }

    pub fn with_index(index: Box<dyn ReleaseIndex>, bin_dir: PathBuf) -> Self {
        Self { index, bin_dir }
    }

    /// Staleness is a direct tag comparison, not semver ordering: upstream
    /// tags are date-shaped and not guaranteed strictly increasing. A missing
    /// local install is "nothing to update", but the download URL is still
    /// returned so a first install can proceed. Index failures surface as
    /// errors; a silent "up to date" would mask staleness.
    pub async fn check_update(&self, tool: ToolKind) -> Result<VersionInfo, Error> {
        let local = tools::local_version(tool, &self.bin_dir).await;
        let release = self.index.latest_release(tool).await?;

        let update_available = matches!(&local, Some(v) if *v != release.tag);
        debug!(
            "{}: local {:?}, latest {} -> update_available {}",
            tool.as_str(),
            local,
            release.tag,
            update_available
        );

        Ok(VersionInfo {
            local,
            latest: Some(release.tag),
            download_url: Some(release.download_url),
            update_available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RELEASE_JSON: &str = r#"{
        "tag_name": "2024.06.10",
        "assets": [
            {"name": "yt-dlp", "browser_download_url": "https://example.com/yt-dlp"},
            {"name": "yt-dlp.exe", "browser_download_url": "https://example.com/yt-dlp.exe"},
            {"name": "yt-dlp_macos", "browser_download_url": "https://example.com/yt-dlp_macos"},
            {"name": "SHA2-256SUMS", "browser_download_url": "https://example.com/sums"}
        ]
    }"#;

    struct FakeIndex(Release);

    #[async_trait]
    impl ReleaseIndex for FakeIndex {
        async fn latest_release(&self, _tool: ToolKind) -> Result<Release, Error> {
            Ok(self.0.clone())
        }
    }

    struct BrokenIndex;

    #[async_trait]
    impl ReleaseIndex for BrokenIndex {
        async fn latest_release(&self, _tool: ToolKind) -> Result<Release, Error> {
            Err(Error::UpdateCheckFailed("connection refused".to_string()))
        }
    }

    fn fake_resolver(tag: &str, bin_dir: PathBuf) -> ReleaseResolver {
        ReleaseResolver::with_index(
            Box::new(FakeIndex(Release {
                tag: tag.to_string(),
                download_url: "https://example.com/yt-dlp".to_string(),
            })),
            bin_dir,
        )
    }

    #[cfg(unix)]
    fn install_fake_ytdlp(dir: &std::path::Path, version: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\necho {}\n", version)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_release_json_asset_selection() {
        let release: GitHubRelease = serde_json::from_str(RELEASE_JSON).unwrap();
        assert_eq!(release.tag_name, "2024.06.10");

        let asset = select_asset(ToolKind::YtDlp, &release.assets).unwrap();
        assert!(asset.name.starts_with("yt-dlp"));
        assert!(asset.browser_download_url.starts_with("https://"));
    }

    #[test]
    fn test_ffmpeg_asset_matches_platform_zip() {
        let assets = vec![
            GitHubAsset {
                name: "ffmpeg-master-latest-win64-gpl.zip".to_string(),
                browser_download_url: "https://example.com/win".to_string(),
            },
            GitHubAsset {
                name: "ffmpeg-master-latest-linux64-gpl.zip".to_string(),
                browser_download_url: "https://example.com/linux".to_string(),
            },
            GitHubAsset {
                name: "ffmpeg-master-latest-osx64-gpl.zip".to_string(),
                browser_download_url: "https://example.com/osx".to_string(),
            },
        ];
        let asset = select_asset(ToolKind::Ffmpeg, &assets).unwrap();
        assert!(asset.name.ends_with("-gpl.zip"));
    }

    #[tokio::test]
    async fn test_absent_local_version_enables_first_install() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = fake_resolver("2024.06.10", dir.path().to_path_buf());

        let info = resolver.check_update(ToolKind::YtDlp).await.unwrap();
        assert_eq!(info.local, None);
        assert!(!info.update_available);
        assert!(info.download_url.is_some());
        assert_eq!(info.latest.as_deref(), Some("2024.06.10"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_differing_tags_mean_update_available() {
        let dir = tempfile::tempdir().unwrap();
        install_fake_ytdlp(dir.path(), "2024.01.01");
        let resolver = fake_resolver("2024.06.10", dir.path().to_path_buf());

        let info = resolver.check_update(ToolKind::YtDlp).await.unwrap();
        assert_eq!(info.local.as_deref(), Some("2024.01.01"));
        assert!(info.update_available);
        assert!(info.download_url.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_equal_tags_mean_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        install_fake_ytdlp(dir.path(), "2024.06.10");
        let resolver = fake_resolver("2024.06.10", dir.path().to_path_buf());

        let info = resolver.check_update(ToolKind::YtDlp).await.unwrap();
        assert!(!info.update_available);
    }

    #[tokio::test]
    async fn test_index_failure_surfaces_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ReleaseResolver::with_index(Box::new(BrokenIndex), dir.path().to_path_buf());

        let err = resolver.check_update(ToolKind::YtDlp).await.unwrap_err();
        assert!(matches!(err, Error::UpdateCheckFailed(_)));
    }

    #[tokio::test]
    async fn test_github_index_parses_release_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/yt-dlp/yt-dlp/releases/latest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(RELEASE_JSON, "application/json"),
            )
            .mount(&server)
            .await;

        let index = GitHubReleases::with_api_base(server.uri());
        let release = index.latest_release(ToolKind::YtDlp).await.unwrap();
        assert_eq!(release.tag, "2024.06.10");
        assert!(release.download_url.contains("yt-dlp"));
    }

    #[tokio::test]
    async fn test_github_index_http_error_is_update_check_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let index = GitHubReleases::with_api_base(server.uri());
        let err = index.latest_release(ToolKind::YtDlp).await.unwrap_err();
        assert!(matches!(err, Error::UpdateCheckFailed(_)));
    }
}
