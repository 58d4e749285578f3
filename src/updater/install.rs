// Crash-safe installation of managed binaries: download to a temporary file
// inside the bin directory, verify the transfer is complete, then rename over
// the final path. A reader of the install path sees the old binary or the new
// one, never a partial write.

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::http_client;
use crate::error::Error;
use crate::events::EventSink;
use crate::tools::{self, ArtifactKind, ToolKind};

pub struct Installer {
    sink: EventSink,
    bin_dir: PathBuf,
    // one installer action at a time; a second request is rejected, not queued
    busy: Arc<Mutex<()>>,
}

impl Installer {
    pub fn new(sink: EventSink, bin_dir: PathBuf) -> Self {
        Self {
            sink,
            bin_dir,
            busy: Arc::new(Mutex::new(())),
        }
    }

    /// Download and install the artifact for `tool`, replacing any previous
    /// copy only after the new one is completely on disk.
    pub async fn install(&self, tool: ToolKind, download_url: &str) -> Result<(), Error> {
        let _permit = self.busy.try_lock().map_err(|_| Error::AlreadyRunning)?;

        fs::create_dir_all(&self.bin_dir)
            .map_err(|e| Error::InstallFailed(format!("cannot create bin dir: {}", e)))?;

        match tool.artifact_kind() {
            ArtifactKind::SingleBinary => self.install_single(tool, download_url).await,
            ArtifactKind::Archive => self.install_archive(tool, download_url).await,
        }
    }

    async fn install_single(&self, tool: ToolKind, url: &str) -> Result<(), Error> {
        let target = tool.install_path(&self.bin_dir);
        let tmp = self.bin_dir.join(format!("{}.part", tool.binary_name()));

        self.sink
            .update_log(format!("Downloading {}...", tool.binary_name()));

        if let Err(e) = self.download_to(url, &tmp, tool.as_str()).await {
            // the previous install stays usable
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        let placed = make_executable(&tmp).and_then(|_| atomic_replace(&tmp, &target));
        if let Err(e) = placed {
            warn!("{} install failed: {}", tool.as_str(), e);
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        info!("{} installed at {}", tool.as_str(), target.display());
        self.sink
            .update_log(format!("{} installed successfully.", tool.binary_name()));
        Ok(())
    }

    async fn install_archive(&self, tool: ToolKind, url: &str) -> Result<(), Error> {
        let archive_tmp = self.bin_dir.join(format!("{}-build.zip.part", tool.as_str()));
        let staging = self.bin_dir.join(format!(".{}-staging", tool.as_str()));

        self.sink.update_log(format!(
            "Downloading {} build archive (this may take a minute)...",
            tool.as_str()
        ));

        if let Err(e) = self.download_to(url, &archive_tmp, tool.as_str()).await {
            let _ = fs::remove_file(&archive_tmp);
            return Err(e);
        }

        self.sink.update_log("Extracting archive...");
        let result = self.extract_and_place(&archive_tmp, &staging).await;

        // staging and the downloaded archive go away on every exit path
        let _ = fs::remove_dir_all(&staging);
        let _ = fs::remove_file(&archive_tmp);

        if result.is_ok() {
            self.sink
                .update_log(format!("{} installed successfully.", tool.as_str()));
        }
        result
    }

    async fn extract_and_place(&self, archive: &Path, staging: &Path) -> Result<(), Error> {
        if staging.exists() {
            fs::remove_dir_all(staging)
                .map_err(|e| Error::InstallFailed(format!("cannot clear staging dir: {}", e)))?;
        }
        fs::create_dir_all(staging)
            .map_err(|e| Error::InstallFailed(format!("cannot create staging dir: {}", e)))?;

        let archive = archive.to_path_buf();
        let staging_dir = staging.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let members = tools::ffmpeg_archive_members();
            extract_members(&archive, &staging_dir, &members)
        })
        .await
        .map_err(|e| Error::InstallFailed(format!("extraction task failed: {}", e)))??;

        // verify the whole set before touching any install path
        for member in tools::ffmpeg_archive_members() {
            if !staging.join(member).is_file() {
                return Err(Error::InstallFailed(format!(
                    "{} not found in archive",
                    member
                )));
            }
        }

        for member in tools::ffmpeg_archive_members() {
            let staged = staging.join(member);
            make_executable(&staged)?;
            atomic_replace(&staged, &self.bin_dir.join(member))?;
            self.sink.update_log(format!("Installed {}", member));
        }
        Ok(())
    }

    /// Stream the response body to `path`, reporting progress as update-log
    /// lines. A body shorter than the advertised length is an error; the
    /// caller discards the temporary file.
    async fn download_to(&self, url: &str, path: &Path, label: &str) -> Result<u64, Error> {
        let client =
            http_client().map_err(|e| Error::DownloadFailed(e.to_string()))?;

        let mut response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::DownloadFailed(format!("network error: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::DownloadFailed(format!("HTTP {}", response.status())));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| Error::DownloadFailed(format!("cannot create {}: {}", path.display(), e)))?;

        let mut written: u64 = 0;
        let mut next_report: u64 = 25;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    return Err(Error::DownloadFailed(format!("transfer interrupted: {}", e)))
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::DownloadFailed(format!("write error: {}", e)))?;
            written += chunk.len() as u64;

            if let Some(total) = total {
                let pct = written * 100 / total.max(1);
                if pct >= next_report {
                    self.sink
                        .update_log(format!("Downloading {}... {}%", label, pct.min(100)));
                    next_report = (pct / 25 + 1) * 25;
                }
            }
        }
        file.flush()
            .await
            .map_err(|e| Error::DownloadFailed(format!("write error: {}", e)))?;

        if let Some(total) = total {
            if written != total {
                return Err(Error::DownloadFailed(format!(
                    "incomplete transfer: {} of {} bytes",
                    written, total
                )));
            }
        }
        Ok(written)
    }
}

/// Pull the wanted executables out of the build archive into the staging
/// directory. Builds nest them as `<build>/bin/<name>`.
fn extract_members(archive_path: &Path, staging: &Path, members: &[&str]) -> Result<(), Error> {
    let file = fs::File::open(archive_path)
        .map_err(|e| Error::InstallFailed(format!("cannot open archive: {}", e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::InstallFailed(format!("zip error: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::InstallFailed(format!("zip entry error: {}", e)))?;
        if !entry.is_file() {
            continue;
        }
        let name = entry.name().replace('\\', "/");

        for member in members {
            if name.ends_with(&format!("/bin/{}", member)) || name == *member {
                let out = staging.join(member);
                let mut out_file = fs::File::create(&out)
                    .map_err(|e| Error::InstallFailed(format!("cannot stage {}: {}", member, e)))?;
                std::io::copy(&mut entry, &mut out_file)
                    .map_err(|e| Error::InstallFailed(format!("extract error: {}", e)))?;
                break;
            }
        }
    }
    Ok(())
}

/// Single filesystem rename; the destination is never in a half-written
/// state. On Windows the old copy is removed first, so a destination held
/// open by a running process fails before the staged file is consumed.
fn atomic_replace(tmp: &Path, target: &Path) -> Result<(), Error> {
    #[cfg(windows)]
    if target.is_file() {
        fs::remove_file(target)
            .map_err(|e| Error::InstallFailed(format!("cannot remove old binary: {}", e)))?;
    }
    fs::rename(tmp, target).map_err(|e| Error::InstallFailed(format!("rename failed: {}", e)))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::InstallFailed(format!("cannot set permissions: {}", e)))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use std::io::Write;
    use std::time::Duration;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zip::write::SimpleFileOptions;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(cursor);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(name.to_string(), options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn has_leftovers(dir: &Path) -> bool {
        fs::read_dir(dir).unwrap().any(|entry| {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            name.ends_with(".part") || name.starts_with('.')
        })
    }

    #[test]
    fn test_atomic_replace_swaps_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("yt-dlp");
        let tmp = dir.path().join("yt-dlp.part");
        fs::write(&target, "old").unwrap();
        fs::write(&tmp, "new").unwrap();

        atomic_replace(&tmp, &target).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert!(!tmp.exists());
    }

    #[test]
    fn test_extract_members_picks_bin_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("build.zip");
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();

        let bytes = build_archive(&[
            ("ffmpeg-master-latest-win64-gpl/bin/ffmpeg", b"ffmpeg-bytes"),
            ("ffmpeg-master-latest-win64-gpl/bin/ffprobe", b"ffprobe-bytes"),
            ("ffmpeg-master-latest-win64-gpl/doc/README.txt", b"docs"),
        ]);
        fs::write(&archive_path, bytes).unwrap();

        extract_members(&archive_path, &staging, &["ffmpeg", "ffprobe"]).unwrap();
        assert_eq!(fs::read(staging.join("ffmpeg")).unwrap(), b"ffmpeg-bytes");
        assert_eq!(fs::read(staging.join("ffprobe")).unwrap(), b"ffprobe-bytes");
        assert!(!staging.join("README.txt").exists());
    }

    #[tokio::test]
    async fn test_single_binary_install_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/yt-dlp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"binary v2".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (sink, mut rx) = EventSink::channel();
        let installer = Installer::new(sink, dir.path().to_path_buf());

        installer
            .install(ToolKind::YtDlp, &format!("{}/yt-dlp", server.uri()))
            .await
            .unwrap();

        let target = ToolKind::YtDlp.install_path(dir.path());
        assert_eq!(fs::read(&target).unwrap(), b"binary v2");
        assert!(!has_leftovers(dir.path()));

        let mut saw_update_log = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, Event::UpdateLog(_)) {
                saw_update_log = true;
            }
        }
        assert!(saw_update_log);
    }

    /// Serves one request whose headers advertise more bytes than the body
    /// delivers, then closes the connection.
    async fn truncated_server(advertised: usize, body: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    advertised
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_truncated_transfer_fails_and_discards_partial_file() {
        let uri = truncated_server(64, b"nine byte").await;

        let dir = tempfile::tempdir().unwrap();
        let target = ToolKind::YtDlp.install_path(dir.path());
        fs::write(&target, "previous install").unwrap();

        let (sink, _rx) = EventSink::channel();
        let installer = Installer::new(sink, dir.path().to_path_buf());

        let err = installer
            .install(ToolKind::YtDlp, &format!("{}/yt-dlp", uri))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed(_)));

        assert_eq!(fs::read_to_string(&target).unwrap(), "previous install");
        assert!(!has_leftovers(dir.path()));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_previous_install_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/yt-dlp"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = ToolKind::YtDlp.install_path(dir.path());
        fs::write(&target, "previous install").unwrap();

        let (sink, _rx) = EventSink::channel();
        let installer = Installer::new(sink, dir.path().to_path_buf());

        let err = installer
            .install(ToolKind::YtDlp, &format!("{}/yt-dlp", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed(_)));

        assert_eq!(fs::read_to_string(&target).unwrap(), "previous install");
        assert!(!has_leftovers(dir.path()));

        // re-running afterwards succeeds and only then replaces it
        Mock::given(method("GET"))
            .and(url_path("/retry"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .mount(&server)
            .await;
        installer
            .install(ToolKind::YtDlp, &format!("{}/retry", server.uri()))
            .await
            .unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_archive_install_places_all_members() {
        let members = tools::ffmpeg_archive_members();
        let entries: Vec<(String, &[u8])> = members
            .iter()
            .map(|m| {
                (
                    format!("ffmpeg-master-latest-win64-gpl/bin/{}", m),
                    b"exe-bytes" as &[u8],
                )
            })
            .collect();
        let named: Vec<(&str, &[u8])> = entries.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        let bytes = build_archive(&named);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/ffmpeg.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (sink, _rx) = EventSink::channel();
        let installer = Installer::new(sink, dir.path().to_path_buf());

        installer
            .install(ToolKind::Ffmpeg, &format!("{}/ffmpeg.zip", server.uri()))
            .await
            .unwrap();

        for member in members {
            assert_eq!(fs::read(dir.path().join(member)).unwrap(), b"exe-bytes");
        }
        assert!(!has_leftovers(dir.path()));
    }

    #[tokio::test]
    async fn test_archive_missing_member_installs_nothing() {
        // only ffmpeg present, no ffprobe
        let members = tools::ffmpeg_archive_members();
        let only_ffmpeg = format!("build/bin/{}", members[0]);
        let bytes = build_archive(&[(only_ffmpeg.as_str(), b"exe-bytes")]);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (sink, _rx) = EventSink::channel();
        let installer = Installer::new(sink, dir.path().to_path_buf());

        let err = installer
            .install(ToolKind::Ffmpeg, &format!("{}/ffmpeg.zip", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstallFailed(_)));

        for member in members {
            assert!(!dir.path().join(member).exists());
        }
        assert!(!has_leftovers(dir.path()));
    }

    #[tokio::test]
    async fn test_second_install_rejected_while_one_is_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow binary".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (sink, _rx) = EventSink::channel();
        let installer = Arc::new(Installer::new(sink, dir.path().to_path_buf()));

        let first = installer.clone();
        let url = format!("{}/yt-dlp", server.uri());
        let first_url = url.clone();
        let task = tokio::spawn(async move { first.install(ToolKind::YtDlp, &first_url).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let err = installer.install(ToolKind::YtDlp, &url).await.unwrap_err();
        assert_eq!(err, Error::AlreadyRunning);

        task.await.unwrap().unwrap();
    }
}
