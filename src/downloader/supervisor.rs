// Lifecycle of the single running extraction job: spawn, stream, cancel.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::args::build_args;
use super::models::JobRequest;
use super::progress::{parse_progress, ProgressGate};
use crate::error::Error;
use crate::events::{EventSink, Outcome};
use crate::tools::{self, ToolKind};

/// The one live job. Held in the slot so `cancel` can reach the child from
/// another task; destroyed when the process is reaped.
struct JobHandle {
    child: Child,
    pid: Option<u32>,
    cancel_requested: bool,
    started_at: Instant,
}

/// Process-tree termination, injectable so tests can observe kill requests.
type TerminateFn = Arc<dyn Fn(u32) + Send + Sync>;

/// Owns the arena-of-one job slot. Cloning shares the slot, so a clone handed
/// to the boundary layer cancels the same job it sees events for.
#[derive(Clone)]
pub struct Supervisor {
    sink: EventSink,
    bin_dir: PathBuf,
    slot: Arc<Mutex<Option<JobHandle>>>,
    terminate: TerminateFn,
}

impl Supervisor {
    pub fn new(sink: EventSink, bin_dir: PathBuf) -> Self {
        Self {
            sink,
            bin_dir,
            slot: Arc::new(Mutex::new(None)),
            terminate: Arc::new(tools::kill_process_tree),
        }
    }

    #[cfg(test)]
    fn with_terminate(sink: EventSink, bin_dir: PathBuf, terminate: TerminateFn) -> Self {
        Self {
            sink,
            bin_dir,
            slot: Arc::new(Mutex::new(None)),
            terminate,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Spawn yt-dlp for the request and drive the job to its terminal status,
    /// forwarding output to the sink line by line as it appears. The returned
    /// outcome mirrors the final `DownloadComplete` event; a nonzero exit
    /// surfaces as an error instead.
    pub async fn run(&self, request: JobRequest) -> Result<Outcome, Error> {
        let args = build_args(&request, &self.bin_dir)?;

        let ytdlp = ToolKind::YtDlp.install_path(&self.bin_dir);
        if !ytdlp.is_file() {
            return Err(Error::DependencyMissing("yt-dlp".to_string()));
        }

        // Claim the slot before spawning; a second job must not disturb the
        // live one.
        let mut guard = self.slot.lock().await;
        if guard.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let mut cmd = Command::new(&ytdlp);
        cmd.args(&args).stdout(Stdio::piped()).stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0); // own group, so cancel can signal the whole tree
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::ProcessSpawnFailed(format!("yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ProcessSpawnFailed("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ProcessSpawnFailed("failed to capture stderr".to_string()))?;

        let pid = child.id();
        info!("spawned yt-dlp (pid {:?}) for {}", pid, request.url);

        *guard = Some(JobHandle {
            child,
            pid,
            cancel_requested: false,
            started_at: Instant::now(),
        });
        drop(guard);

        // Progress is derived from stdout; both streams feed the log so no
        // line is ever lost.
        let sink = self.sink.clone();
        let stdout_task = tokio::spawn(async move {
            let mut gate = ProgressGate::new();
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(pct) = parse_progress(&line).and_then(|p| gate.accept(p)) {
                    sink.download_progress(pct);
                }
                sink.download_log(line);
            }
            gate.last()
        });

        let sink = self.sink.clone();
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                sink.download_log(line);
            }
        });

        let (last_pct, _) = tokio::join!(stdout_task, stderr_task);
        let last_pct = last_pct.unwrap_or(0.0);

        // Streams are closed; reap the process and release the slot.
        let handle = self.slot.lock().await.take();
        let mut handle = match handle {
            Some(h) => h,
            None => {
                // Slot was emptied under us; treat as a cancelled teardown.
                warn!("job slot empty at reap time");
                self.sink.download_complete(Outcome::Cancelled);
                return Ok(Outcome::Cancelled);
            }
        };

        let status = match handle.child.wait().await {
            Ok(status) => status,
            Err(e) => {
                // A cancelled job stays cancelled even when the reap fails.
                if handle.cancel_requested {
                    warn!("reap failed after cancel: {}", e);
                    self.sink.download_complete(Outcome::Cancelled);
                    return Ok(Outcome::Cancelled);
                }
                self.sink.download_complete(Outcome::Failed(-1));
                return Err(Error::ProcessSpawnFailed(format!(
                    "failed to reap yt-dlp: {}",
                    e
                )));
            }
        };

        debug!(
            "yt-dlp exited with {:?} after {:.1}s",
            status.code(),
            handle.started_at.elapsed().as_secs_f64()
        );

        // A killed job is cancelled, never a failure, whatever code the
        // process died with.
        if handle.cancel_requested {
            self.sink.download_complete(Outcome::Cancelled);
            return Ok(Outcome::Cancelled);
        }

        if status.success() {
            if last_pct < 100.0 {
                self.sink.download_progress(100.0);
            }
            self.sink.download_complete(Outcome::Success);
            Ok(Outcome::Success)
        } else {
            let code = status.code().unwrap_or(-1);
            warn!("yt-dlp failed with code {}", code);
            self.sink.download_complete(Outcome::Failed(code));
            Err(Error::ProcessExitedNonZero(code))
        }
    }

    /// Force-stop the running job and its whole process tree. The tools do
    /// not reliably honor graceful shutdown, so this is an unconditional
    /// kill, not a signal they may ignore.
    pub async fn cancel(&self) -> Result<(), Error> {
        let mut guard = self.slot.lock().await;
        let handle = guard.as_mut().ok_or(Error::NotRunning)?;

        if handle.cancel_requested {
            // Already tearing down; a second kill could hit a reused pid.
            return Err(Error::NotRunning);
        }
        handle.cancel_requested = true;

        info!("cancelling job (pid {:?})", handle.pid);
        if let Some(pid) = handle.pid {
            (self.terminate)(pid);
        }
        Ok(())
    }
}
