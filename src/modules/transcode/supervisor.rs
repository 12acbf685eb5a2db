//! Spawns ffmpeg per playback job, pipes its stdout to the caller and tears
//! it down on completion, failure or cancellation.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::output::TranscodeStream;
use super::profile::{InputArg, TranscodeProfile};
use super::registry::{CancelReason, JobHandle, JobRegistry, JobStatus};
use crate::common::error::AppError;
use crate::config::settings::TranscodeConfig;
use crate::modules::catalog::MediaAsset;

/// Chunks buffered between the pipe reader and the HTTP body.
const OUTPUT_QUEUE_DEPTH: usize = 8;
const STDERR_TAIL_LINES: usize = 20;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Input handed to the transcoder.
pub enum TranscodeSource {
    /// ffmpeg opens the file itself.
    Path(PathBuf),
    /// Bytes (e.g. one requested range) are written to ffmpeg's stdin.
    Reader(BoxedReader),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    AlreadyFinished,
}

#[derive(Debug, Clone)]
pub struct TranscodeSupervisor {
    registry: JobRegistry,
    config: Arc<TranscodeConfig>,
}

impl TranscodeSupervisor {
    pub fn new(registry: JobRegistry, config: TranscodeConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Start a transcode of `asset` under `job_id` and return its output.
    ///
    /// The job is registered before the process exists, so there is no
    /// moment where a running ffmpeg is invisible to cancellation. A live job
    /// with the same id is a `Conflict` and nothing is spawned.
    pub async fn start(
        &self,
        job_id: String,
        asset: &MediaAsset,
        profile: &TranscodeProfile,
        source: TranscodeSource,
    ) -> Result<TranscodeStream, AppError> {
        let (input_path, feed) = resolve_input(source).await?;
        let input = input_path.as_deref().map_or(InputArg::Stdin, InputArg::File);
        let args = profile.ffmpeg_args(input, asset.is_audio());

        let handle = JobHandle::new(job_id, asset.id, profile.format);
        self.registry.register(Arc::clone(&handle))?;
        // From here until supervision owns the child, an abandoned request
        // (future dropped mid-backoff) must not leave the entry behind.
        let pending = PendingStart::new(&self.registry, &handle);

        let mut child = match self.spawn(handle.job_id(), &args, feed.is_some()).await {
            Ok(child) => child,
            Err(e) => {
                error!(job_id = %handle.job_id(), error = %e, "failed to spawn transcoder");
                pending.fail();
                return Err(AppError::ProcessSpawnFailure(e.to_string()));
            }
        };

        if let Some(pid) = child.id() {
            handle.set_pid(pid);
        }
        info!(
            job_id = %handle.job_id(),
            asset_id = %handle.asset_id(),
            pid = ?handle.pid(),
            format = ?profile.format,
            "transcode started"
        );

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let mut supervision = self.supervision(child, &handle);
            supervision.kill().await;
            pending.fail();
            return Err(AppError::ProcessSpawnFailure(
                "transcoder output pipes unavailable".to_string(),
            ));
        };

        if let (Some(reader), Some(stdin)) = (feed, child.stdin.take()) {
            tokio::spawn(feed_stdin(reader, stdin, Arc::clone(&handle)));
        }
        let stderr_tail = tokio::spawn(drain_stderr(stderr, handle.job_id().to_string()));

        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let supervision = self.supervision(child, &handle);
        tokio::spawn(supervision.run(stdout, stderr_tail, tx));
        pending.disarm();

        Ok(TranscodeStream::new(rx, handle))
    }

    /// Kill a job. Finished jobs still in history report `AlreadyFinished`;
    /// ids never seen (or long forgotten) are `NotFound`.
    pub async fn cancel(&self, job_id: &str, reason: CancelReason) -> Result<CancelOutcome, AppError> {
        let handle = match self.registry.lookup(job_id) {
            Ok(handle) => handle,
            Err(not_found) => {
                return match self.registry.recently_finished(job_id) {
                    Some(_) => Ok(CancelOutcome::AlreadyFinished),
                    None => Err(not_found),
                };
            }
        };

        handle.request_cancel(reason);
        match timeout(self.config.cancel_timeout(), handle.wait_finished()).await {
            Ok(JobStatus::Cancelled) => Ok(CancelOutcome::Cancelled),
            Ok(_) => Ok(CancelOutcome::AlreadyFinished),
            Err(_) => {
                warn!(job_id, reason = ?reason, "transcoder still exiting after cancel");
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    /// Cancel every live job, e.g. on server shutdown.
    pub async fn shutdown(&self) {
        let handles = self.registry.live_handles();
        if handles.is_empty() {
            return;
        }
        info!(jobs = handles.len(), "cancelling live transcodes");
        join_all(
            handles
                .iter()
                .map(|h| self.cancel(h.job_id(), CancelReason::Shutdown)),
        )
        .await;
    }

    fn command(&self, args: &[String], pipe_stdin: bool) -> Command {
        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.args(args)
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Spawn, retrying once after a backoff if the OS is out of resources.
    async fn spawn(&self, job_id: &str, args: &[String], pipe_stdin: bool) -> io::Result<Child> {
        match self.command(args, pipe_stdin).spawn() {
            Err(e) if is_transient_spawn_error(&e) => {
                warn!(
                    job_id,
                    error = %e,
                    backoff_ms = self.config.spawn_backoff_ms,
                    "transcoder spawn failed, retrying once"
                );
                tokio::time::sleep(self.config.spawn_backoff()).await;
                self.command(args, pipe_stdin).spawn()
            }
            result => result,
        }
    }

    fn supervision(&self, child: Child, handle: &Arc<JobHandle>) -> Supervision {
        Supervision {
            child,
            handle: Arc::clone(handle),
            registry: self.registry.clone(),
            reap_timeout: self.config.cancel_timeout(),
            chunk_size: self.config.output_chunk_size,
        }
    }
}

async fn resolve_input(source: TranscodeSource) -> Result<(Option<String>, Option<BoxedReader>), AppError> {
    match source {
        TranscodeSource::Reader(reader) => Ok((None, Some(reader))),
        TranscodeSource::Path(path) => match path.to_str() {
            Some(p) => Ok((Some(p.to_string()), None)),
            // ffmpeg takes its input as a string argument; feed odd paths through stdin
            None => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
                    ErrorKind::NotFound => AppError::not_found(format!("file '{}'", path.display())),
                    _ => AppError::Internal(anyhow::anyhow!("opening {}: {}", path.display(), e)),
                })?;
                let reader: BoxedReader = Box::new(file);
                Ok((None, Some(reader)))
            }
        },
    }
}

fn is_transient_spawn_error(err: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    const ETXTBSY: i32 = 26;

    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::OutOfMemory)
        || (cfg!(unix) && matches!(err.raw_os_error(), Some(ENFILE | EMFILE | ETXTBSY)))
}

/// Owns a freshly registered job until its supervision task is running.
///
/// Dropped while still armed means the caller went away before the job got
/// a supervisor; the entry is retired as a client disconnect.
struct PendingStart {
    registry: JobRegistry,
    handle: Arc<JobHandle>,
    armed: bool,
}

impl PendingStart {
    fn new(registry: &JobRegistry, handle: &Arc<JobHandle>) -> Self {
        Self {
            registry: registry.clone(),
            handle: Arc::clone(handle),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    fn fail(mut self) {
        self.armed = false;
        self.registry.retire(&self.handle, JobStatus::Failed);
    }
}

impl Drop for PendingStart {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.handle.request_cancel(CancelReason::ClientDisconnect);
        warn!(
            job_id = %self.handle.job_id(),
            reason = %AppError::ClientDisconnected,
            "transcode start abandoned before the process was supervised"
        );
        self.registry.retire(&self.handle, JobStatus::Cancelled);
    }
}

enum Ending {
    Eof,
    Cancelled,
    ReadError(io::Error),
}

enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Owns the child for the lifetime of one job.
struct Supervision {
    child: Child,
    handle: Arc<JobHandle>,
    registry: JobRegistry,
    reap_timeout: Duration,
    chunk_size: usize,
}

impl Supervision {
    async fn run(
        mut self,
        stdout: ChildStdout,
        stderr_tail: JoinHandle<Vec<String>>,
        tx: mpsc::Sender<io::Result<Bytes>>,
    ) {
        let ending = self.pump(stdout, &tx).await;

        let outcome = match ending {
            Ending::Cancelled => {
                self.kill().await;
                Outcome::Cancelled
            }
            Ending::ReadError(e) => {
                self.kill().await;
                Outcome::Failed(format!("reading transcoder output: {}", e))
            }
            Ending::Eof => {
                let exit = tokio::select! {
                    biased;
                    _ = self.handle.cancelled() => None,
                    exit = self.child.wait() => Some(exit),
                };
                match exit {
                    None => {
                        self.kill().await;
                        Outcome::Cancelled
                    }
                    Some(Ok(status)) if status.success() => Outcome::Completed,
                    Some(Ok(status)) => Outcome::Failed(format!("transcoder exited with {}", status)),
                    Some(Err(e)) => Outcome::Failed(format!("waiting for transcoder: {}", e)),
                }
            }
        };

        let status = match outcome {
            Outcome::Completed => JobStatus::Completed,
            Outcome::Cancelled => JobStatus::Cancelled,
            Outcome::Failed(message) => {
                let tail = timeout(self.reap_timeout, stderr_tail)
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .unwrap_or_default();
                let detail = if tail.is_empty() {
                    message
                } else {
                    format!("{} ({})", message, tail.join(" | "))
                };
                error!(job_id = %self.handle.job_id(), error = %detail, "transcode failed");

                // Surfaces as a body error so the response is cut off instead of hanging.
                let err = io::Error::other(AppError::ProcessRuntimeFailure(detail));
                let _ = timeout(self.reap_timeout, tx.send(Err(err))).await;
                JobStatus::Failed
            }
        };
        drop(tx);

        self.registry.retire(&self.handle, status);
        info!(
            job_id = %self.handle.job_id(),
            status = ?status,
            reason = ?self.handle.cancel_reason(),
            elapsed_ms = self.handle.elapsed().as_millis() as u64,
            "transcode finished"
        );
    }

    /// Forward stdout until EOF, an error, or cancellation.
    async fn pump(&self, stdout: ChildStdout, tx: &mpsc::Sender<io::Result<Bytes>>) -> Ending {
        let mut output = ReaderStream::with_capacity(stdout, self.chunk_size);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.handle.cancelled() => return Ending::Cancelled,
                chunk = output.next() => chunk,
            };
            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Ending::ReadError(e),
                None => return Ending::Eof,
            };
            tokio::select! {
                biased;
                _ = self.handle.cancelled() => return Ending::Cancelled,
                sent = tx.send(Ok(bytes)) => {
                    if sent.is_err() {
                        self.handle.request_cancel(CancelReason::ClientDisconnect);
                        return Ending::Cancelled;
                    }
                }
            }
        }
    }

    /// SIGKILL and reap. Stdout is already dropped by now, so the child
    /// cannot block on a full pipe while we wait.
    async fn kill(&mut self) {
        match self.child.start_kill() {
            Ok(()) => {}
            // already reaped
            Err(e) if e.kind() == ErrorKind::InvalidInput => {}
            Err(e) => warn!(job_id = %self.handle.job_id(), error = %e, "failed to signal transcoder"),
        }
        match timeout(self.reap_timeout, self.child.wait()).await {
            Ok(Ok(status)) => debug!(job_id = %self.handle.job_id(), %status, "transcoder reaped"),
            Ok(Err(e)) => warn!(job_id = %self.handle.job_id(), error = %e, "failed to reap transcoder"),
            Err(_) => warn!(job_id = %self.handle.job_id(), "transcoder did not exit after kill"),
        }
    }
}

async fn feed_stdin(mut reader: BoxedReader, mut stdin: ChildStdin, handle: Arc<JobHandle>) {
    let copied = tokio::select! {
        _ = handle.cancelled() => return,
        copied = tokio::io::copy(&mut reader, &mut stdin) => copied,
    };
    match copied {
        Ok(bytes) => debug!(job_id = %handle.job_id(), bytes, "transcoder input fed"),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!(job_id = %handle.job_id(), "transcoder closed its input early")
        }
        Err(e) => warn!(job_id = %handle.job_id(), error = %e, "feeding transcoder input failed"),
    }
    let _ = stdin.shutdown().await;
}

/// Keep reading stderr so ffmpeg never blocks on it; remember the last lines.
async fn drain_stderr(stderr: ChildStderr, job_id: String) -> Vec<String> {
    let mut reader = BufReader::new(stderr);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                if text.is_empty() {
                    continue;
                }
                debug!(job_id = %job_id, "ffmpeg: {}", text);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(text);
            }
        }
    }
    tail.into()
}
