//! Live transcode jobs keyed by job id.
//!
//! The registry owns the map entries; each entry is a [`JobHandle`] that can
//! signal the supervising task. The child process itself never leaves the
//! supervisor that spawned it.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use utoipa::ToSchema;
use uuid::Uuid;

use super::profile::OutputFormat;
use crate::common::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Why a job is being torn down. Every trigger goes through the same kill path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    ClientDisconnect,
    UserRequested,
    Timeout,
    Shutdown,
}

/// Point-in-time view of a job, as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TranscodeJob {
    pub job_id: String,
    pub asset_id: Uuid,
    pub pid: Option<u32>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub started_at: OffsetDateTime,
    pub output_format: OutputFormat,
    pub status: JobStatus,
    pub cancel_reason: Option<CancelReason>,
}

/// Shared control block for one job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    asset_id: Uuid,
    output_format: OutputFormat,
    started_at: OffsetDateTime,
    started: Instant,
    pid: OnceLock<u32>,
    reason: OnceLock<CancelReason>,
    cancel: CancellationToken,
    status: watch::Sender<JobStatus>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, asset_id: Uuid, output_format: OutputFormat) -> Arc<Self> {
        let (status, _) = watch::channel(JobStatus::Running);
        Arc::new(Self {
            job_id: job_id.into(),
            asset_id,
            output_format,
            started_at: OffsetDateTime::now_utc(),
            started: Instant::now(),
            pid: OnceLock::new(),
            reason: OnceLock::new(),
            cancel: CancellationToken::new(),
            status,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn asset_id(&self) -> Uuid {
        self.asset_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    pub(crate) fn set_pid(&self, pid: u32) {
        let _ = self.pid.set(pid);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        self.status.send_replace(status);
    }

    /// Ask the supervisor to kill the process. The first reason wins; asking
    /// again, or after the job ended, does nothing. Returns whether this call
    /// was the one that triggered cancellation.
    pub fn request_cancel(&self, reason: CancelReason) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        let first = self.reason.set(reason).is_ok();
        self.cancel.cancel();
        first
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Resolves once the supervisor has retired the job.
    pub async fn wait_finished(&self) -> JobStatus {
        let mut rx = self.status.subscribe();
        let status = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.status(),
        };
        status
    }

    pub fn snapshot(&self) -> TranscodeJob {
        TranscodeJob {
            job_id: self.job_id.clone(),
            asset_id: self.asset_id,
            pid: self.pid(),
            started_at: self.started_at,
            output_format: self.output_format,
            status: self.status(),
            cancel_reason: self.cancel_reason(),
        }
    }
}

#[derive(Debug, Clone)]
struct FinishedJob {
    job: TranscodeJob,
    finished: Instant,
}

/// Concurrent job table. Cloning shares the same maps.
///
/// Duplicate ids are rejected while a job is live; a new id is required per
/// playback session.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    live: Arc<DashMap<String, Arc<JobHandle>>>,
    finished: Arc<DashMap<String, FinishedJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert.
    pub fn register(&self, handle: Arc<JobHandle>) -> Result<(), AppError> {
        match self.live.entry(handle.job_id().to_string()) {
            Entry::Occupied(_) => Err(AppError::Conflict(handle.job_id().to_string())),
            Entry::Vacant(slot) => {
                self.finished.remove(handle.job_id());
                slot.insert(handle);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, job_id: &str) -> Result<Arc<JobHandle>, AppError> {
        self.live
            .get(job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AppError::not_found(format!("job '{}'", job_id)))
    }

    /// Drop the live entry for `job_id`, if any.
    pub fn remove(&self, job_id: &str) -> Option<Arc<JobHandle>> {
        self.live.remove(job_id).map(|(_, handle)| handle)
    }

    /// Move a job from the live table into history and publish its final
    /// status. Only removes the live entry if it still belongs to `handle`.
    pub(crate) fn retire(&self, handle: &Arc<JobHandle>, status: JobStatus) {
        let mut job = handle.snapshot();
        job.status = status;
        self.finished.insert(
            handle.job_id().to_string(),
            FinishedJob {
                job,
                finished: Instant::now(),
            },
        );
        self.live
            .remove_if(handle.job_id(), |_, current| Arc::ptr_eq(current, handle));
        handle.set_status(status);
    }

    pub fn recently_finished(&self, job_id: &str) -> Option<TranscodeJob> {
        self.finished.get(job_id).map(|entry| entry.job.clone())
    }

    pub fn live_handles(&self) -> Vec<Arc<JobHandle>> {
        self.live.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn snapshot(&self) -> Vec<TranscodeJob> {
        let mut jobs: Vec<TranscodeJob> = self.live.iter().map(|e| e.value().snapshot()).collect();
        jobs.sort_by_key(|j| j.started_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Forget finished jobs older than `retention`. Returns how many were dropped.
    pub fn prune_history(&self, retention: Duration) -> usize {
        let before = self.finished.len();
        self.finished
            .retain(|_, entry| entry.finished.elapsed() < retention);
        before.saturating_sub(self.finished.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str) -> Arc<JobHandle> {
        JobHandle::new(id, Uuid::new_v4(), OutputFormat::FragmentedMp4)
    }

    #[test]
    fn register_then_lookup() {
        let registry = JobRegistry::new();
        let h = handle("session-1");
        registry.register(h.clone()).unwrap();

        let found = registry.lookup("session-1").unwrap();
        assert!(Arc::ptr_eq(&found, &h));
        assert!(matches!(registry.lookup("other"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn duplicate_id_is_a_conflict() {
        let registry = JobRegistry::new();
        let first = handle("dup");
        registry.register(first.clone()).unwrap();

        let err = registry.register(handle("dup")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref id) if id == "dup"));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.lookup("dup").unwrap(), &first));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = JobRegistry::new();
        registry.register(handle("x")).unwrap();
        assert!(registry.remove("x").is_some());
        assert!(registry.remove("x").is_none());
        assert!(registry.remove("never-there").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn retire_moves_job_into_history() {
        let registry = JobRegistry::new();
        let h = handle("done");
        registry.register(h.clone()).unwrap();

        registry.retire(&h, JobStatus::Completed);
        assert!(registry.lookup("done").is_err());
        assert_eq!(h.status(), JobStatus::Completed);
        assert_eq!(
            registry.recently_finished("done").map(|j| j.status),
            Some(JobStatus::Completed)
        );

        // the id is free again
        registry.register(handle("done")).unwrap();
        assert!(registry.recently_finished("done").is_none());
    }

    #[test]
    fn stale_retire_leaves_newer_job_alone() {
        let registry = JobRegistry::new();
        let old = handle("reused");
        registry.register(old.clone()).unwrap();
        registry.remove("reused");

        let new = handle("reused");
        registry.register(new.clone()).unwrap();
        registry.retire(&old, JobStatus::Failed);

        assert!(Arc::ptr_eq(&registry.lookup("reused").unwrap(), &new));
    }

    #[test]
    fn cancel_request_is_first_wins() {
        let h = handle("c");
        assert!(h.request_cancel(CancelReason::ClientDisconnect));
        assert!(!h.request_cancel(CancelReason::UserRequested));
        assert_eq!(h.cancel_reason(), Some(CancelReason::ClientDisconnect));
    }

    #[test]
    fn cancel_after_finish_is_ignored() {
        let registry = JobRegistry::new();
        let h = handle("late");
        registry.register(h.clone()).unwrap();
        registry.retire(&h, JobStatus::Completed);

        assert!(!h.request_cancel(CancelReason::UserRequested));
        assert_eq!(h.cancel_reason(), None);
    }

    #[test]
    fn prune_drops_old_history() {
        let registry = JobRegistry::new();
        let h = handle("old");
        registry.register(h.clone()).unwrap();
        registry.retire(&h, JobStatus::Cancelled);

        assert_eq!(registry.prune_history(Duration::from_secs(3600)), 0);
        assert_eq!(registry.prune_history(Duration::ZERO), 1);
        assert!(registry.recently_finished("old").is_none());
    }

    #[tokio::test]
    async fn wait_finished_sees_retirement() {
        let registry = JobRegistry::new();
        let h = handle("w");
        registry.register(h.clone()).unwrap();

        let waiter = {
            let h = h.clone();
            tokio::spawn(async move { h.wait_finished().await })
        };
        registry.retire(&h, JobStatus::Failed);
        assert_eq!(waiter.await.unwrap(), JobStatus::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_admits_one() {
        let registry = JobRegistry::new();
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move { registry.register(handle("race")).is_ok() }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }
}
