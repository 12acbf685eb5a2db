use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::modules::transcode::{CancelReason, TranscodeSupervisor};
use crate::state::AppState;

/// What one watchdog pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub pruned: usize,
}

/// Periodically cancels jobs that outlived the configured maximum and forgets
/// old finished jobs. Returns when `shutdown` fires.
pub async fn start_watchdog(state: AppState, shutdown: CancellationToken) {
    let interval = Duration::from_secs(state.config.watchdog_interval_secs);
    let max_age = state.config.transcode.max_job_duration();
    let retention = state.config.transcode.history_retention();

    info!("🐕 Starting job watchdog (every {:?})", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = sweep(&state.supervisor, max_age, retention);
                if report != SweepReport::default() {
                    debug!(?report, "watchdog sweep");
                }
            }
        }
    }

    info!("🐕 Job watchdog stopped");
}

pub fn sweep(
    supervisor: &TranscodeSupervisor,
    max_age: Option<Duration>,
    retention: Duration,
) -> SweepReport {
    let mut report = SweepReport::default();

    if let Some(max_age) = max_age {
        for handle in supervisor.registry().live_handles() {
            if handle.elapsed() >= max_age && handle.request_cancel(CancelReason::Timeout) {
                warn!(
                    job_id = %handle.job_id(),
                    elapsed = ?handle.elapsed(),
                    "transcode job exceeded its maximum duration"
                );
                report.timed_out += 1;
            }
        }
    }

    report.pruned = supervisor.registry().prune_history(retention);
    report
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::modules::transcode::test_support::*;
    use crate::modules::transcode::{JobRegistry, JobStatus, TranscodeProfile, TranscodeSource};
    use futures_util::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn cancels_jobs_past_their_deadline() {
        let dir = tempdir().unwrap();
        let ffmpeg = install_fake_ffmpeg(dir.path(), ENDLESS);
        let supervisor = TranscodeSupervisor::new(JobRegistry::new(), transcode_config(ffmpeg));
        let asset = asset_at(dir.path(), 64);

        let stream = supervisor
            .start(
                "long-job".into(),
                &asset,
                &TranscodeProfile::default(),
                TranscodeSource::Path(asset.file_path.clone()),
            )
            .await
            .unwrap();
        let handle = stream.handle().clone();

        let report = sweep(&supervisor, Some(Duration::from_secs(3600)), Duration::from_secs(60));
        assert_eq!(report.timed_out, 0);

        let report = sweep(&supervisor, Some(Duration::ZERO), Duration::from_secs(60));
        assert_eq!(report.timed_out, 1);

        let status = tokio::time::timeout(Duration::from_secs(10), handle.wait_finished())
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Cancelled);
        assert_eq!(handle.cancel_reason(), Some(CancelReason::Timeout));
        assert!(supervisor.registry().is_empty());
        drop(stream);
    }

    #[tokio::test]
    async fn no_deadline_leaves_jobs_alone() {
        let dir = tempdir().unwrap();
        let ffmpeg = install_fake_ffmpeg(dir.path(), ENDLESS);
        let supervisor = TranscodeSupervisor::new(JobRegistry::new(), transcode_config(ffmpeg));
        let asset = asset_at(dir.path(), 64);

        let mut stream = supervisor
            .start(
                "open-ended".into(),
                &asset,
                &TranscodeProfile::default(),
                TranscodeSource::Path(asset.file_path.clone()),
            )
            .await
            .unwrap();

        let report = sweep(&supervisor, None, Duration::from_secs(60));
        assert_eq!(report, SweepReport::default());
        assert!(stream.next().await.is_some());
        assert_eq!(supervisor.registry().len(), 1);
    }

    #[tokio::test]
    async fn prunes_finished_jobs() {
        let dir = tempdir().unwrap();
        let ffmpeg = install_fake_ffmpeg(dir.path(), FINITE);
        let supervisor = TranscodeSupervisor::new(JobRegistry::new(), transcode_config(ffmpeg));
        let asset = asset_at(dir.path(), 64);

        let mut stream = supervisor
            .start(
                "short".into(),
                &asset,
                &TranscodeProfile::default(),
                TranscodeSource::Path(asset.file_path.clone()),
            )
            .await
            .unwrap();
        while stream.next().await.is_some() {}
        stream.handle().wait_finished().await;

        assert!(supervisor.registry().recently_finished("short").is_some());
        let report = sweep(&supervisor, None, Duration::ZERO);
        assert_eq!(report.pruned, 1);
        assert!(supervisor.registry().recently_finished("short").is_none());
    }
}
