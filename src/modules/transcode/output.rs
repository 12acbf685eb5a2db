use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use super::registry::{CancelReason, JobHandle};

/// Transcoder stdout as a response body.
///
/// Chunks come through a bounded channel, so a slow reader stalls the
/// supervisor's reads from the pipe and, in turn, ffmpeg itself. Dropping the
/// stream before it ended (the HTTP connection went away) cancels the job.
pub struct TranscodeStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    handle: Arc<JobHandle>,
    ended: bool,
}

impl TranscodeStream {
    pub(crate) fn new(rx: mpsc::Receiver<io::Result<Bytes>>, handle: Arc<JobHandle>) -> Self {
        Self {
            rx,
            handle,
            ended: false,
        }
    }

    pub fn job_id(&self) -> &str {
        self.handle.job_id()
    }

    pub fn handle(&self) -> &Arc<JobHandle> {
        &self.handle
    }
}

impl Stream for TranscodeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(None) = polled {
            this.ended = true;
        }
        polled
    }
}

impl Drop for TranscodeStream {
    fn drop(&mut self) {
        if !self.ended && self.handle.request_cancel(CancelReason::ClientDisconnect) {
            tracing::info!(job_id = %self.job_id(), "client went away, cancelling transcode");
        }
    }
}

impl std::fmt::Debug for TranscodeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeStream")
            .field("job_id", &self.handle.job_id())
            .field("ended", &self.ended)
            .finish()
    }
}
