// Single-job polling loop.
//
// A loop is a spawned task paired with a cancellation token. Cancelling the
// handle (or dropping it) stops the loop at its next await point and aborts
// the task, so a sleep that is already pending never turns into a fetch and
// an update still in flight is dropped at its next await.
//
// On a multi-thread runtime an update already past its last await can still
// land after `cancel` returns; `shutdown` waits for the task to be gone.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::{AppContext, Visibility};
use crate::gateway::Gateway;
use crate::jobs::backoff::{BackoffSchedule, PollPacer};
use crate::jobs::model::{JobPatch, JobSnapshot};
use crate::jobs::store::JobStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receives every successfully fetched snapshot, in fetch order.
pub type UpdateFn = Arc<dyn Fn(JobSnapshot) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub initial_delay: Duration,
    pub schedule: BackoffSchedule,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(350),
            schedule: BackoffSchedule::default(),
        }
    }
}

/// Update callback that merges each snapshot into `store`.
pub fn store_sink(store: JobStore) -> UpdateFn {
    Arc::new(move |snapshot: JobSnapshot| {
        let store = store.clone();
        Box::pin(async move {
            let job_id = snapshot.job_id.clone();
            if let Err(e) = store.upsert(JobPatch::from_snapshot(snapshot)).await {
                tracing::warn!(job_id = %job_id, error = %e, "failed to persist polled status");
            }
        })
    })
}

/// Owner of a running loop. Cancels on drop.
pub struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }

    /// Cancel and wait until the task has stopped. No update is delivered
    /// after this returns.
    pub async fn shutdown(mut self) {
        self.cancel();
        let _ = (&mut self.task).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end on its own (terminal status) or by cancel.
    pub async fn join(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct JobPoller {
    gateway: Arc<dyn Gateway>,
    visibility: Visibility,
    options: PollOptions,
}

impl JobPoller {
    pub fn new(gateway: Arc<dyn Gateway>, visibility: Visibility, options: PollOptions) -> Self {
        Self {
            gateway,
            visibility,
            options,
        }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        Self::new(
            ctx.gateway.clone(),
            ctx.visibility.clone(),
            PollOptions::default(),
        )
    }

    /// Start polling `job_id` until it reaches a terminal status or the
    /// returned handle is cancelled.
    pub fn spawn(&self, job_id: impl Into<String>, on_update: UpdateFn) -> PollHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            self.gateway.clone(),
            self.visibility.clone(),
            self.options.clone(),
            job_id.into(),
            on_update,
            token.clone(),
        ));
        PollHandle { token, task }
    }
}

async fn poll_loop(
    gateway: Arc<dyn Gateway>,
    visibility: Visibility,
    options: PollOptions,
    job_id: String,
    on_update: UpdateFn,
    token: CancellationToken,
) {
    let mut pacer = PollPacer::new(options.schedule);

    tokio::select! {
        biased;
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(options.initial_delay) => {}
    }

    loop {
        if token.is_cancelled() {
            return;
        }

        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            res = gateway.get_job(&job_id) => res,
        };

        match fetched {
            Ok(snapshot) => {
                if token.is_cancelled() {
                    return;
                }
                let status = snapshot.status;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = on_update(snapshot) => {}
                }
                if status.is_terminal() {
                    tracing::info!(job_id = %job_id, status = %status, "polling finished");
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(job_id = %job_id, error = %e, attempt = pacer.index(), "poll attempt failed");
            }
        }

        let wait = pacer.next_wait(visibility.is_hidden());
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Keeps at most one loop alive for the job a consumer is watching.
///
/// Each `watch` call tears the previous loop down before deciding whether
/// to start a new one, so repeated enable/disable cycles never leak tasks.
pub struct PollerSlot {
    poller: JobPoller,
    on_update: UpdateFn,
    current: Option<(String, PollHandle)>,
}

impl PollerSlot {
    pub fn new(poller: JobPoller, on_update: UpdateFn) -> Self {
        Self {
            poller,
            on_update,
            current: None,
        }
    }

    pub fn watch(&mut self, job_id: Option<&str>, enabled: bool) {
        if let Some((_, handle)) = self.current.take() {
            handle.cancel();
        }
        if let (Some(id), true) = (job_id, enabled) {
            let handle = self.poller.spawn(id, self.on_update.clone());
            self.current = Some((id.to_string(), handle));
        }
    }

    pub fn watching(&self) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|(_, h)| !h.is_finished())
            .map(|(id, _)| id.as_str())
    }
}
