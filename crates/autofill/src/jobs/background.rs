use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::{AppContext, Visibility};
use crate::gateway::Gateway;
use crate::jobs::model::JobPatch;
use crate::jobs::store::JobStore;

#[derive(Debug, Clone)]
pub struct RefreshCadence {
    pub initial_delay: Duration,
    pub foreground: Duration,
    pub background: Duration,
}

impl Default for RefreshCadence {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1200),
            foreground: Duration::from_secs(5),
            background: Duration::from_secs(10),
        }
    }
}

impl RefreshCadence {
    pub fn wait(&self, hidden: bool) -> Duration {
        if hidden {
            self.background
        } else {
            self.foreground
        }
    }
}

/// Round-robin refresher over every queued/running job in the store.
///
/// One job is fetched per round. The active set is re-read from the store
/// each round, so jobs that turn terminal drop out and newly registered
/// ones are picked up without restarting.
pub struct BackgroundRefresher {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl BackgroundRefresher {
    pub fn spawn(
        gateway: Arc<dyn Gateway>,
        store: JobStore,
        visibility: Visibility,
        cadence: RefreshCadence,
    ) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(
            gateway,
            store,
            visibility,
            cadence,
            token.clone(),
        ));
        Self { token, task }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        Self::spawn(
            ctx.gateway.clone(),
            ctx.store.clone(),
            ctx.visibility.clone(),
            RefreshCadence::default(),
        )
    }

    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }
}

impl Drop for BackgroundRefresher {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn refresh_loop(
    gateway: Arc<dyn Gateway>,
    store: JobStore,
    visibility: Visibility,
    cadence: RefreshCadence,
    token: CancellationToken,
) {
    let mut cursor: usize = 0;

    tokio::select! {
        biased;
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(cadence.initial_delay) => {}
    }

    loop {
        let active = store.active_ids().await;
        if !active.is_empty() {
            let job_id = &active[cursor % active.len()];
            cursor = cursor.wrapping_add(1);

            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                res = gateway.get_job(job_id) => res,
            };

            match fetched {
                Ok(snapshot) => {
                    let mut patch = JobPatch::from_snapshot(snapshot);
                    // the store key is the id we asked for
                    patch.job_id = job_id.clone();
                    if let Err(e) = store.upsert(patch).await {
                        tracing::warn!(job_id = %job_id, error = %e, "failed to persist refreshed status");
                    }
                }
                Err(e) => {
                    tracing::debug!(job_id = %job_id, error = %e, "background refresh failed");
                }
            }
        }

        let wait = cadence.wait(visibility.is_hidden());
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
