// Display-only completion estimate.
//
// The backend only reports coarse status, so the percentage shown while a
// job runs is synthetic: a decelerating curve held back by a time budget,
// capped at 99 until the job actually succeeds. The estimator owns no
// authoritative state; a fresh one fed the same inputs lands in the same
// phase.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::jobs::model::JobStatus;

pub const FIRST_TICK: Duration = Duration::from_millis(700);
pub const RUNNING_CAP: f64 = 99.0;
/// How far the value may run ahead of the time budget before being damped.
pub const OVERSHOOT_MARGIN: f64 = 8.0;
const DAMPING: f64 = 0.35;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressInput {
    pub running: bool,
    pub succeeded: bool,
    pub failed: bool,
}

impl ProgressInput {
    /// Queued counts as running: the clock starts as soon as the job exists.
    pub fn from_status(status: JobStatus) -> Self {
        Self {
            running: matches!(status, JobStatus::Queued | JobStatus::Running),
            succeeded: status == JobStatus::Succeeded,
            failed: status == JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl From<ProgressInput> for ProgressPhase {
    fn from(input: ProgressInput) -> Self {
        if input.succeeded {
            ProgressPhase::Succeeded
        } else if input.failed {
            ProgressPhase::Failed
        } else if input.running {
            ProgressPhase::Running
        } else {
            ProgressPhase::Idle
        }
    }
}

pub struct ProgressEstimator<R = StdRng> {
    value: f64,
    phase: ProgressPhase,
    started_at: Option<Instant>,
    target: Duration,
    finish_at: Option<Instant>,
    rng: R,
}

impl ProgressEstimator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for ProgressEstimator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ProgressEstimator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            value: 0.0,
            phase: ProgressPhase::Idle,
            started_at: None,
            target: Duration::from_secs(45),
            finish_at: None,
            rng,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn percent(&self) -> u8 {
        self.value.round().clamp(0.0, 100.0) as u8
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    pub fn target_duration(&self) -> Duration {
        self.target
    }

    /// Feed the current inputs. Returns `true` when the phase changed.
    pub fn observe(&mut self, input: ProgressInput, now: Instant) -> bool {
        let next = ProgressPhase::from(input);
        if next == self.phase {
            return false;
        }

        match next {
            ProgressPhase::Idle => {
                self.value = 0.0;
                self.started_at = None;
                self.finish_at = None;
            }
            ProgressPhase::Running => {
                self.value = 0.0;
                self.started_at = Some(now);
                self.target = Duration::from_millis(self.rng.gen_range(40_000..=55_000));
                self.finish_at = None;
            }
            ProgressPhase::Succeeded => {
                self.value = self.value.max(RUNNING_CAP);
                self.finish_at = Some(now + Duration::from_millis(self.rng.gen_range(380..=800)));
            }
            ProgressPhase::Failed => {}
        }

        self.phase = next;
        true
    }

    /// Advance one tick. Returns how long to wait before the next tick, or
    /// `None` once the value can no longer change in this phase.
    pub fn tick(&mut self, now: Instant) -> Option<Duration> {
        match self.phase {
            ProgressPhase::Running => {
                self.step(now);
                Some(self.tick_interval())
            }
            ProgressPhase::Succeeded => match self.finish_at {
                Some(at) if now < at => Some(at - now),
                _ => {
                    self.value = 100.0;
                    None
                }
            },
            ProgressPhase::Idle | ProgressPhase::Failed => None,
        }
    }

    fn step(&mut self, now: Instant) {
        let p = self.value;
        if p >= RUNNING_CAP {
            self.value = RUNNING_CAP;
            return;
        }

        let mut next = p + if p < 60.0 {
            self.rng.gen_range(2.0..6.0)
        } else if p < 90.0 {
            self.rng.gen_range(1.0..3.0)
        } else {
            self.rng.gen_range(0.2..1.0)
        };

        let elapsed = self
            .started_at
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default();
        let budget = elapsed.as_secs_f64() / self.target.as_secs_f64();
        let expected = (budget * RUNNING_CAP).clamp(0.0, RUNNING_CAP);
        if next > expected + OVERSHOOT_MARGIN {
            next = p + (next - p) * DAMPING;
        }

        self.value = next.clamp(p, RUNNING_CAP);
    }

    fn tick_interval(&mut self) -> Duration {
        let base = if self.value < 60.0 {
            900
        } else if self.value < 90.0 {
            1200
        } else {
            1700
        };
        Duration::from_millis(base + self.rng.gen_range(0..500))
    }
}

/// Runs an estimator on tokio timers and publishes its percentage.
///
/// The tracker stops when the input sender is dropped; dropping the tracker
/// aborts it.
pub struct ProgressTracker {
    rx: watch::Receiver<u8>,
    task: JoinHandle<()>,
}

impl ProgressTracker {
    pub fn spawn(inputs: watch::Receiver<ProgressInput>) -> Self {
        Self::spawn_with(ProgressEstimator::new(), inputs)
    }

    pub fn spawn_with<R>(estimator: ProgressEstimator<R>, inputs: watch::Receiver<ProgressInput>) -> Self
    where
        R: Rng + Send + 'static,
    {
        let (tx, rx) = watch::channel(estimator.percent());
        let task = tokio::spawn(drive(estimator, inputs, tx));
        Self { rx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.rx.clone()
    }

    pub fn current(&self) -> u8 {
        *self.rx.borrow()
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive<R: Rng>(
    mut estimator: ProgressEstimator<R>,
    mut inputs: watch::Receiver<ProgressInput>,
    tx: watch::Sender<u8>,
) {
    let mut next_tick: Option<tokio::time::Instant> = None;

    let initial = *inputs.borrow_and_update();
    let now = tokio::time::Instant::now();
    if estimator.observe(initial, now.into_std()) {
        next_tick = first_tick(estimator.phase(), now);
    }
    tx.send_replace(estimator.percent());

    loop {
        tokio::select! {
            changed = inputs.changed() => {
                if changed.is_err() {
                    return;
                }
                let input = *inputs.borrow_and_update();
                let now = tokio::time::Instant::now();
                if estimator.observe(input, now.into_std()) {
                    next_tick = first_tick(estimator.phase(), now);
                }
            }
            _ = sleep_until(next_tick), if next_tick.is_some() => {
                let now = tokio::time::Instant::now();
                next_tick = estimator.tick(now.into_std()).map(|d| now + d);
            }
        }
        let percent = estimator.percent();
        tx.send_if_modified(|current| {
            let changed = *current != percent;
            *current = percent;
            changed
        });
    }
}

fn first_tick(phase: ProgressPhase, now: tokio::time::Instant) -> Option<tokio::time::Instant> {
    match phase {
        ProgressPhase::Running => Some(now + FIRST_TICK),
        ProgressPhase::Succeeded => Some(now),
        ProgressPhase::Idle | ProgressPhase::Failed => None,
    }
}

async fn sleep_until(at: Option<tokio::time::Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
