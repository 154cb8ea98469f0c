use std::time::Duration;

/// Ordered wait durations between status polls of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_secs(&[1, 2, 3, 5, 8, 10])
    }
}

impl BackoffSchedule {
    /// An empty list falls back to the default schedule.
    pub fn new(steps: Vec<Duration>) -> Self {
        if steps.is_empty() {
            return Self::default();
        }
        Self { steps }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step `index`, saturating at the last entry.
    pub fn step(&self, index: usize) -> Duration {
        let last = self.steps.len() - 1;
        self.steps[index.min(last)]
    }

    /// The longest wait: the last entry.
    pub fn ceiling(&self) -> Duration {
        self.step(usize::MAX)
    }
}

/// Walks a [`BackoffSchedule`] for one polling loop.
#[derive(Debug, Clone)]
pub struct PollPacer {
    schedule: BackoffSchedule,
    index: usize,
}

impl PollPacer {
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self { schedule, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait before the next poll, then count the attempt that just finished.
    ///
    /// A hidden host always waits the ceiling, whatever the index. The index
    /// advances either way, whether the attempt succeeded or not.
    pub fn next_wait(&mut self, hidden: bool) -> Duration {
        let wait = if hidden {
            self.schedule.ceiling()
        } else {
            self.schedule.step(self.index)
        };
        self.index = (self.index + 1).min(self.schedule.len() - 1);
        wait
    }
}
