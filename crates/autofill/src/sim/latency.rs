use std::time::Duration;

use rand::Rng;

/// Simulated backend call, used to pick a latency profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Health,
    CreateDocset,
    UploadTemplate,
    CreateJob,
    GetJob,
    Download,
}

impl SimOp {
    /// Inclusive latency range in milliseconds.
    pub fn range_ms(&self) -> (u64, u64) {
        match self {
            SimOp::Health => (150, 300),
            SimOp::CreateDocset => (600, 1200),
            SimOp::UploadTemplate => (500, 1100),
            SimOp::CreateJob => (350, 850),
            SimOp::GetJob => (220, 440),
            SimOp::Download => (300, 500),
        }
    }
}

pub trait LatencyModel: Send + Sync {
    fn delay(&self, op: SimOp) -> Duration;
}

/// Independent uniform draw per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomLatency;

impl LatencyModel for RandomLatency {
    fn delay(&self, op: SimOp) -> Duration {
        let (lo, hi) = op.range_ms();
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoLatency;

impl LatencyModel for NoLatency {
    fn delay(&self, _op: SimOp) -> Duration {
        Duration::ZERO
    }
}
