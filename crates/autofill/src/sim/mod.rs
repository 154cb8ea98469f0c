pub mod backend;
pub mod latency;

pub use backend::{JobPlan, Resolution, SimBackend, SimTiming};
pub use latency::{LatencyModel, NoLatency, RandomLatency, SimOp};
