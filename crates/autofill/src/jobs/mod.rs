pub mod background;
pub mod backoff;
pub mod model;
pub mod poller;
pub mod progress;
pub mod store;
pub mod submit;

pub use background::{BackgroundRefresher, RefreshCadence};
pub use backoff::{BackoffSchedule, PollPacer};
pub use model::{FileMeta, JobFailure, JobOutput, JobPatch, JobRecord, JobSnapshot, JobStatus};
pub use poller::{store_sink, JobPoller, PollHandle, PollOptions, PollerSlot, UpdateFn};
pub use progress::{ProgressEstimator, ProgressInput, ProgressPhase, ProgressTracker};
pub use store::JobStore;
