// Cross-cutting utilities: metrics and the job progress model

pub mod metrics;
pub mod progress;

pub use metrics::Metrics;
pub use progress::{JobPhase, ProgressRecord, ProgressRegistry, ProgressTracker, StepKey};
