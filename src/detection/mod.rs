pub mod metrics;
pub mod scheduler;

pub use metrics::DetectionStats;
pub use scheduler::{DetectionScheduler, SchedulerState};
