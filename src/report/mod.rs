pub mod orchestrator;
pub mod template;

pub use orchestrator::{Report, ReportRequestOrchestrator, ReportStatus};
