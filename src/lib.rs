pub mod capture;
pub mod chat;
pub mod common;
pub mod completion;
pub mod config;
pub mod coordinator;
pub mod detection;
pub mod emotion;
pub mod error;
pub mod inference;
pub mod intake;
pub mod report;
pub mod sim;

pub use coordinator::{CoordinatorBuilder, DegradedReason, DetectionStatus, SessionCoordinator};
pub use error::AppError;
